//! Per-job resolution plan.

use serde::Serialize;
use vidforge_core::job::GenerationRequest;
use vidforge_core::resolution::{self, Padding};

use crate::settings::PipelineSettings;

/// Stage dimensions derived from one request, computed once during
/// planning and threaded through the rest of the pipeline.
///
/// `padded_height`/`padded_width` are the decode target the final pass
/// would produce for an exact 2x upscale; the actual decode target is
/// always re-derived from the upscaled latent shape the engine reports.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionPlan {
    /// Requested output height in pixels.
    pub height: u32,
    /// Requested output width in pixels.
    pub width: u32,
    /// Requested frame count.
    pub requested_frames: u32,
    /// Low-resolution pass height.
    pub low_height: u32,
    /// Low-resolution pass width.
    pub low_width: u32,
    /// Frame count snapped to the engine's temporal grid.
    pub frame_count: u32,
    /// Requested height rounded up to the alignment modulus.
    pub padded_height: u32,
    /// Requested width rounded up to the alignment modulus.
    pub padded_width: u32,
    /// Pad offsets centering the requested window in the padded one.
    #[serde(skip)]
    pub padding: Padding,
}

impl ResolutionPlan {
    /// Build the plan for a request against the engine's compression
    /// ratios.
    pub fn build(
        request: &GenerationRequest,
        settings: &PipelineSettings,
        spatial_ratio: u32,
        temporal_ratio: u32,
    ) -> Self {
        let (low_height, low_width) = resolution::plan(
            request.height,
            request.width,
            settings.downscale_factor,
            settings.alignment,
            settings.min_dimension,
            Some(spatial_ratio),
        );
        let padded_height = resolution::align_up(request.height, settings.alignment);
        let padded_width = resolution::align_up(request.width, settings.alignment);
        let padding =
            resolution::padding(request.height, request.width, padded_height, padded_width);
        let frame_count = resolution::plan_frame_count(request.num_frames, temporal_ratio);

        Self {
            height: request.height,
            width: request.width,
            requested_frames: request.num_frames,
            low_height,
            low_width,
            frame_count,
            padded_height,
            padded_width,
            padding,
        }
    }
}
