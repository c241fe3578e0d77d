//! The [`Engine`] trait and the typed values that cross it.
//!
//! Tensors never leave the engine process. Latents, decoded frames, and
//! prepared conditioning are referred to by opaque handles carrying
//! authoritative shape metadata; the pipeline reads shapes back from
//! these handles instead of recomputing them from nominal factors.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Identifier of a device-resident tensor owned by the engine.
pub type HandleId = String;

/// Shape of a latent tensor in latent-space units (not pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatentShape {
    pub frames: u32,
    pub height: u32,
    pub width: u32,
}

/// A latent tensor held by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatentHandle {
    pub id: HandleId,
    pub shape: LatentShape,
}

/// A batch of decoded pixel frames held by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameHandle {
    pub id: HandleId,
    pub frames: u32,
    pub height: u32,
    pub width: u32,
}

/// Prepared conditioning (reference image/video) held by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditioningHandle {
    pub id: HandleId,
}

/// Whether a generation call should stop at latents or decode to pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Latent,
    Pixels,
}

/// One denoising invocation.
///
/// `latents` turns the call into a partial denoise starting from the
/// given tensor (`denoise_strength` < 1.0) instead of generation from
/// pure noise.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub height: u32,
    pub width: u32,
    pub num_frames: u32,
    pub steps: u32,
    pub seed: u64,
    pub output: OutputKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditioning: Option<HandleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latents: Option<HandleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denoise_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decode_timestep: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_cond_noise_scale: Option<f64>,
}

/// Output of a generation call.
#[derive(Debug, Clone)]
pub enum GenerateOutput {
    Latents(LatentHandle),
    Frames(FrameHandle),
}

/// Window and frame-count trim applied to decoded frames.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CropSpec {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
}

/// Accelerator memory occupancy as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Bytes currently allocated to live tensors.
    pub allocated_bytes: u64,
    /// Bytes reserved by the allocator (allocated + cached).
    pub reserved_bytes: u64,
    /// Fixed footprint of the resident model weights.
    pub resident_bytes: u64,
}

impl MemoryStats {
    /// Allocated bytes excluding the resident weight footprint.
    pub fn scratch_bytes(&self) -> u64 {
        self.allocated_bytes.saturating_sub(self.resident_bytes)
    }
}

/// Errors from the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request to the sidecar failed (network, protocol).
    #[error("Engine request failed: {0}")]
    Request(String),

    /// The engine returned a non-2xx status.
    #[error("Engine API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The accelerator allocator could not satisfy an allocation.
    #[error("Accelerator out of memory: {0}")]
    OutOfMemory(String),

    /// The engine ran but produced an unusable output.
    #[error("Engine produced invalid output: {0}")]
    InvalidOutput(String),
}

impl EngineError {
    /// True when the failure is an allocator exhaustion that warrants a
    /// forced reclaim pass before the next job.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory(_))
    }
}

/// The generation engine capability.
///
/// Implementations must be safe to share behind an `Arc`; the worker
/// serializes job execution, so no call is ever issued concurrently for
/// transient state.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    /// Spatial VAE compression ratio (pixels per latent unit).
    fn spatial_compression_ratio(&self) -> u32;

    /// Temporal VAE compression ratio (frames per latent frame).
    fn temporal_compression_ratio(&self) -> u32;

    /// Convert a reference image/video into the engine's conditioning
    /// representation at the given (requested) resolution.
    async fn prepare_conditioning(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<ConditioningHandle, EngineError>;

    /// Run a denoising pass. Produces latents or decoded frames
    /// depending on `request.output`.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateOutput, EngineError>;

    /// Spatially upscale a latent tensor without decoding to pixels.
    /// The returned shape is engine-determined and authoritative.
    async fn upscale(&self, latents: &LatentHandle) -> Result<LatentHandle, EngineError>;

    /// Cut a window out of decoded frames and trim the frame count.
    async fn crop_frames(
        &self,
        frames: &FrameHandle,
        spec: &CropSpec,
    ) -> Result<FrameHandle, EngineError>;

    /// Resample decoded frames to exact pixel dimensions.
    async fn resize_frames(
        &self,
        frames: &FrameHandle,
        width: u32,
        height: u32,
    ) -> Result<FrameHandle, EngineError>;

    /// Move decoded frames to host memory, freeing their accelerator
    /// allocation ahead of the (slow) encoding step.
    async fn offload_frames(&self, frames: &FrameHandle) -> Result<(), EngineError>;

    /// Encode frames into a video artifact at `path`.
    async fn save_video(
        &self,
        frames: &FrameHandle,
        path: &Path,
        frame_rate: u32,
    ) -> Result<(), EngineError>;

    /// Drop a tensor handle, releasing its memory.
    async fn release(&self, handle: &HandleId) -> Result<(), EngineError>;

    /// Synchronize the accelerator and return freed allocator pages to
    /// the system pool. Never touches the resident model weights.
    async fn reclaim(&self) -> Result<(), EngineError>;

    /// Current accelerator memory occupancy.
    async fn memory_stats(&self) -> Result<MemoryStats, EngineError>;
}
