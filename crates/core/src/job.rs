//! Job model: generation request parameters, status lifecycle, and
//! request validation.
//!
//! Validation runs before any engine call so malformed requests fail
//! fast with a [`CoreError::Validation`] instead of wasting a pipeline
//! slot.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults and limits
// ---------------------------------------------------------------------------

/// Negative prompt supplied when the caller omits one.
pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "worst quality, inconsistent motion, blurry, jittery, distorted";

/// Default requested output width.
pub const DEFAULT_WIDTH: u32 = 1280;
/// Default requested output height.
pub const DEFAULT_HEIGHT: u32 = 720;
/// Default requested frame count.
pub const DEFAULT_FRAME_COUNT: u32 = 121;
/// Default noise seed.
pub const DEFAULT_SEED: u64 = 42;

/// Maximum dimension (width or height) allowed.
const MAX_DIMENSION: u32 = 7680;
/// Hard ceiling on frames per job to bound device-memory use.
const MAX_FRAME_COUNT: u32 = 1024;
/// Maximum prompt length in bytes.
const MAX_PROMPT_LEN: usize = 10_000;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Parameters of one generation job, as written by a producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_frame_count")]
    pub num_frames: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Optional conditioning image/video for image-to-video generation.
    /// Absent means text-only generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditioning_path: Option<PathBuf>,
    /// Optional hint for where the final artifact should be written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

fn default_negative_prompt() -> String {
    DEFAULT_NEGATIVE_PROMPT.to_string()
}
fn default_width() -> u32 {
    DEFAULT_WIDTH
}
fn default_height() -> u32 {
    DEFAULT_HEIGHT
}
fn default_frame_count() -> u32 {
    DEFAULT_FRAME_COUNT
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl GenerationRequest {
    /// Minimal constructor for a text-to-video request with defaults.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: default_negative_prompt(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            num_frames: DEFAULT_FRAME_COUNT,
            seed: DEFAULT_SEED,
            conditioning_path: None,
            output_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Status lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
///
/// `Queued` is implied by a pending command record; `Claimed`/`Running`
/// are entered exclusively by the worker; `Succeeded`/`Failed` are
/// terminal and written exactly once via the result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Claimed,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a request before it touches the engine.
pub fn validate_request(request: &GenerationRequest) -> Result<(), CoreError> {
    if request.prompt.trim().is_empty() {
        return Err(CoreError::Validation("prompt must not be empty".into()));
    }
    if request.prompt.len() > MAX_PROMPT_LEN {
        return Err(CoreError::Validation(format!(
            "prompt must not exceed {MAX_PROMPT_LEN} bytes"
        )));
    }
    validate_dimensions(request.width, request.height)?;
    if request.num_frames == 0 {
        return Err(CoreError::Validation(
            "num_frames must be greater than 0".into(),
        ));
    }
    if request.num_frames > MAX_FRAME_COUNT {
        return Err(CoreError::Validation(format!(
            "num_frames must not exceed {MAX_FRAME_COUNT} (got {})",
            request.num_frames
        )));
    }
    Ok(())
}

/// Validate that width and height are positive and within bounds.
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), CoreError> {
    if width == 0 || height == 0 {
        return Err(CoreError::Validation(
            "width and height must be greater than 0".into(),
        ));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(CoreError::Validation(format!(
            "dimensions must not exceed {MAX_DIMENSION}px (got {width}x{height})"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
