//! Staged generation pipeline.
//!
//! Drives one job through conditioning preparation, low-resolution
//! generation, latent upscaling, final denoise/decode, postprocess
//! cropping, and artifact persistence, with a resource lifecycle that
//! reclaims transient accelerator memory on every exit path.

pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod plan;
pub mod settings;
pub mod stage;

pub use error::PipelineError;
pub use lifecycle::{force_reclaim, ResourceLifecycle};
pub use orchestrator::{JobOutcome, Orchestrator};
pub use plan::ResolutionPlan;
pub use settings::PipelineSettings;
pub use stage::Stage;
