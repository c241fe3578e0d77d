//! Generation-engine boundary.
//!
//! The engine itself (denoising, VAE decode, video encode) is an
//! external collaborator running in an inference sidecar process. This
//! crate defines the typed [`Engine`](api::Engine) trait the pipeline
//! programs against, the explicit configuration-override structure
//! applied at engine load, a [`reqwest`]-based sidecar client, and an
//! in-memory mock with device-memory accounting for tests.

pub mod api;
pub mod http;
pub mod mock;
pub mod overrides;

pub use api::{
    ConditioningHandle, CropSpec, Engine, EngineError, FrameHandle, GenerateOutput,
    GenerateRequest, HandleId, LatentHandle, LatentShape, MemoryStats, OutputKind,
};
pub use overrides::EngineOverrides;
