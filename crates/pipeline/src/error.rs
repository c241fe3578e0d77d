//! Pipeline failure taxonomy.
//!
//! Each variant maps to one class of the worker's error handling
//! policy: validation failures never reach the engine, resource
//! failures trigger an extra reclaim pass, and I/O failures during
//! result persistence leave the job operator-recoverable.

use vidforge_core::error::CoreError;
use vidforge_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed or out-of-range request parameters, caught before any
    /// engine call. Never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The generation engine failed or returned an unusable output.
    #[error("Engine failure: {0}")]
    Engine(String),

    /// Accelerator out-of-memory or allocation failure.
    #[error("Resource failure: {0}")]
    Resource(String),

    /// Queue-directory or artifact persistence failure.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A broken invariant inside the pipeline itself.
    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// True for allocator-exhaustion failures that warrant a forced
    /// reclaim pass before the worker accepts another job.
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_))
    }

    /// Short classification label for logs and result records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Engine(_) => "engine",
            Self::Resource(_) => "resource",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<EngineError> for PipelineError {
    fn from(e: EngineError) -> Self {
        if e.is_out_of_memory() {
            Self::Resource(e.to_string())
        } else {
            Self::Engine(e.to_string())
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oom_maps_to_resource() {
        let err: PipelineError = EngineError::OutOfMemory("2 GiB short".into()).into();
        assert!(err.is_resource());
        assert_eq!(err.kind(), "resource");
    }

    #[test]
    fn other_engine_errors_map_to_engine() {
        let err: PipelineError = EngineError::InvalidOutput("empty tensor".into()).into();
        assert!(!err.is_resource());
        assert_eq!(err.kind(), "engine");
    }

    #[test]
    fn validation_maps_through() {
        let err: PipelineError = CoreError::Validation("bad width".into()).into();
        assert_eq!(err.kind(), "validation");
    }
}
