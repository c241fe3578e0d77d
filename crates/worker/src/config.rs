use std::path::PathBuf;

use vidforge_engine::EngineOverrides;
use vidforge_pipeline::PipelineSettings;

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue directory shared with producers (default: `queue`).
    pub queue_dir: PathBuf,
    /// Base URL of the inference sidecar (default: `http://127.0.0.1:8190`).
    pub engine_url: String,
    /// Milliseconds between polls of an empty queue (default: `500`).
    pub poll_interval_ms: u64,
    /// Flag file advertising that the model is loaded and the worker
    /// accepts jobs (default: `<queue_dir>/.ready`).
    pub ready_flag: PathBuf,
    /// Directory for artifacts when a request carries no output hint
    /// (default: `outputs`).
    pub output_dir: PathBuf,
    /// Denoising steps for the low-resolution pass (default: `50`).
    pub base_steps: u32,
    /// Denoising steps for the final refinement pass (default: `10`).
    pub final_steps: u32,
    /// Frame rate of encoded artifacts (default: `24`).
    pub frame_rate: u32,
    /// Model configuration overrides applied at engine load, parsed
    /// from the `ENGINE_OVERRIDES` JSON object.
    pub engine_overrides: EngineOverrides,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default                 |
    /// |--------------------|-------------------------|
    /// | `QUEUE_DIR`        | `queue`                 |
    /// | `ENGINE_URL`       | `http://127.0.0.1:8190` |
    /// | `POLL_INTERVAL_MS` | `500`                   |
    /// | `READY_FLAG`       | `<QUEUE_DIR>/.ready`    |
    /// | `OUTPUT_DIR`       | `outputs`               |
    /// | `BASE_STEPS`       | `50`                    |
    /// | `FINAL_STEPS`      | `10`                    |
    /// | `FRAME_RATE`       | `24`                    |
    /// | `ENGINE_OVERRIDES` | `{}`                    |
    pub fn from_env() -> Self {
        let queue_dir = PathBuf::from(std::env::var("QUEUE_DIR").unwrap_or_else(|_| "queue".into()));

        let engine_url =
            std::env::var("ENGINE_URL").unwrap_or_else(|_| "http://127.0.0.1:8190".into());

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");

        let ready_flag = std::env::var("READY_FLAG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| queue_dir.join(".ready"));

        let output_dir =
            PathBuf::from(std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "outputs".into()));

        let base_steps: u32 = std::env::var("BASE_STEPS")
            .unwrap_or_else(|_| "50".into())
            .parse()
            .expect("BASE_STEPS must be a valid u32");

        let final_steps: u32 = std::env::var("FINAL_STEPS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("FINAL_STEPS must be a valid u32");

        let frame_rate: u32 = std::env::var("FRAME_RATE")
            .unwrap_or_else(|_| "24".into())
            .parse()
            .expect("FRAME_RATE must be a valid u32");

        let engine_overrides: EngineOverrides = serde_json::from_str(
            &std::env::var("ENGINE_OVERRIDES").unwrap_or_else(|_| "{}".into()),
        )
        .expect("ENGINE_OVERRIDES must be a valid JSON object");

        Self {
            queue_dir,
            engine_url,
            poll_interval_ms,
            ready_flag,
            output_dir,
            base_steps,
            final_steps,
            frame_rate,
            engine_overrides,
        }
    }

    /// Pipeline settings with this configuration's overrides applied.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            base_steps: self.base_steps,
            final_steps: self.final_steps,
            frame_rate: self.frame_rate,
            output_dir: self.output_dir.clone(),
            ..PipelineSettings::default()
        }
    }
}
