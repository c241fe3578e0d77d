//! Producer-side submission tool.
//!
//! Reads a generation request as JSON from stdin, writes a command
//! record into the queue directory, prints the job id, and optionally
//! waits for the result:
//!
//! ```text
//! echo '{"prompt":"a red fox"}' | vf-submit --wait
//! ```

use std::io::Read;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidforge_core::job::{self, GenerationRequest};
use vidforge_queue::{JobQueue, QueueError, ResultStatus};

fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vf_submit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn run() -> Result<std::process::ExitCode, QueueError> {
    let wait = std::env::args().any(|a| a == "--wait");
    let queue_dir = std::env::var("QUEUE_DIR").unwrap_or_else(|_| "queue".into());
    let timeout_secs: u64 = std::env::var("RESULT_TIMEOUT_SECS")
        .unwrap_or_else(|_| "1800".into())
        .parse()
        .expect("RESULT_TIMEOUT_SECS must be a valid u64");

    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .map_err(QueueError::Io)?;
    let request: GenerationRequest = serde_json::from_str(&body)?;
    if let Err(e) = job::validate_request(&request) {
        eprintln!("invalid request: {e}");
        return Ok(std::process::ExitCode::FAILURE);
    }

    let queue = JobQueue::open(&queue_dir)?;
    let id = queue.submit(request)?;
    println!("{id}");

    if !wait {
        return Ok(std::process::ExitCode::SUCCESS);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(QueueError::Io)?;
    let result = runtime.block_on(queue.wait_for_result(
        &id,
        Duration::from_secs(timeout_secs),
        Duration::from_secs(1),
    ))?;

    match result.status {
        ResultStatus::Success => {
            if let Some(path) = result.output_path {
                println!("{}", path.display());
            }
            Ok(std::process::ExitCode::SUCCESS)
        }
        ResultStatus::Error => {
            eprintln!(
                "job failed: {}",
                result.error.unwrap_or_else(|| "unknown error".into())
            );
            Ok(std::process::ExitCode::FAILURE)
        }
    }
}
