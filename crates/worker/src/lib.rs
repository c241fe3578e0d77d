//! Single-job worker loop.
//!
//! Claims command records from the file queue one at a time, runs each
//! through the generation pipeline, and writes a terminal result
//! record. Jobs are strictly serialized: the accelerator holds one
//! working set at a time.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vidforge_engine::Engine;
use vidforge_pipeline::{force_reclaim, Orchestrator, PipelineSettings};
use vidforge_queue::{CommandRecord, JobQueue};

pub use config::WorkerConfig;

/// Polls the queue and drives jobs through the pipeline.
pub struct Worker {
    queue: JobQueue,
    engine: Arc<dyn Engine>,
    orchestrator: Orchestrator,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        queue: JobQueue,
        engine: Arc<dyn Engine>,
        settings: PipelineSettings,
        poll_interval: Duration,
    ) -> Self {
        let orchestrator = Orchestrator::new(engine.clone(), settings);
        Self {
            queue,
            engine,
            orchestrator,
            poll_interval,
        }
    }

    /// Run until `shutdown` is cancelled. The job in flight when the
    /// signal arrives finishes before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.report_stranded();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let record = match self.queue.poll_next() {
                Ok(record) => record,
                Err(e) => {
                    error!(error = %e, "queue poll failed");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            match record {
                Some(record) => self.process(record).await,
                None => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        info!("worker stopped");
    }

    /// Process every pending job, then return. Used by tests and batch
    /// invocations.
    pub async fn drain(&self) {
        loop {
            match self.queue.poll_next() {
                Ok(Some(record)) => self.process(record).await,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "queue poll failed");
                    break;
                }
            }
        }
    }

    async fn process(&self, record: CommandRecord) {
        let id = record.id.clone();
        info!(job = %id, prompt_len = record.request.prompt.len(), "processing job");

        let outcome = self.orchestrator.run(&id, &record.request).await;
        let written = match outcome {
            Ok(outcome) => self.queue.complete(&id, outcome.output_path),
            Err(e) => {
                let written = self.queue.fail(&id, e.to_string());
                if e.is_resource() {
                    // Free whatever the failed allocation left cached
                    // before accepting another job.
                    force_reclaim(self.engine.as_ref()).await;
                }
                written
            }
        };

        // A result-write failure leaves the command record claimed, so
        // the job surfaces as stranded instead of disappearing.
        if let Err(e) = written {
            error!(job = %id, error = %e, "could not write result record; job left claimed");
        }
    }

    fn report_stranded(&self) {
        match self.queue.stranded() {
            Ok(ids) if ids.is_empty() => {}
            Ok(ids) => {
                for id in &ids {
                    warn!(job = %id, "claimed command record has no result; resubmit or discard");
                }
            }
            Err(e) => warn!(error = %e, "could not scan for stranded jobs"),
        }
    }
}
