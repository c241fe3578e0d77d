//! Accelerator resource lifecycle.
//!
//! Transient tensors (latents, frames, conditioning) live exactly as
//! long as the stages that need them. Between stages the lifecycle
//! releases the handles whose lifetime ended and reclaims allocator
//! pages, so the allocator never caches more than one stage's working
//! set. Cleanup is deliberately infallible: a release failure during
//! teardown must never mask the error that caused the teardown.

use tracing::{debug, warn};
use vidforge_engine::{Engine, HandleId};

use crate::stage::Stage;

/// Tracks the scratch-memory baseline across one job and releases
/// transient handles on both exit paths.
pub struct ResourceLifecycle<'a> {
    engine: &'a dyn Engine,
    /// Scratch bytes observed before the job touched the engine. `None`
    /// when the baseline read itself failed.
    baseline_scratch: Option<u64>,
}

impl<'a> ResourceLifecycle<'a> {
    /// Record the pre-job memory baseline.
    pub async fn begin(engine: &'a dyn Engine) -> Self {
        let baseline_scratch = match engine.memory_stats().await {
            Ok(stats) => Some(stats.scratch_bytes()),
            Err(e) => {
                warn!(error = %e, "could not read pre-job memory baseline");
                None
            }
        };
        Self {
            engine,
            baseline_scratch,
        }
    }

    /// Mark entry into a stage. Purely observational.
    pub fn enter(&self, stage: Stage) {
        debug!(stage = %stage, "entering stage");
    }

    /// Release the handles whose lifetime ended with `stage`, then
    /// return freed allocator pages to the system pool.
    pub async fn leave(&self, stage: Stage, scratch: Vec<HandleId>) {
        for handle in &scratch {
            if let Err(e) = self.engine.release(handle).await {
                warn!(stage = %stage, handle = %handle, error = %e, "release failed");
            }
        }
        if let Err(e) = self.engine.reclaim().await {
            warn!(stage = %stage, error = %e, "reclaim failed");
        }
        debug!(stage = %stage, released = scratch.len(), "stage scratch released");
    }

    /// Release every handle the job still owns. Used on both the
    /// success and failure paths.
    pub async fn release_all<I>(&self, handles: I)
    where
        I: IntoIterator<Item = HandleId>,
    {
        for handle in handles {
            if let Err(e) = self.engine.release(&handle).await {
                warn!(handle = %handle, error = %e, "release failed during teardown");
            }
        }
        if let Err(e) = self.engine.reclaim().await {
            warn!(error = %e, "reclaim failed during teardown");
        }
    }

    /// Verify scratch occupancy returned to the pre-job baseline.
    ///
    /// A leak here is an engine-side bug the pipeline cannot fix, so it
    /// is reported rather than treated as a job failure.
    pub async fn finish(&self) {
        let Some(baseline) = self.baseline_scratch else {
            return;
        };
        match self.engine.memory_stats().await {
            Ok(stats) if stats.scratch_bytes() > baseline => {
                warn!(
                    baseline_bytes = baseline,
                    scratch_bytes = stats.scratch_bytes(),
                    "scratch memory above pre-job baseline after cleanup"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not read post-job memory stats"),
        }
    }
}

/// Best-effort reclaim outside any job, e.g. after a resource failure
/// before the worker accepts the next command.
pub async fn force_reclaim(engine: &dyn Engine) {
    if let Err(e) = engine.reclaim().await {
        warn!(error = %e, "forced reclaim failed");
    }
}
