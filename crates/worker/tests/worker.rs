//! Worker loop against a temp queue and the in-memory engine.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vidforge_core::job::GenerationRequest;
use vidforge_engine::mock::MockEngine;
use vidforge_pipeline::PipelineSettings;
use vidforge_queue::{JobQueue, ResultStatus};
use vidforge_worker::Worker;

fn setup(engine: Arc<MockEngine>) -> (tempfile::TempDir, JobQueue, Worker) {
    let dir = tempfile::tempdir().unwrap();
    let queue = JobQueue::open(dir.path().join("queue")).unwrap();
    let settings = PipelineSettings {
        output_dir: dir.path().join("outputs"),
        ..PipelineSettings::default()
    };
    let worker = Worker::new(
        queue.clone(),
        engine,
        settings,
        Duration::from_millis(10),
    );
    (dir, queue, worker)
}

#[tokio::test]
async fn drain_processes_every_pending_job() {
    let engine = Arc::new(MockEngine::new());
    let (_dir, queue, worker) = setup(engine.clone());

    let first = queue.submit(GenerationRequest::new("a red fox")).unwrap();
    let second = queue.submit(GenerationRequest::new("a grey owl")).unwrap();
    worker.drain().await;

    for id in [&first, &second] {
        let result = queue.result(id).unwrap().expect("result record");
        assert_eq!(result.status, ResultStatus::Success);
        assert!(result.output_path.unwrap().exists());
    }
    assert_eq!(queue.pending_len().unwrap(), 0);
    assert!(queue.stranded().unwrap().is_empty());
    assert_eq!(engine.live_handles(), 0);
}

#[tokio::test]
async fn failed_job_gets_error_result_and_no_leftover_command() {
    let engine = Arc::new(MockEngine::new());
    let (_dir, queue, worker) = setup(engine.clone());

    let id = queue.submit(GenerationRequest::new("doomed")).unwrap();
    engine.fail_next("generate", false, "scheduler diverged");
    worker.drain().await;

    let result = queue.result(&id).unwrap().expect("result record");
    assert_eq!(result.status, ResultStatus::Error);
    assert!(result.error.unwrap().contains("scheduler diverged"));
    assert!(queue.stranded().unwrap().is_empty());
    assert_eq!(engine.scratch_allocated(), 0);
}

#[tokio::test]
async fn memory_failure_triggers_extra_reclaim() {
    let engine = Arc::new(MockEngine::new());
    let (_dir, queue, worker) = setup(engine.clone());

    queue.submit(GenerationRequest::new("too big")).unwrap();
    engine.fail_next("generate", true, "CUDA out of memory");
    worker.drain().await;

    // One reclaim from job teardown plus the forced post-failure pass.
    assert!(engine.reclaim_count() >= 2);
    assert_eq!(engine.scratch_allocated(), 0);
}

#[tokio::test]
async fn identical_requests_produce_identical_artifacts() {
    let engine = Arc::new(MockEngine::new());
    let (_dir, queue, worker) = setup(engine.clone());

    let mut request = GenerationRequest::new("a lighthouse at dusk");
    request.seed = 7;
    let first = queue.submit(request.clone()).unwrap();
    let second = queue.submit(request).unwrap();
    worker.drain().await;

    let read = |id| {
        let result = queue.result(id).unwrap().unwrap();
        std::fs::read_to_string(result.output_path.unwrap()).unwrap()
    };
    assert_eq!(read(&first), read(&second));

    let calls = engine.generate_calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0].seed, 7);
    assert_eq!(calls[2].seed, 7);
    assert_eq!(
        (calls[0].width, calls[0].height),
        (calls[2].width, calls[2].height)
    );
}

#[tokio::test]
async fn run_stops_when_cancelled() {
    let engine = Arc::new(MockEngine::new());
    let (_dir, queue, worker) = setup(engine);

    let id = queue.submit(GenerationRequest::new("last job")).unwrap();
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    // A pre-cancelled token still lets the loop exit promptly; the
    // pending job stays queued for the next run.
    tokio::time::timeout(Duration::from_secs(1), worker.run(shutdown))
        .await
        .expect("run must return after cancellation");
    assert_eq!(queue.pending_len().unwrap(), 1);
    assert!(queue.result(&id).unwrap().is_none());
}
