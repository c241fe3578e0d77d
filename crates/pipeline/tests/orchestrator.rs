//! End-to-end pipeline runs against the in-memory engine.

use std::sync::Arc;

use vidforge_core::job::GenerationRequest;
use vidforge_core::types::JobId;
use vidforge_engine::mock::MockEngine;
use vidforge_engine::OutputKind;
use vidforge_pipeline::{Orchestrator, PipelineError, PipelineSettings};

fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest::new(prompt)
}

fn orchestrator(engine: Arc<MockEngine>) -> Orchestrator {
    Orchestrator::new(engine, PipelineSettings::default())
}

#[tokio::test]
async fn default_job_produces_requested_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let orch = orchestrator(engine.clone());

    let mut req = request("a red fox running through snow");
    req.output_path = Some(dir.path().join("fox.mp4"));
    let outcome = orch.run(&JobId::generate(), &req).await.unwrap();

    assert_eq!(outcome.width, 1280);
    assert_eq!(outcome.height, 720);
    assert_eq!(outcome.frame_count, 121);
    let artifact = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert_eq!(artifact, "mock-video 1280x720 frames=121 fps=24\n");
}

#[tokio::test]
async fn both_passes_share_the_seed_and_final_pass_reuses_latents() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let orch = orchestrator(engine.clone());

    let mut req = request("time-lapse of clouds");
    req.seed = 1234;
    req.output_path = Some(dir.path().join("clouds.mp4"));
    orch.run(&JobId::generate(), &req).await.unwrap();

    let calls = engine.generate_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].seed, 1234);
    assert_eq!(calls[1].seed, 1234);
    assert_eq!(calls[0].output, OutputKind::Latent);
    assert_eq!(calls[0].steps, 50);
    assert_eq!((calls[0].width, calls[0].height), (832, 480));
    assert_eq!(calls[1].output, OutputKind::Pixels);
    assert_eq!(calls[1].steps, 10);
    assert!(calls[1].starting_latents.is_some());
    assert_eq!(calls[1].denoise_strength, Some(0.3));
    // 832x480 latents (26x15) upscaled 2x and decoded at 32px per unit.
    assert_eq!((calls[1].width, calls[1].height), (1664, 960));
}

#[tokio::test]
async fn conditioning_media_is_used_by_both_passes() {
    let dir = tempfile::tempdir().unwrap();
    let media = dir.path().join("reference.png");
    std::fs::write(&media, b"png").unwrap();

    let engine = Arc::new(MockEngine::new());
    let orch = orchestrator(engine.clone());

    let mut req = request("the reference scene, animated");
    req.conditioning_path = Some(media);
    req.output_path = Some(dir.path().join("out.mp4"));
    orch.run(&JobId::generate(), &req).await.unwrap();

    let calls = engine.generate_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].conditioning.is_some());
    assert_eq!(calls[0].conditioning, calls[1].conditioning);
    assert_eq!(engine.live_handles(), 0);
}

#[tokio::test]
async fn missing_conditioning_media_fails_before_generation() {
    let engine = Arc::new(MockEngine::new());
    let orch = orchestrator(engine.clone());

    let mut req = request("animate this");
    req.conditioning_path = Some("/nonexistent/reference.png".into());
    let err = orch.run(&JobId::generate(), &req).await.unwrap_err();

    assert_eq!(err.kind(), "engine");
    assert!(engine.generate_calls().is_empty());
}

#[tokio::test]
async fn invalid_request_never_touches_the_engine() {
    let engine = Arc::new(MockEngine::new());
    let orch = orchestrator(engine.clone());

    let err = orch.run(&JobId::generate(), &request("  ")).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(engine.generate_calls().is_empty());
    assert_eq!(engine.reclaim_count(), 0);
}

#[tokio::test]
async fn failure_releases_every_handle() {
    let engine = Arc::new(MockEngine::new());
    let orch = orchestrator(engine.clone());

    engine.fail_next("upscale", true, "CUDA out of memory. Tried to allocate 2 GiB");
    let err = orch.run(&JobId::generate(), &request("x")).await.unwrap_err();

    assert!(err.is_resource());
    assert_eq!(engine.live_handles(), 0);
    assert_eq!(engine.scratch_allocated(), 0);
}

#[tokio::test]
async fn success_returns_scratch_memory_to_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let orch = orchestrator(engine.clone());

    let mut req = request("a lighthouse at dusk");
    req.output_path = Some(dir.path().join("out.mp4"));
    orch.run(&JobId::generate(), &req).await.unwrap();

    assert_eq!(engine.live_handles(), 0);
    assert_eq!(engine.scratch_allocated(), 0);
    assert!(engine.reclaim_count() > 0);
}

#[tokio::test]
async fn upscaler_shape_drift_still_yields_requested_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    // The upscaler truncates latent dimensions to a multiple of 4, so
    // the decode target disagrees with the nominal 2x factor.
    let engine = Arc::new(MockEngine::new().with_upscale_snap(4));
    let orch = orchestrator(engine.clone());

    let mut req = request("drifting shapes");
    req.output_path = Some(dir.path().join("out.mp4"));
    let outcome = orch.run(&JobId::generate(), &req).await.unwrap();

    // 26x15 latents snap to 52x28: the final pass decodes 1664x896.
    let calls = engine.generate_calls();
    assert_eq!((calls[1].width, calls[1].height), (1664, 896));
    assert_eq!(outcome.width, 1280);
    assert_eq!(outcome.height, 720);
}

#[tokio::test]
async fn padded_decode_is_cropped_not_resized() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    // Downscale by exactly half the alignment grid so the 2x upscale
    // lands on the padded dimensions.
    let settings = PipelineSettings {
        downscale_factor: 0.512,
        ..PipelineSettings::default()
    };
    let orch = Orchestrator::new(engine.clone(), settings);

    let mut req = request("a square pond");
    req.width = 1000;
    req.height = 1000;
    req.num_frames = 49;
    req.output_path = Some(dir.path().join("out.mp4"));
    let outcome = orch.run(&JobId::generate(), &req).await.unwrap();

    // Decoded at the padded 1024x1024, cropped back to 1000x1000.
    let calls = engine.generate_calls();
    assert_eq!((calls[1].width, calls[1].height), (1024, 1024));
    assert_eq!(outcome.width, 1000);
    assert_eq!(outcome.height, 1000);
    assert_eq!(outcome.frame_count, 49);
}

#[tokio::test]
async fn off_grid_frame_count_is_trimmed_back() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let orch = orchestrator(engine.clone());

    let mut req = request("one hundred frames");
    req.num_frames = 100;
    req.output_path = Some(dir.path().join("out.mp4"));
    let outcome = orch.run(&JobId::generate(), &req).await.unwrap();

    // Generated on the temporal grid (105 frames), trimmed to 100.
    let calls = engine.generate_calls();
    assert_eq!(calls[0].num_frames, 105);
    assert_eq!(outcome.frame_count, 100);
}

#[tokio::test]
async fn output_path_defaults_to_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new());
    let settings = PipelineSettings {
        output_dir: dir.path().to_path_buf(),
        ..PipelineSettings::default()
    };
    let orch = Orchestrator::new(engine, settings);

    let id = JobId::generate();
    let outcome = orch.run(&id, &request("default path")).await.unwrap();
    assert_eq!(outcome.output_path, dir.path().join(format!("{id}.mp4")));
    assert!(outcome.output_path.exists());
}
