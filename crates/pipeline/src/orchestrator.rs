//! Multi-stage job orchestration.
//!
//! One job runs: plan resolutions, prepare conditioning, generate at a
//! downscaled resolution, upscale the latents, run a short final
//! denoise that decodes to pixels, crop/resize back to the requested
//! window, and persist the artifact. Transient tensors are released as
//! soon as the last stage that needs them finishes; on any failure
//! everything the job still owns is released before the error
//! propagates.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};
use vidforge_core::job::{self, GenerationRequest};
use vidforge_core::resolution::{self, CropWindow};
use vidforge_core::types::JobId;
use vidforge_engine::{
    ConditioningHandle, CropSpec, Engine, FrameHandle, GenerateOutput, GenerateRequest, HandleId,
    OutputKind,
};

use crate::error::PipelineError;
use crate::lifecycle::ResourceLifecycle;
use crate::plan::ResolutionPlan;
use crate::settings::PipelineSettings;
use crate::stage::Stage;

/// Result of a successfully persisted job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
}

/// Drives jobs through the generation stages against one engine.
pub struct Orchestrator {
    engine: Arc<dyn Engine>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn Engine>, settings: PipelineSettings) -> Self {
        Self { engine, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one job to completion.
    ///
    /// Validation failures return before the engine is touched. On any
    /// later failure all handles the job still owns are released and
    /// allocator pages reclaimed before the error is returned.
    pub async fn run(
        &self,
        id: &JobId,
        request: &GenerationRequest,
    ) -> Result<JobOutcome, PipelineError> {
        job::validate_request(request)?;

        let engine = self.engine.as_ref();
        let lifecycle = ResourceLifecycle::begin(engine).await;
        let mut live: Vec<HandleId> = Vec::new();

        let result = self.execute(id, request, &lifecycle, &mut live).await;
        lifecycle.release_all(live).await;

        match result {
            Ok(outcome) => {
                lifecycle.finish().await;
                info!(
                    job = %id,
                    path = %outcome.output_path.display(),
                    width = outcome.width,
                    height = outcome.height,
                    frames = outcome.frame_count,
                    "job completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(job = %id, kind = e.kind(), error = %e, "job failed");
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        id: &JobId,
        request: &GenerationRequest,
        lifecycle: &ResourceLifecycle<'_>,
        live: &mut Vec<HandleId>,
    ) -> Result<JobOutcome, PipelineError> {
        let engine = self.engine.as_ref();
        let settings = &self.settings;
        let spatial_ratio = engine.spatial_compression_ratio();

        // -- Planning --
        lifecycle.enter(Stage::Planning);
        let plan = ResolutionPlan::build(
            request,
            settings,
            spatial_ratio,
            engine.temporal_compression_ratio(),
        );
        info!(
            job = %id,
            stage = %Stage::Planning,
            low_width = plan.low_width,
            low_height = plan.low_height,
            frame_count = plan.frame_count,
            padded_width = plan.padded_width,
            padded_height = plan.padded_height,
            "resolution plan ready"
        );

        // -- Conditioning preparation --
        lifecycle.enter(Stage::ConditioningPrep);
        let conditioning = self.prepare_conditioning(id, request).await?;
        if let Some(ref handle) = conditioning {
            live.push(handle.id.clone());
        }

        // -- Low-resolution generation --
        lifecycle.enter(Stage::LowResGenerate);
        let output = engine
            .generate(&GenerateRequest {
                prompt: request.prompt.clone(),
                negative_prompt: request.negative_prompt.clone(),
                height: plan.low_height,
                width: plan.low_width,
                num_frames: plan.frame_count,
                steps: settings.base_steps,
                seed: request.seed,
                output: OutputKind::Latent,
                conditioning: conditioning.as_ref().map(|c| c.id.clone()),
                latents: None,
                denoise_strength: None,
                decode_timestep: None,
                image_cond_noise_scale: Some(settings.image_cond_noise_scale),
            })
            .await?;
        let GenerateOutput::Latents(low_latents) = output else {
            return Err(PipelineError::Internal(
                "low-resolution pass produced frames instead of latents".into(),
            ));
        };
        live.push(low_latents.id.clone());
        lifecycle.leave(Stage::LowResGenerate, Vec::new()).await;

        // -- Latent upscale --
        lifecycle.enter(Stage::LatentUpscale);
        let upscaled = engine.upscale(&low_latents).await?;
        live.push(upscaled.id.clone());
        debug!(
            job = %id,
            stage = %Stage::LatentUpscale,
            latent_width = upscaled.shape.width,
            latent_height = upscaled.shape.height,
            "latents upscaled"
        );
        retire(live, &low_latents.id);
        lifecycle
            .leave(Stage::LatentUpscale, vec![low_latents.id])
            .await;

        // -- Final denoise --
        lifecycle.enter(Stage::FinalDenoise);
        // The decode target comes from the shape the upscaler actually
        // produced, not from the nominal upscale factor.
        let final_height = upscaled.shape.height * spatial_ratio;
        let final_width = upscaled.shape.width * spatial_ratio;
        debug!(
            job = %id,
            stage = %Stage::FinalDenoise,
            width = final_width,
            height = final_height,
            steps = settings.final_steps,
            "decoding at upscaled latent dimensions"
        );
        let output = engine
            .generate(&GenerateRequest {
                prompt: request.prompt.clone(),
                negative_prompt: request.negative_prompt.clone(),
                height: final_height,
                width: final_width,
                num_frames: plan.frame_count,
                steps: settings.final_steps,
                seed: request.seed,
                output: OutputKind::Pixels,
                conditioning: conditioning.as_ref().map(|c| c.id.clone()),
                latents: Some(upscaled.id.clone()),
                denoise_strength: Some(settings.denoise_strength),
                decode_timestep: Some(settings.decode_timestep),
                image_cond_noise_scale: Some(settings.image_cond_noise_scale),
            })
            .await?;
        let GenerateOutput::Frames(decoded) = output else {
            return Err(PipelineError::Internal(
                "final pass produced latents instead of frames".into(),
            ));
        };
        live.push(decoded.id.clone());
        let mut scratch = vec![upscaled.id.clone()];
        retire(live, &upscaled.id);
        if let Some(handle) = conditioning {
            retire(live, &handle.id);
            scratch.push(handle.id);
        }
        lifecycle.leave(Stage::FinalDenoise, scratch).await;

        // -- Postprocess crop/resize --
        lifecycle.enter(Stage::PostprocessCrop);
        let frames = self
            .postprocess(id, &plan, decoded, lifecycle, live)
            .await?;

        // -- Persist --
        lifecycle.enter(Stage::Persist);
        engine.offload_frames(&frames).await?;
        let output_path = request
            .output_path
            .clone()
            .unwrap_or_else(|| settings.output_dir.join(format!("{id}.mp4")));
        engine
            .save_video(&frames, &output_path, settings.frame_rate)
            .await?;

        Ok(JobOutcome {
            output_path,
            width: frames.width,
            height: frames.height,
            frame_count: frames.frames,
        })
    }

    async fn prepare_conditioning(
        &self,
        id: &JobId,
        request: &GenerationRequest,
    ) -> Result<Option<ConditioningHandle>, PipelineError> {
        let Some(ref path) = request.conditioning_path else {
            return Ok(None);
        };
        debug!(job = %id, stage = %Stage::ConditioningPrep, path = %path.display(), "starting");
        let handle = self
            .engine
            .prepare_conditioning(path, request.width, request.height)
            .await?;
        Ok(Some(handle))
    }

    /// Recover the requested pixel window from the decoded output.
    ///
    /// When the decode came out at the padded dimensions the centered
    /// crop window inverts the planned padding; any other shape gets a
    /// full-extent window (frame trimming still applies) followed by a
    /// resize to the requested dimensions.
    async fn postprocess(
        &self,
        id: &JobId,
        plan: &ResolutionPlan,
        decoded: FrameHandle,
        lifecycle: &ResourceLifecycle<'_>,
        live: &mut Vec<HandleId>,
    ) -> Result<FrameHandle, PipelineError> {
        let engine = self.engine.as_ref();
        let mut frames = decoded;
        let mut scratch = Vec::new();

        let window = if frames.height == plan.padded_height && frames.width == plan.padded_width {
            resolution::crop_window(&plan.padding, frames.height, frames.width)
        } else {
            CropWindow {
                x: 0,
                y: 0,
                width: frames.width,
                height: frames.height,
            }
        };

        let needs_window = window.x != 0
            || window.y != 0
            || window.width != frames.width
            || window.height != frames.height;
        let needs_trim = frames.frames > plan.requested_frames;
        if needs_window || needs_trim {
            debug!(
                job = %id,
                stage = %Stage::PostprocessCrop,
                x = window.x,
                y = window.y,
                width = window.width,
                height = window.height,
                frame_count = plan.requested_frames,
                "cropping"
            );
            let cropped = engine
                .crop_frames(
                    &frames,
                    &CropSpec {
                        x: window.x,
                        y: window.y,
                        width: window.width,
                        height: window.height,
                        frame_count: plan.requested_frames,
                    },
                )
                .await?;
            live.push(cropped.id.clone());
            retire(live, &frames.id);
            scratch.push(frames.id.clone());
            frames = cropped;
        }

        if frames.width != plan.width || frames.height != plan.height {
            debug!(
                job = %id,
                stage = %Stage::PostprocessCrop,
                from_width = frames.width,
                from_height = frames.height,
                to_width = plan.width,
                to_height = plan.height,
                "resizing"
            );
            let resized = engine.resize_frames(&frames, plan.width, plan.height).await?;
            live.push(resized.id.clone());
            retire(live, &frames.id);
            scratch.push(frames.id.clone());
            frames = resized;
        }

        lifecycle.leave(Stage::PostprocessCrop, scratch).await;
        Ok(frames)
    }
}

fn retire(live: &mut Vec<HandleId>, handle: &HandleId) {
    live.retain(|h| h != handle);
}
