//! REST client for the inference sidecar.
//!
//! The sidecar keeps the model weights resident and exposes the engine
//! capabilities over a small local HTTP API. This client wraps that API
//! using [`reqwest`] and maps allocator-exhaustion responses to
//! [`EngineError::OutOfMemory`].

use std::path::Path;

use serde::Deserialize;

use crate::api::{
    ConditioningHandle, CropSpec, Engine, EngineError, FrameHandle, GenerateOutput,
    GenerateRequest, HandleId, LatentHandle, MemoryStats, OutputKind,
};
use crate::overrides::EngineOverrides;

/// Response returned by the sidecar `/load` endpoint once the model is
/// fully loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineInfo {
    pub spatial_compression_ratio: u32,
    pub temporal_compression_ratio: u32,
    /// Fixed footprint of the loaded weights, in bytes.
    pub resident_bytes: u64,
}

/// Response for calls that return a single tensor handle.
#[derive(Debug, Deserialize)]
struct HandleResponse {
    id: HandleId,
    frames: u32,
    height: u32,
    width: u32,
}

/// HTTP engine client for a single inference sidecar.
pub struct HttpEngine {
    client: reqwest::Client,
    api_url: String,
    info: EngineInfo,
}

impl HttpEngine {
    /// Connect to the sidecar and load the model, applying `overrides`
    /// exactly once. Blocks until the sidecar reports the weights
    /// resident.
    pub async fn connect(
        api_url: impl Into<String>,
        overrides: &EngineOverrides,
    ) -> Result<Self, EngineError> {
        let api_url = api_url.into();
        let client = reqwest::Client::new();

        if !overrides.is_empty() {
            tracing::info!(?overrides, "Applying configuration overrides at load");
        }
        let response = client
            .post(format!("{api_url}/load"))
            .json(overrides)
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;
        let info: EngineInfo = parse_response(response).await?;

        tracing::info!(
            api_url = %api_url,
            spatial_ratio = info.spatial_compression_ratio,
            temporal_ratio = info.temporal_compression_ratio,
            resident_bytes = info.resident_bytes,
            "Engine loaded",
        );

        Ok(Self {
            client,
            api_url,
            info,
        })
    }

    /// Loaded-engine metadata reported by the sidecar.
    pub fn info(&self) -> &EngineInfo {
        &self.info
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T, EngineError> {
        let response = self
            .client
            .post(format!("{}{endpoint}", self.api_url))
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;
        parse_response(response).await
    }

    async fn post_empty(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<(), EngineError> {
        let response = self
            .client
            .post(format!("{}{endpoint}", self.api_url))
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Engine for HttpEngine {
    fn spatial_compression_ratio(&self) -> u32 {
        self.info.spatial_compression_ratio
    }

    fn temporal_compression_ratio(&self) -> u32 {
        self.info.temporal_compression_ratio
    }

    async fn prepare_conditioning(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<ConditioningHandle, EngineError> {
        let body = serde_json::json!({
            "path": path,
            "width": width,
            "height": height,
        });
        let handle: HandleResponse = self.post_json("/conditioning", &body).await?;
        Ok(ConditioningHandle { id: handle.id })
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateOutput, EngineError> {
        let body = serde_json::to_value(request)
            .map_err(|e| EngineError::Request(format!("failed to encode request: {e}")))?;
        let handle: HandleResponse = self.post_json("/generate", &body).await?;
        Ok(match request.output {
            OutputKind::Latent => GenerateOutput::Latents(LatentHandle {
                id: handle.id,
                shape: crate::api::LatentShape {
                    frames: handle.frames,
                    height: handle.height,
                    width: handle.width,
                },
            }),
            OutputKind::Pixels => GenerateOutput::Frames(FrameHandle {
                id: handle.id,
                frames: handle.frames,
                height: handle.height,
                width: handle.width,
            }),
        })
    }

    async fn upscale(&self, latents: &LatentHandle) -> Result<LatentHandle, EngineError> {
        let body = serde_json::json!({ "latents": latents.id });
        let handle: HandleResponse = self.post_json("/upscale", &body).await?;
        Ok(LatentHandle {
            id: handle.id,
            shape: crate::api::LatentShape {
                frames: handle.frames,
                height: handle.height,
                width: handle.width,
            },
        })
    }

    async fn crop_frames(
        &self,
        frames: &FrameHandle,
        spec: &CropSpec,
    ) -> Result<FrameHandle, EngineError> {
        let body = serde_json::json!({ "frames": frames.id, "crop": spec });
        let handle: HandleResponse = self.post_json("/frames/crop", &body).await?;
        Ok(FrameHandle {
            id: handle.id,
            frames: handle.frames,
            height: handle.height,
            width: handle.width,
        })
    }

    async fn resize_frames(
        &self,
        frames: &FrameHandle,
        width: u32,
        height: u32,
    ) -> Result<FrameHandle, EngineError> {
        let body = serde_json::json!({
            "frames": frames.id,
            "width": width,
            "height": height,
        });
        let handle: HandleResponse = self.post_json("/frames/resize", &body).await?;
        Ok(FrameHandle {
            id: handle.id,
            frames: handle.frames,
            height: handle.height,
            width: handle.width,
        })
    }

    async fn offload_frames(&self, frames: &FrameHandle) -> Result<(), EngineError> {
        self.post_empty(
            "/frames/offload",
            &serde_json::json!({ "frames": frames.id }),
        )
        .await
    }

    async fn save_video(
        &self,
        frames: &FrameHandle,
        path: &Path,
        frame_rate: u32,
    ) -> Result<(), EngineError> {
        self.post_empty(
            "/frames/save",
            &serde_json::json!({
                "frames": frames.id,
                "path": path,
                "frame_rate": frame_rate,
            }),
        )
        .await
    }

    async fn release(&self, handle: &HandleId) -> Result<(), EngineError> {
        self.post_empty("/handles/release", &serde_json::json!({ "id": handle }))
            .await
    }

    async fn reclaim(&self) -> Result<(), EngineError> {
        self.post_empty("/reclaim", &serde_json::json!({})).await
    }

    async fn memory_stats(&self) -> Result<MemoryStats, EngineError> {
        let response = self
            .client
            .get(format!("{}/memory", self.api_url))
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;
        parse_response(response).await
    }
}

// ---- response helpers ----

/// Status code the sidecar uses to report allocator exhaustion.
const STATUS_INSUFFICIENT_STORAGE: u16 = 507;

/// Ensure the response has a success status code, mapping allocator
/// exhaustion (status 507 or an OOM message in the body) to
/// [`EngineError::OutOfMemory`].
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    if status.as_u16() == STATUS_INSUFFICIENT_STORAGE || body_reports_oom(&body) {
        return Err(EngineError::OutOfMemory(body));
    }
    Err(EngineError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Parse a successful JSON response body into the expected type.
async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, EngineError> {
    let response = ensure_success(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| EngineError::InvalidOutput(e.to_string()))
}

fn body_reports_oom(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("out of memory") || lower.contains("allocation failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oom_detected_in_body_text() {
        assert!(body_reports_oom("CUDA out of memory. Tried to allocate 2 GiB"));
        assert!(body_reports_oom("tensor allocation failed"));
        assert!(!body_reports_oom("invalid prompt"));
    }
}
