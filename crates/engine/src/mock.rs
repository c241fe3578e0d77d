//! In-memory engine double with device-memory accounting.
//!
//! [`MockEngine`] tracks every handle's byte footprint so tests can
//! assert that scratch occupancy returns to the pre-job baseline while
//! the resident weight footprint persists. It also records generate
//! calls (seeds, steps, starting latents) and supports one-shot failure
//! injection per operation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::api::{
    ConditioningHandle, CropSpec, Engine, EngineError, FrameHandle, GenerateOutput,
    GenerateRequest, HandleId, LatentHandle, LatentShape, MemoryStats, OutputKind,
};

/// Pretend footprint of the resident model weights.
pub const MOCK_RESIDENT_BYTES: u64 = 1_500_000_000;

/// Record of one `generate` invocation, for test assertions.
#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub seed: u64,
    pub steps: u32,
    pub height: u32,
    pub width: u32,
    pub num_frames: u32,
    pub output: OutputKind,
    pub starting_latents: Option<HandleId>,
    pub conditioning: Option<HandleId>,
    pub denoise_strength: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TensorKind {
    Latent,
    Frames,
    Conditioning,
}

#[derive(Debug, Clone)]
struct MockTensor {
    kind: TensorKind,
    bytes: u64,
    /// False once offloaded to host memory.
    on_device: bool,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    op: &'static str,
    out_of_memory: bool,
    message: String,
}

#[derive(Default)]
struct MockState {
    tensors: HashMap<HandleId, MockTensor>,
    next_id: u64,
    /// Device bytes beyond the resident weights.
    scratch_allocated: u64,
    /// Allocator cache high-water mark since the last reclaim.
    scratch_reserved: u64,
    generate_calls: Vec<GenerateCall>,
    reclaim_count: u64,
    fail_next: Option<InjectedFailure>,
}

/// Deterministic in-memory [`Engine`] implementation.
pub struct MockEngine {
    spatial_ratio: u32,
    temporal_ratio: u32,
    upscale_factor: u32,
    /// Latent dimensions of the upscale output are truncated to this
    /// multiple, emulating an upscaler whose native alignment does not
    /// match the nominal factor.
    upscale_snap: u32,
    state: Mutex<MockState>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            spatial_ratio: 32,
            temporal_ratio: 8,
            upscale_factor: 2,
            upscale_snap: 1,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Truncate upscale output latent dimensions to a multiple of `snap`.
    pub fn with_upscale_snap(mut self, snap: u32) -> Self {
        self.upscale_snap = snap.max(1);
        self
    }

    /// Fail the next call to `op` ("generate", "upscale", "crop",
    /// "resize", "save", "conditioning").
    pub fn fail_next(&self, op: &'static str, out_of_memory: bool, message: &str) {
        self.lock().fail_next = Some(InjectedFailure {
            op,
            out_of_memory,
            message: message.to_string(),
        });
    }

    /// Device bytes currently allocated beyond the resident weights.
    pub fn scratch_allocated(&self) -> u64 {
        self.lock().scratch_allocated
    }

    /// Number of live tensor handles (device or host).
    pub fn live_handles(&self) -> usize {
        self.lock().tensors.len()
    }

    /// All recorded `generate` calls, in order.
    pub fn generate_calls(&self) -> Vec<GenerateCall> {
        self.lock().generate_calls.clone()
    }

    /// How many times `reclaim` has been invoked.
    pub fn reclaim_count(&self) -> u64 {
        self.lock().reclaim_count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_failure(&self, op: &'static str) -> Result<(), EngineError> {
        let mut state = self.lock();
        if state.fail_next.as_ref().is_some_and(|f| f.op == op) {
            let failure = state.fail_next.take().unwrap();
            return Err(if failure.out_of_memory {
                EngineError::OutOfMemory(failure.message)
            } else {
                EngineError::InvalidOutput(failure.message)
            });
        }
        Ok(())
    }

    fn alloc(&self, kind: TensorKind, bytes: u64) -> HandleId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("mock-{}", state.next_id);
        state.scratch_allocated += bytes;
        state.scratch_reserved = state.scratch_reserved.max(state.scratch_allocated);
        state.tensors.insert(
            id.clone(),
            MockTensor {
                kind,
                bytes,
                on_device: true,
            },
        );
        id
    }

    fn expect_kind(&self, id: &HandleId, kind: TensorKind) -> Result<(), EngineError> {
        match self.lock().tensors.get(id) {
            Some(t) if t.kind == kind => Ok(()),
            Some(_) => Err(EngineError::InvalidOutput(format!(
                "handle {id} has the wrong tensor kind"
            ))),
            None => Err(EngineError::InvalidOutput(format!("unknown handle {id}"))),
        }
    }

    fn latent_frames(&self, num_frames: u32) -> u32 {
        (num_frames.max(1) - 1) / self.temporal_ratio + 1
    }
}

fn latent_bytes(shape: &LatentShape) -> u64 {
    // 128 channels, 2 bytes per element.
    shape.frames as u64 * shape.height as u64 * shape.width as u64 * 128 * 2
}

fn frame_bytes(frames: u32, height: u32, width: u32) -> u64 {
    frames as u64 * height as u64 * width as u64 * 3
}

#[async_trait::async_trait]
impl Engine for MockEngine {
    fn spatial_compression_ratio(&self) -> u32 {
        self.spatial_ratio
    }

    fn temporal_compression_ratio(&self) -> u32 {
        self.temporal_ratio
    }

    async fn prepare_conditioning(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<ConditioningHandle, EngineError> {
        self.check_failure("conditioning")?;
        if !path.exists() {
            return Err(EngineError::Request(format!(
                "conditioning media not found: {}",
                path.display()
            )));
        }
        let id = self.alloc(TensorKind::Conditioning, frame_bytes(1, height, width));
        Ok(ConditioningHandle { id })
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateOutput, EngineError> {
        self.check_failure("generate")?;
        if let Some(ref cond) = request.conditioning {
            self.expect_kind(cond, TensorKind::Conditioning)?;
        }
        if let Some(ref latents) = request.latents {
            self.expect_kind(latents, TensorKind::Latent)?;
        }

        self.lock().generate_calls.push(GenerateCall {
            seed: request.seed,
            steps: request.steps,
            height: request.height,
            width: request.width,
            num_frames: request.num_frames,
            output: request.output,
            starting_latents: request.latents.clone(),
            conditioning: request.conditioning.clone(),
            denoise_strength: request.denoise_strength,
        });

        match request.output {
            OutputKind::Latent => {
                let shape = LatentShape {
                    frames: self.latent_frames(request.num_frames),
                    height: request.height / self.spatial_ratio,
                    width: request.width / self.spatial_ratio,
                };
                let id = self.alloc(TensorKind::Latent, latent_bytes(&shape));
                Ok(GenerateOutput::Latents(LatentHandle { id, shape }))
            }
            OutputKind::Pixels => {
                let (frames, height, width) = (request.num_frames, request.height, request.width);
                let id = self.alloc(TensorKind::Frames, frame_bytes(frames, height, width));
                Ok(GenerateOutput::Frames(FrameHandle {
                    id,
                    frames,
                    height,
                    width,
                }))
            }
        }
    }

    async fn upscale(&self, latents: &LatentHandle) -> Result<LatentHandle, EngineError> {
        self.check_failure("upscale")?;
        self.expect_kind(&latents.id, TensorKind::Latent)?;
        let snap = |v: u32| {
            let scaled = v * self.upscale_factor;
            ((scaled / self.upscale_snap) * self.upscale_snap).max(self.upscale_snap)
        };
        let shape = LatentShape {
            frames: latents.shape.frames,
            height: snap(latents.shape.height),
            width: snap(latents.shape.width),
        };
        let id = self.alloc(TensorKind::Latent, latent_bytes(&shape));
        Ok(LatentHandle { id, shape })
    }

    async fn crop_frames(
        &self,
        frames: &FrameHandle,
        spec: &CropSpec,
    ) -> Result<FrameHandle, EngineError> {
        self.check_failure("crop")?;
        self.expect_kind(&frames.id, TensorKind::Frames)?;
        if spec.x + spec.width > frames.width || spec.y + spec.height > frames.height {
            return Err(EngineError::InvalidOutput(format!(
                "crop window {spec:?} exceeds frame bounds {}x{}",
                frames.width, frames.height
            )));
        }
        let count = spec.frame_count.min(frames.frames);
        let id = self.alloc(TensorKind::Frames, frame_bytes(count, spec.height, spec.width));
        Ok(FrameHandle {
            id,
            frames: count,
            height: spec.height,
            width: spec.width,
        })
    }

    async fn resize_frames(
        &self,
        frames: &FrameHandle,
        width: u32,
        height: u32,
    ) -> Result<FrameHandle, EngineError> {
        self.check_failure("resize")?;
        self.expect_kind(&frames.id, TensorKind::Frames)?;
        let id = self.alloc(TensorKind::Frames, frame_bytes(frames.frames, height, width));
        Ok(FrameHandle {
            id,
            frames: frames.frames,
            height,
            width,
        })
    }

    async fn offload_frames(&self, frames: &FrameHandle) -> Result<(), EngineError> {
        let mut state = self.lock();
        let Some(tensor) = state.tensors.get_mut(&frames.id) else {
            return Err(EngineError::InvalidOutput(format!(
                "unknown handle {}",
                frames.id
            )));
        };
        if tensor.on_device {
            tensor.on_device = false;
            let bytes = tensor.bytes;
            state.scratch_allocated = state.scratch_allocated.saturating_sub(bytes);
        }
        Ok(())
    }

    async fn save_video(
        &self,
        frames: &FrameHandle,
        path: &Path,
        frame_rate: u32,
    ) -> Result<(), EngineError> {
        self.check_failure("save")?;
        self.expect_kind(&frames.id, TensorKind::Frames)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Request(format!("cannot create output dir: {e}")))?;
        }
        let contents = format!(
            "mock-video {}x{} frames={} fps={frame_rate}\n",
            frames.width, frames.height, frames.frames
        );
        std::fs::write(path, contents)
            .map_err(|e| EngineError::Request(format!("cannot write artifact: {e}")))?;
        Ok(())
    }

    async fn release(&self, handle: &HandleId) -> Result<(), EngineError> {
        let mut state = self.lock();
        if let Some(tensor) = state.tensors.remove(handle) {
            if tensor.on_device {
                state.scratch_allocated = state.scratch_allocated.saturating_sub(tensor.bytes);
            }
        }
        // Releasing an already-released handle is a no-op, matching
        // allocator semantics the lifecycle relies on during cleanup.
        Ok(())
    }

    async fn reclaim(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.scratch_reserved = state.scratch_allocated;
        state.reclaim_count += 1;
        Ok(())
    }

    async fn memory_stats(&self) -> Result<MemoryStats, EngineError> {
        let state = self.lock();
        Ok(MemoryStats {
            allocated_bytes: MOCK_RESIDENT_BYTES + state.scratch_allocated,
            reserved_bytes: MOCK_RESIDENT_BYTES + state.scratch_reserved,
            resident_bytes: MOCK_RESIDENT_BYTES,
        })
    }
}
