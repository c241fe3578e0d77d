//! Tunable pipeline parameters.

use std::path::PathBuf;

/// Knobs for the staged pipeline. Defaults mirror the distilled
/// multi-scale configuration the model ships with.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Factor applied to the requested resolution for the first pass.
    pub downscale_factor: f64,
    /// Nominal spatial factor of the latent upscaler. Informational
    /// only: the upscale output shape is always read back from the
    /// engine rather than derived from this value.
    pub upscale_factor: f64,
    /// Alignment modulus every planned dimension must satisfy.
    pub alignment: u32,
    /// Smallest legal planned dimension.
    pub min_dimension: u32,
    /// Denoising steps for the low-resolution pass.
    pub base_steps: u32,
    /// Denoising steps for the final refinement pass.
    pub final_steps: u32,
    /// Denoise strength of the final pass (< 1.0: partial denoise over
    /// the upscaled latents, not generation from pure noise).
    pub denoise_strength: f64,
    /// Timestep used when decoding latents to pixels.
    pub decode_timestep: f64,
    /// Noise added to image conditioning during generation.
    pub image_cond_noise_scale: f64,
    /// Frame rate of the encoded artifact.
    pub frame_rate: u32,
    /// Directory for artifacts when the request carries no output hint.
    pub output_dir: PathBuf,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            downscale_factor: 0.67,
            upscale_factor: 2.0,
            alignment: 32,
            min_dimension: 32,
            base_steps: 50,
            final_steps: 10,
            denoise_strength: 0.3,
            decode_timestep: 0.05,
            image_cond_noise_scale: 0.025,
            frame_rate: 24,
            output_dir: PathBuf::from("outputs"),
        }
    }
}
