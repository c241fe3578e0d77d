//! Explicit engine configuration overrides.
//!
//! Replaces runtime attribute probing with an enumerated structure
//! applied exactly once at engine load. Every field is optional; `None`
//! means "use the engine's default".

use serde::{Deserialize, Serialize};

/// Optional overrides sent with the engine load request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOverrides {
    /// VAE spatial compression ratio (pixels per latent unit).
    pub vae_spatial_compression_ratio: Option<u32>,
    /// VAE temporal compression ratio (frames per latent frame).
    pub vae_temporal_compression_ratio: Option<u32>,
    pub transformer_num_attention_heads: Option<u32>,
    pub transformer_num_layers: Option<u32>,
    pub transformer_attention_head_dim: Option<u32>,
    pub scheduler_num_train_timesteps: Option<u32>,
    pub scheduler_stochastic_sampling: Option<bool>,
    pub scheduler_use_karras_sigmas: Option<bool>,
}

impl EngineOverrides {
    /// True when every field is left at the engine default.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
