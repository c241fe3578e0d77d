//! Pipeline stage state machine.

/// Stages a job moves through, in order. `Failed` is reachable from
/// any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Planning,
    ConditioningPrep,
    LowResGenerate,
    LatentUpscale,
    FinalDenoise,
    PostprocessCrop,
    Persist,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::ConditioningPrep => "conditioning_prep",
            Self::LowResGenerate => "low_res_generate",
            Self::LatentUpscale => "latent_upscale",
            Self::FinalDenoise => "final_denoise",
            Self::PostprocessCrop => "postprocess_crop",
            Self::Persist => "persist",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_done_and_failed_are_terminal() {
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Planning.is_terminal());
        assert!(!Stage::Persist.is_terminal());
    }

    #[test]
    fn names_are_stable_log_labels() {
        assert_eq!(Stage::LowResGenerate.to_string(), "low_res_generate");
        assert_eq!(Stage::PostprocessCrop.name(), "postprocess_crop");
    }
}
