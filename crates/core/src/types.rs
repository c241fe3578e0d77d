//! Shared identifier types.

use serde::{Deserialize, Serialize};

/// Opaque unique identifier for a submitted job.
///
/// Generated as a uuid-v4 simple hex string so it is safe to embed in
/// file names on every platform the queue directory might live on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing id string (e.g. parsed from a queue file name).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(JobId::generate(), JobId::generate());
    }

    #[test]
    fn id_is_filename_safe() {
        let id = JobId::generate();
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
