//! At-rest representations of a job's input and outcome.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vidforge_core::job::GenerationRequest;
use vidforge_core::types::JobId;

/// Durable representation of a job's input, keyed by its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: JobId,
    pub request: GenerationRequest,
    pub submitted_at: DateTime<Utc>,
}

impl CommandRecord {
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            id: JobId::generate(),
            request,
            submitted_at: Utc::now(),
        }
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Durable representation of a job's outcome, keyed by the same id as
/// the command record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: JobId,
    pub status: ResultStatus,
    /// Location of the produced artifact, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Human-readable message, present on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn success(id: JobId, output_path: PathBuf) -> Self {
        Self {
            id,
            status: ResultStatus::Success,
            output_path: Some(output_path),
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn error(id: JobId, message: impl Into<String>) -> Self {
        Self {
            id,
            status: ResultStatus::Error,
            output_path: None,
            error: Some(message.into()),
            completed_at: Utc::now(),
        }
    }
}
