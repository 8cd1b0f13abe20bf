//! Queued generation task model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::types::{GenerationParams, GenerationResult};

/// Externally visible task status.
///
/// `Pending → Processing → {Completed | Failed}`; internal retries stay
/// within `Processing` and never flicker the status back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A queued unit of generation work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub params: GenerationParams,
    pub status: TaskStatus,

    /// Synthetic progress estimate in [0, 100]; never reaches 100 before
    /// genuine completion
    pub progress: u8,

    #[serde(default)]
    pub result: Option<GenerationResult>,

    #[serde(default)]
    pub error: Option<String>,

    /// Tries made so far (including the first)
    #[serde(default)]
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(params: GenerationParams) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            params,
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Whether the task has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}
