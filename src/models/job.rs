use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle state of a slip-reading job.
///
/// States only move forward: Queued -> Running -> Succeeded | Failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Position in the lifecycle order. Terminal states share a rank;
    /// a write that lowers the rank is a regression.
    pub fn rank(&self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::Running => 1,
            JobState::Succeeded | JobState::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Queued or Running, counted against the owning user's concurrency limit.
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }
}

/// One slip-reading request and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: String,
    pub state: JobState,
    /// Path of the stored input image, relative to the storage root.
    pub image_path: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retry_count: i32,
}

impl Job {
    pub fn new(id: Uuid, user_id: &str, image_path: &str) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            state: JobState::Queued,
            image_path: image_path.to_string(),
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            retry_count: 0,
        }
    }
}

/// Point-in-time view of a job returned to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub user_id: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            user_id: job.user_id.clone(),
            state: job.state,
            created_at: job.created_at,
            completed_at: job.completed_at,
            error: job.error.clone(),
        }
    }
}
