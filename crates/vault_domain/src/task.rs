use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::{ContentId, TaskId};

/// Lifecycle of a parse-queue job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TaskStatus {
	Pending,
	Running,
	Completed,
	Failed,
}

impl TaskStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			TaskStatus::Pending => "pending",
			TaskStatus::Running => "running",
			TaskStatus::Completed => "completed",
			TaskStatus::Failed => "failed",
		}
	}
}

/// A parse-queue job. `content_id` lives inside `payload` per the spec's
/// payload shape but is duplicated as a typed column here for indexing.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Task {
	pub id: TaskId,
	pub task_type: String,
	pub content_id: ContentId,
	pub action: String,
	pub status: TaskStatus,
	pub attempt: i32,
	pub max_attempts: i32,
	pub last_error: Option<String>,
	pub created_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
}
