use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::{BotChatId, ContentId, DistributionRuleId, QueueItemId};

/// Lifecycle of a `ContentQueueItem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum QueueItemStatus {
	Pending,
	Scheduled,
	Processing,
	Success,
	Failed,
	Skipped,
	Canceled,
}

impl QueueItemStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			QueueItemStatus::Pending => "pending",
			QueueItemStatus::Scheduled => "scheduled",
			QueueItemStatus::Processing => "processing",
			QueueItemStatus::Success => "success",
			QueueItemStatus::Failed => "failed",
			QueueItemStatus::Skipped => "skipped",
			QueueItemStatus::Canceled => "canceled",
		}
	}

	/// Terminal statuses are never touched again except by explicit operator
	/// action (invariant 5 in the spec's testable-properties list).
	pub const fn is_terminal(self) -> bool {
		matches!(self, QueueItemStatus::Success | QueueItemStatus::Skipped | QueueItemStatus::Canceled)
	}
}

/// Cached outcome of the Rule Engine's per-target decision, stored alongside
/// the queue item so the Distribution Worker does not need to recompute NSFW
/// routing on every claim.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NsfwRoutingResult {
	pub target_id: Option<String>,
}

/// One pending (or resolved) push of one Content to one target under one rule.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContentQueueItem {
	pub id: QueueItemId,
	pub content_id: ContentId,
	pub rule_id: DistributionRuleId,
	pub bot_chat_id: BotChatId,
	pub target_platform: String,
	pub target_id: String,
	pub status: QueueItemStatus,
	pub priority: i32,
	pub scheduled_at: Option<DateTime<Utc>>,
	pub needs_approval: bool,
	pub approved_at: Option<DateTime<Utc>>,
	pub approved_by: Option<String>,
	pub attempt_count: i32,
	pub max_attempts: i32,
	pub next_attempt_at: Option<DateTime<Utc>>,
	pub locked_at: Option<DateTime<Utc>>,
	pub locked_by: Option<String>,
	pub message_id: Option<String>,
	pub last_error: Option<String>,
	pub last_error_type: Option<String>,
	pub last_error_at: Option<DateTime<Utc>>,
	pub nsfw_routing_result: Option<NsfwRoutingResult>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

impl ContentQueueItem {
	/// The target_id to actually push to: the NSFW routing decision wins over
	/// the item's own cached `target_id` when present.
	pub fn effective_target_id(&self) -> &str {
		self.nsfw_routing_result
			.as_ref()
			.and_then(|r| r.target_id.as_deref())
			.unwrap_or(&self.target_id)
	}

	/// Whether a lock held by some worker has expired and may be reclaimed.
	pub fn lock_expired(&self, now: DateTime<Utc>, lock_timeout: chrono::Duration) -> bool {
		match self.locked_at {
			None => true,
			Some(locked_at) => now - locked_at >= lock_timeout,
		}
	}
}

/// One successful push, append-only, the secondary dedup barrier alongside
/// the queue item's own unique constraint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PushedRecord {
	pub content_id: ContentId,
	pub target_platform: String,
	pub target_id: String,
	pub message_id: Option<String>,
	pub push_status: String,
	pub error_message: Option<String>,
	pub pushed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_statuses() {
		assert!(QueueItemStatus::Success.is_terminal());
		assert!(QueueItemStatus::Skipped.is_terminal());
		assert!(QueueItemStatus::Canceled.is_terminal());
		assert!(!QueueItemStatus::Failed.is_terminal());
		assert!(!QueueItemStatus::Scheduled.is_terminal());
	}

	#[test]
	fn effective_target_id_prefers_routing_result() {
		let mut item = sample_item();
		assert_eq!(item.effective_target_id(), "default-chat");

		item.nsfw_routing_result = Some(NsfwRoutingResult {
			target_id: Some("nsfw-123".into()),
		});
		assert_eq!(item.effective_target_id(), "nsfw-123");
	}

	fn sample_item() -> ContentQueueItem {
		let now = Utc::now();
		ContentQueueItem {
			id: QueueItemId::new(1),
			content_id: ContentId::new(1),
			rule_id: DistributionRuleId::new(1),
			bot_chat_id: BotChatId::new(1),
			target_platform: "telegram".into(),
			target_id: "default-chat".into(),
			status: QueueItemStatus::Scheduled,
			priority: 0,
			scheduled_at: Some(now),
			needs_approval: false,
			approved_at: None,
			approved_by: None,
			attempt_count: 0,
			max_attempts: 3,
			next_attempt_at: None,
			locked_at: None,
			locked_by: None,
			message_id: None,
			last_error: None,
			last_error_type: None,
			last_error_at: None,
			nsfw_routing_result: None,
			started_at: None,
			completed_at: None,
			created_at: now,
		}
	}
}
