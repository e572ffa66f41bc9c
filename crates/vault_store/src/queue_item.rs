//! Repository functions for `content_queue_items` (component K, §4.K),
//! including the optimistic-lock claim query the Distribution Worker Pool
//! polls on (§4.I).

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use vault_domain::{
	BotChatId, ContentId, ContentQueueItem, DistributionRuleId, NsfwRoutingResult, PushedRecord, QueueItemId, QueueItemStatus,
};

use crate::codecs;
use crate::error::StoreError;
use crate::pool::VaultPool;

/// Claimed items are considered abandoned after this long without progress
/// and may be reclaimed by another worker.
pub const LOCK_TIMEOUT_SECS: i64 = 600;

fn row_to_item(row: SqliteRow) -> Result<ContentQueueItem, StoreError> {
	let status: String = row.try_get("status")?;
	let nsfw_routing_result: Option<String> = row.try_get("nsfw_routing_result")?;

	Ok(ContentQueueItem {
		id: QueueItemId::new(row.try_get("id")?),
		content_id: ContentId::new(row.try_get("content_id")?),
		rule_id: DistributionRuleId::new(row.try_get("rule_id")?),
		bot_chat_id: BotChatId::new(row.try_get("bot_chat_id")?),
		target_platform: row.try_get("target_platform")?,
		target_id: row.try_get("target_id")?,
		status: codecs::queue_item_status(&status)?,
		priority: row.try_get("priority")?,
		scheduled_at: row.try_get("scheduled_at")?,
		needs_approval: row.try_get::<i64, _>("needs_approval")? != 0,
		approved_at: row.try_get("approved_at")?,
		approved_by: row.try_get("approved_by")?,
		attempt_count: row.try_get("attempt_count")?,
		max_attempts: row.try_get("max_attempts")?,
		next_attempt_at: row.try_get("next_attempt_at")?,
		locked_at: row.try_get("locked_at")?,
		locked_by: row.try_get("locked_by")?,
		message_id: row.try_get("message_id")?,
		last_error: row.try_get("last_error")?,
		last_error_type: row.try_get("last_error_type")?,
		last_error_at: row.try_get("last_error_at")?,
		nsfw_routing_result: nsfw_routing_result.as_deref().map(serde_json::from_str::<NsfwRoutingResult>).transpose()?,
		started_at: row.try_get("started_at")?,
		completed_at: row.try_get("completed_at")?,
		created_at: row.try_get("created_at")?,
	})
}

pub struct NewQueueItem {
	pub content_id: ContentId,
	pub rule_id: DistributionRuleId,
	pub bot_chat_id: BotChatId,
	pub target_platform: String,
	pub target_id: String,
	pub priority: i32,
	pub scheduled_at: Option<DateTime<Utc>>,
	pub needs_approval: bool,
	pub max_attempts: i32,
}

/// Inserts a queue item, or does nothing if one already exists for the same
/// `(content_id, rule_id, bot_chat_id)` triple (the Enqueue Service's dedup
/// barrier, §4.H).
pub async fn insert_if_absent(pool: &VaultPool, new: NewQueueItem) -> Result<Option<ContentQueueItem>, StoreError> {
	let status = if new.needs_approval { QueueItemStatus::Pending } else { QueueItemStatus::Scheduled };
	let now = Utc::now();

	let id = sqlx::query(
		"INSERT INTO content_queue_items
			(content_id, rule_id, bot_chat_id, target_platform, target_id, status, priority,
			 scheduled_at, needs_approval, max_attempts, created_at)
		 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
		 ON CONFLICT (content_id, rule_id, bot_chat_id) DO NOTHING",
	)
	.bind(new.content_id.get())
	.bind(new.rule_id.get())
	.bind(new.bot_chat_id.get())
	.bind(&new.target_platform)
	.bind(&new.target_id)
	.bind(status.as_str())
	.bind(new.priority)
	.bind(new.scheduled_at)
	.bind(new.needs_approval as i64)
	.bind(new.max_attempts)
	.bind(now)
	.execute(pool.raw())
	.await?
	.last_insert_rowid();

	if id == 0 {
		return Ok(None);
	}
	get(pool, QueueItemId::new(id)).await
}

pub async fn get(pool: &VaultPool, id: QueueItemId) -> Result<Option<ContentQueueItem>, StoreError> {
	let row = sqlx::query("SELECT * FROM content_queue_items WHERE id = ?").bind(id.get()).fetch_optional(pool.raw()).await?;
	row.map(row_to_item).transpose()
}

/// The existing queue item for this `(content, rule, target)` triple, if
/// any — the Enqueue Service's per-pair existing-item lookup (§4.H step 5).
pub async fn get_for_content_rule_chat(
	pool: &VaultPool,
	content_id: ContentId,
	rule_id: DistributionRuleId,
	bot_chat_id: BotChatId,
) -> Result<Option<ContentQueueItem>, StoreError> {
	let row = sqlx::query("SELECT * FROM content_queue_items WHERE content_id = ? AND rule_id = ? AND bot_chat_id = ?")
		.bind(content_id.get())
		.bind(rule_id.get())
		.bind(bot_chat_id.get())
		.fetch_optional(pool.raw())
		.await?;
	row.map(row_to_item).transpose()
}

/// Resets a `failed` item back into the schedule for a forced re-enqueue
/// (§4.H step 5, "FAILED and force"): clears error/retry state, updates the
/// cached target and routing result, and recomputes `scheduled_at`.
pub async fn reset_for_force_reenqueue(
	pool: &VaultPool,
	id: QueueItemId,
	target_platform: &str,
	target_id: &str,
	routing_result: Option<&NsfwRoutingResult>,
	needs_approval: bool,
	scheduled_at: Option<DateTime<Utc>>,
) -> Result<(), StoreError> {
	let routing_json = routing_result.map(serde_json::to_string).transpose()?;
	let status = if needs_approval { QueueItemStatus::Pending } else { QueueItemStatus::Scheduled };
	sqlx::query(
		"UPDATE content_queue_items SET status = ?, target_platform = ?, target_id = ?, nsfw_routing_result = ?,
			needs_approval = ?, scheduled_at = ?, next_attempt_at = NULL, last_error = NULL, last_error_type = NULL,
			last_error_at = NULL, locked_at = NULL, locked_by = NULL, completed_at = NULL WHERE id = ?",
	)
	.bind(status.as_str())
	.bind(target_platform)
	.bind(target_id)
	.bind(routing_json)
	.bind(needs_approval as i64)
	.bind(scheduled_at)
	.bind(id.get())
	.execute(pool.raw())
	.await?;
	Ok(())
}

/// Atomically claims up to `batch_size` items that are due and not
/// (validly) locked by another worker, stamping them `processing` and
/// `locked_by = worker_id`. Mirrors `_claim_items` in the original queue
/// worker: `scheduled`/`failed` items whose `scheduled_at`/`next_attempt_at`
/// has passed, ordered by priority then schedule time then id.
pub async fn claim_batch(
	pool: &VaultPool,
	worker_id: &str,
	batch_size: i64,
) -> Result<Vec<ContentQueueItem>, StoreError> {
	let now = Utc::now();
	let lock_cutoff = now - chrono::Duration::seconds(LOCK_TIMEOUT_SECS);

	let rows = sqlx::query(
		"SELECT q.id FROM content_queue_items q
		 JOIN bot_chats c ON c.id = q.bot_chat_id
		 WHERE q.status IN ('scheduled', 'failed')
		   AND q.needs_approval = 0
		   AND (q.locked_at IS NULL OR q.locked_at < ?)
		   AND (q.scheduled_at IS NULL OR q.scheduled_at <= ?)
		   AND (q.next_attempt_at IS NULL OR q.next_attempt_at <= ?)
		   AND c.enabled = 1 AND c.is_accessible = 1
		 ORDER BY q.priority DESC, q.scheduled_at ASC, q.id ASC
		 LIMIT ?",
	)
	.bind(lock_cutoff)
	.bind(now)
	.bind(now)
	.bind(batch_size)
	.fetch_all(pool.raw())
	.await?;

	let mut claimed = Vec::with_capacity(rows.len());
	for row in rows {
		let id: i64 = row.try_get("id")?;
		let result = sqlx::query(
			"UPDATE content_queue_items SET status = 'processing', locked_at = ?, locked_by = ?, started_at = ?
			 WHERE id = ? AND status IN ('scheduled', 'failed') AND (locked_at IS NULL OR locked_at < ?)",
		)
		.bind(now)
		.bind(worker_id)
		.bind(now)
		.bind(id)
		.bind(lock_cutoff)
		.execute(pool.raw())
		.await?;

		if result.rows_affected() == 1 {
			if let Some(item) = get(pool, QueueItemId::new(id)).await? {
				claimed.push(item);
			}
		}
	}

	Ok(claimed)
}

/// Records a successful push: terminal `success` status, the sink's message
/// id, and the NSFW routing result used (so a retry inspecting history can
/// see which target actually received it).
pub async fn mark_success(
	pool: &VaultPool,
	id: QueueItemId,
	message_id: Option<&str>,
	routing_result: Option<&NsfwRoutingResult>,
) -> Result<(), StoreError> {
	let routing_json = routing_result.map(serde_json::to_string).transpose()?;
	sqlx::query(
		"UPDATE content_queue_items SET status = 'success', message_id = ?, nsfw_routing_result = ?,
			completed_at = ?, locked_at = NULL, locked_by = NULL WHERE id = ?",
	)
	.bind(message_id)
	.bind(routing_json)
	.bind(Utc::now())
	.bind(id.get())
	.execute(pool.raw())
	.await?;
	Ok(())
}

/// Records a failed attempt. If `attempt_count + 1 >= max_attempts` the item
/// goes terminal (`failed` stays, but `next_attempt_at` is left null so
/// `claim_batch` never picks it up again); otherwise it's rescheduled with
/// `next_attempt_at` (the backoff the caller computed, §4.I step
/// `_handle_failure`).
pub async fn record_failure(
	pool: &VaultPool,
	id: QueueItemId,
	error: &str,
	error_type: &str,
	next_attempt_at: Option<DateTime<Utc>>,
) -> Result<(), StoreError> {
	sqlx::query(
		"UPDATE content_queue_items SET status = 'failed', attempt_count = attempt_count + 1,
			last_error = ?, last_error_type = ?, last_error_at = ?, next_attempt_at = ?,
			locked_at = NULL, locked_by = NULL WHERE id = ?",
	)
	.bind(error)
	.bind(error_type)
	.bind(Utc::now())
	.bind(next_attempt_at)
	.bind(id.get())
	.execute(pool.raw())
	.await?;
	Ok(())
}

pub async fn mark_skipped(pool: &VaultPool, id: QueueItemId, reason: &str) -> Result<(), StoreError> {
	sqlx::query(
		"UPDATE content_queue_items SET status = 'skipped', last_error = ?, completed_at = ?,
			locked_at = NULL, locked_by = NULL WHERE id = ?",
	)
	.bind(reason)
	.bind(Utc::now())
	.bind(id.get())
	.execute(pool.raw())
	.await?;
	Ok(())
}

/// Manual operator override: reschedules an item for immediate reprocessing
/// regardless of its current `next_attempt_at` (`process_item_now`, §4.I).
pub async fn force_reschedule_now(pool: &VaultPool, id: QueueItemId) -> Result<(), StoreError> {
	sqlx::query(
		"UPDATE content_queue_items SET status = 'scheduled', next_attempt_at = NULL, scheduled_at = ?,
			locked_at = NULL, locked_by = NULL WHERE id = ?",
	)
	.bind(Utc::now())
	.bind(id.get())
	.execute(pool.raw())
	.await?;
	Ok(())
}

pub async fn approve(pool: &VaultPool, id: QueueItemId, approved_by: &str) -> Result<(), StoreError> {
	sqlx::query(
		"UPDATE content_queue_items SET status = 'scheduled', needs_approval = 0, approved_at = ?, approved_by = ?
		 WHERE id = ? AND status = 'pending'",
	)
	.bind(Utc::now())
	.bind(approved_by)
	.bind(id.get())
	.execute(pool.raw())
	.await?;
	Ok(())
}

pub async fn reject(pool: &VaultPool, id: QueueItemId) -> Result<(), StoreError> {
	sqlx::query("UPDATE content_queue_items SET status = 'canceled', completed_at = ? WHERE id = ? AND status = 'pending'")
		.bind(Utc::now())
		.bind(id.get())
		.execute(pool.raw())
		.await?;
	Ok(())
}

/// How many `success` pushes a target has made inside `window_secs` ending
/// now: the rate-limit check the Enqueue Service consults before computing
/// `scheduled_at` (§4.H `compute_auto_scheduled_at`).
pub async fn count_recent_successes(
	pool: &VaultPool,
	bot_chat_id: BotChatId,
	window_secs: i64,
) -> Result<i64, StoreError> {
	let since = Utc::now() - chrono::Duration::seconds(window_secs);
	let row = sqlx::query(
		"SELECT COUNT(*) AS n FROM content_queue_items WHERE bot_chat_id = ? AND status = 'success' AND completed_at >= ?",
	)
	.bind(bot_chat_id.get())
	.bind(since)
	.fetch_one(pool.raw())
	.await?;
	Ok(row.try_get("n")?)
}

/// The latest `scheduled_at`/`next_attempt_at` among pending work for a
/// target, used to stack new items after the existing queue rather than
/// bursting them all at the rate limit boundary.
pub async fn latest_due_time(pool: &VaultPool, bot_chat_id: BotChatId) -> Result<Option<DateTime<Utc>>, StoreError> {
	let row = sqlx::query(
		"SELECT MAX(COALESCE(next_attempt_at, scheduled_at)) AS t FROM content_queue_items
		 WHERE bot_chat_id = ? AND status IN ('pending', 'scheduled', 'failed')",
	)
	.bind(bot_chat_id.get())
	.fetch_one(pool.raw())
	.await?;
	Ok(row.try_get("t")?)
}

pub async fn insert_pushed_record(pool: &VaultPool, record: &PushedRecord) -> Result<bool, StoreError> {
	let result = sqlx::query(
		"INSERT INTO pushed_records (content_id, target_platform, target_id, message_id, push_status, error_message, pushed_at)
		 VALUES (?, ?, ?, ?, ?, ?, ?)
		 ON CONFLICT (content_id, target_id) DO NOTHING",
	)
	.bind(record.content_id.get())
	.bind(&record.target_platform)
	.bind(&record.target_id)
	.bind(&record.message_id)
	.bind(&record.push_status)
	.bind(&record.error_message)
	.bind(record.pushed_at)
	.execute(pool.raw())
	.await?;
	Ok(result.rows_affected() == 1)
}

/// Latest `pushed_at` across every successful push to `target_id`, used as
/// one half of the rate-limit anchor in `compute_auto_scheduled_at`.
pub async fn latest_pushed_at(pool: &VaultPool, target_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
	let row = sqlx::query("SELECT MAX(pushed_at) AS t FROM pushed_records WHERE target_id = ? AND push_status = 'success'")
		.bind(target_id)
		.fetch_one(pool.raw())
		.await?;
	Ok(row.try_get("t")?)
}

/// Count and earliest timestamp of successful pushes to `target_id` inside
/// `[now - window_secs, now]`, the rate-limit window check (§4.H).
pub async fn successes_in_window(
	pool: &VaultPool,
	target_id: &str,
	window_secs: i64,
) -> Result<(i64, Option<DateTime<Utc>>), StoreError> {
	let since = Utc::now() - chrono::Duration::seconds(window_secs);
	let row = sqlx::query(
		"SELECT COUNT(*) AS n, MIN(pushed_at) AS earliest FROM pushed_records
		 WHERE target_id = ? AND push_status = 'success' AND pushed_at >= ?",
	)
	.bind(target_id)
	.bind(since)
	.fetch_one(pool.raw())
	.await?;
	Ok((row.try_get("n")?, row.try_get("earliest")?))
}

pub async fn already_pushed(pool: &VaultPool, content_id: ContentId, target_id: &str) -> Result<bool, StoreError> {
	let row = sqlx::query("SELECT COUNT(*) AS n FROM pushed_records WHERE content_id = ? AND target_id = ?")
		.bind(content_id.get())
		.bind(target_id)
		.fetch_one(pool.raw())
		.await?;
	let n: i64 = row.try_get("n")?;
	Ok(n > 0)
}
