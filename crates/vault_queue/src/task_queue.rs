//! The durable FIFO of parse jobs (component E, §4.E): a `parse_tasks`
//! table with claim-by-update dequeue, backed by the pool `vault_store`
//! owns the schema for.

use std::time::Duration;

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use vault_domain::{ContentId, Task, TaskId, TaskStatus};
use vault_store::VaultPool;

use crate::error::QueueError;

/// How long `dequeue` sleeps between empty polls while waiting out its
/// caller-supplied timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn task_status_from_str(s: &str) -> Result<TaskStatus, QueueError> {
	match s {
		"pending" => Ok(TaskStatus::Pending),
		"running" => Ok(TaskStatus::Running),
		"completed" => Ok(TaskStatus::Completed),
		"failed" => Ok(TaskStatus::Failed),
		other => Err(vault_store::StoreError::InvalidEnum(format!("TaskStatus: {other}")).into()),
	}
}

fn row_to_task(row: SqliteRow) -> Result<Task, QueueError> {
	let status: String = row.try_get("status").map_err(vault_store::StoreError::from)?;
	Ok(Task {
		id: TaskId::new(row.try_get("id").map_err(vault_store::StoreError::from)?),
		task_type: row.try_get("task_type").map_err(vault_store::StoreError::from)?,
		content_id: ContentId::new(row.try_get("content_id").map_err(vault_store::StoreError::from)?),
		action: row.try_get("action").map_err(vault_store::StoreError::from)?,
		status: task_status_from_str(&status)?,
		attempt: row.try_get("attempt").map_err(vault_store::StoreError::from)?,
		max_attempts: row.try_get("max_attempts").map_err(vault_store::StoreError::from)?,
		last_error: row.try_get("last_error").map_err(vault_store::StoreError::from)?,
		created_at: row.try_get("created_at").map_err(vault_store::StoreError::from)?,
		started_at: row.try_get("started_at").map_err(vault_store::StoreError::from)?,
		completed_at: row.try_get("completed_at").map_err(vault_store::StoreError::from)?,
	})
}

/// Appends a parse job to the back of the queue.
pub async fn enqueue(
	pool: &VaultPool,
	content_id: ContentId,
	action: &str,
	max_attempts: i32,
) -> Result<Task, QueueError> {
	let id = sqlx::query(
		"INSERT INTO parse_tasks (task_type, content_id, action, status, attempt, max_attempts, created_at)
		 VALUES ('parse', ?, ?, 'pending', 0, ?, ?)",
	)
	.bind(content_id.get())
	.bind(action)
	.bind(max_attempts)
	.bind(Utc::now())
	.execute(pool.raw())
	.await
	.map_err(vault_store::StoreError::from)?
	.last_insert_rowid();

	get(pool, TaskId::new(id)).await?.ok_or_else(|| vault_store::StoreError::NotFound.into())
}

pub async fn get(pool: &VaultPool, id: TaskId) -> Result<Option<Task>, QueueError> {
	let row = sqlx::query("SELECT * FROM parse_tasks WHERE id = ?")
		.bind(id.get())
		.fetch_optional(pool.raw())
		.await
		.map_err(vault_store::StoreError::from)?;
	row.map(row_to_task).transpose()
}

/// Claims the oldest `pending` row, atomically marking it `running`, and
/// returns it. `None` if nothing was available at this instant.
async fn try_claim_one(pool: &VaultPool, worker_id: &str) -> Result<Option<Task>, QueueError> {
	let now = Utc::now();
	let result = sqlx::query(
		"UPDATE parse_tasks SET status = 'running', claimed_at = ?, claimed_by = ?, started_at = ?
		 WHERE id = (SELECT id FROM parse_tasks WHERE status = 'pending' ORDER BY id ASC LIMIT 1)",
	)
	.bind(now)
	.bind(worker_id)
	.bind(now)
	.execute(pool.raw())
	.await
	.map_err(vault_store::StoreError::from)?;

	if result.rows_affected() == 0 {
		return Ok(None);
	}

	let row = sqlx::query("SELECT * FROM parse_tasks WHERE claimed_by = ? AND claimed_at = ? ORDER BY id DESC LIMIT 1")
		.bind(worker_id)
		.bind(now)
		.fetch_optional(pool.raw())
		.await
		.map_err(vault_store::StoreError::from)?;
	row.map(row_to_task).transpose()
}

/// Blocks (by polling) up to `timeout` for a job to become available.
/// Returns `None` on timeout, never an error for "nothing to do".
pub async fn dequeue(pool: &VaultPool, worker_id: &str, timeout: Duration) -> Result<Option<Task>, QueueError> {
	let deadline = tokio::time::Instant::now() + timeout;
	loop {
		if let Some(task) = try_claim_one(pool, worker_id).await? {
			return Ok(Some(task));
		}
		if tokio::time::Instant::now() >= deadline {
			return Ok(None);
		}
		tokio::time::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(tokio::time::Instant::now()))).await;
	}
}

pub async fn mark_complete(pool: &VaultPool, id: TaskId) -> Result<(), QueueError> {
	sqlx::query("UPDATE parse_tasks SET status = 'completed', completed_at = ? WHERE id = ?")
		.bind(Utc::now())
		.bind(id.get())
		.execute(pool.raw())
		.await
		.map_err(vault_store::StoreError::from)?;
	Ok(())
}

/// Records a failed attempt and bumps `attempt`, leaving the row `pending`
/// so the Parse Worker's own retry loop (§4.F step 4) may pick it up again,
/// or `failed` once retries are exhausted by the caller.
pub async fn record_attempt_failure(pool: &VaultPool, id: TaskId, error: &str, terminal: bool) -> Result<(), QueueError> {
	let status = if terminal { "failed" } else { "pending" };
	sqlx::query("UPDATE parse_tasks SET status = ?, attempt = attempt + 1, last_error = ?, claimed_at = NULL, claimed_by = NULL WHERE id = ?")
		.bind(status)
		.bind(error)
		.bind(id.get())
		.execute(pool.raw())
		.await
		.map_err(vault_store::StoreError::from)?;
	Ok(())
}

/// Moves a task to the dead-letter table and marks it `failed`, for
/// non-retryable errors or exhausted retries (§4.E).
pub async fn push_dead_letter(pool: &VaultPool, task: &Task, reason: &str) -> Result<(), QueueError> {
	let payload = serde_json::json!({
		"content_id": task.content_id.get(),
		"action": task.action,
		"attempt": task.attempt,
		"max_attempts": task.max_attempts,
		"task_id": task.id.get(),
		"schema_version": 1,
	});
	sqlx::query("INSERT INTO dead_letter_tasks (content_id, task_payload, reason, created_at) VALUES (?, ?, ?, ?)")
		.bind(task.content_id.get())
		.bind(payload.to_string())
		.bind(reason)
		.bind(Utc::now())
		.execute(pool.raw())
		.await
		.map_err(vault_store::StoreError::from)?;

	sqlx::query("UPDATE parse_tasks SET status = 'failed', completed_at = ? WHERE id = ?")
		.bind(Utc::now())
		.bind(task.id.get())
		.execute(pool.raw())
		.await
		.map_err(vault_store::StoreError::from)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn enqueue_then_dequeue_claims_oldest_first() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let t1 = enqueue(&pool, ContentId::new(1), "parse", 3).await.unwrap();
		let _t2 = enqueue(&pool, ContentId::new(2), "parse", 3).await.unwrap();

		let claimed = dequeue(&pool, "worker-1", Duration::from_millis(50)).await.unwrap().unwrap();
		assert_eq!(claimed.id, t1.id);
		assert_eq!(claimed.status, TaskStatus::Running);
	}

	#[tokio::test]
	async fn dequeue_times_out_on_empty_queue() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let result = dequeue(&pool, "worker-1", Duration::from_millis(50)).await.unwrap();
		assert!(result.is_none());
	}

	#[tokio::test]
	async fn mark_complete_and_dead_letter() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let task = enqueue(&pool, ContentId::new(7), "parse", 1).await.unwrap();
		let claimed = dequeue(&pool, "worker-1", Duration::from_millis(50)).await.unwrap().unwrap();
		assert_eq!(claimed.id, task.id);

		push_dead_letter(&pool, &claimed, "non-retryable: 404").await.unwrap();
		let reloaded = get(&pool, task.id).await.unwrap().unwrap();
		assert_eq!(reloaded.status, TaskStatus::Failed);
	}
}
