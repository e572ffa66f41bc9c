//! Cross-instance delivery: polls the outbox for rows another process wrote
//! and broadcasts them to this process's local subscribers (§4.D).

use std::time::Duration;

use sqlx::Row;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bus::EventBus;
use crate::event::Event;

/// Poll cadence and batch size mirror the original `EventBus` poller
/// constants exactly (`_POLL_INTERVAL_SECONDS`, `_POLL_BATCH_SIZE`).
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const POLL_BATCH_SIZE: i64 = 200;

/// Runs until `shutdown` is cancelled. Initializes `last_seen` to
/// `MAX(id)` at startup, per §4.D ("no backfill"): rows written before this
/// poller started are never replayed locally, only via `replay_events_since`
/// for reconnecting clients.
pub async fn run(bus: EventBus, shutdown: CancellationToken) {
	let mut last_seen = match max_event_id(&bus).await {
		Ok(id) => id,
		Err(err) => {
			warn!(error = %err, "event outbox poller: failed to read starting offset, defaulting to 0");
			0
		}
	};

	loop {
		tokio::select! {
			_ = shutdown.cancelled() => return,
			_ = tokio::time::sleep(POLL_INTERVAL) => {}
		}

		match poll_once(&bus, last_seen).await {
			Ok(Some(new_last_seen)) => last_seen = new_last_seen,
			Ok(None) => {}
			Err(err) => {
				warn!(error = %err, "event outbox poller: iteration failed, continuing");
			}
		}
	}
}

async fn max_event_id(bus: &EventBus) -> Result<i64, sqlx::Error> {
	let row = sqlx::query("SELECT COALESCE(MAX(id), 0) AS m FROM realtime_events").fetch_one(bus.pool().raw()).await?;
	row.try_get("m")
}

/// Fetches up to `POLL_BATCH_SIZE` rows with `id > last_seen` written by a
/// different instance, broadcasts each locally, and returns the new
/// high-water mark if anything was found.
async fn poll_once(bus: &EventBus, last_seen: i64) -> Result<Option<i64>, sqlx::Error> {
	let self_instance = bus.instance_id().to_string();
	let rows = sqlx::query(
		"SELECT * FROM realtime_events WHERE id > ? AND source_instance != ? ORDER BY id ASC LIMIT ?",
	)
	.bind(last_seen)
	.bind(&self_instance)
	.bind(POLL_BATCH_SIZE)
	.fetch_all(bus.pool().raw())
	.await?;

	if rows.is_empty() {
		return Ok(None);
	}

	let mut new_last_seen = last_seen;
	for row in rows {
		let id: i64 = row.try_get("id")?;
		let payload: String = row.try_get("payload")?;
		let event = Event {
			id: Some(id),
			event_type: row.try_get("event_type")?,
			payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
			source_instance: row.try_get("source_instance")?,
			created_at: row.try_get("created_at")?,
		};
		bus.broadcast_remote(event);
		new_last_seen = new_last_seen.max(id);
	}

	Ok(Some(new_last_seen))
}
