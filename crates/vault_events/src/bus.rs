//! The Event Bus (component D, §4.D): local fan-out to bounded
//! per-subscriber channels, backed by a durable outbox for cross-instance
//! delivery and SSE reconnect replay.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use sqlx::Row;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use vault_store::VaultPool;

use crate::error::EventsError;
use crate::event::Event;

/// Per-subscriber channel capacity (§4.D: "default 100").
const SUBSCRIBER_CAPACITY: usize = 100;

/// How long a subscriber may go without a delivered event before it
/// receives a synthetic `ping` (§4.D, §6.4).
const PING_INTERVAL: Duration = Duration::from_secs(300);

struct Subscriber {
	tx: mpsc::Sender<Event>,
	pending_lag: AtomicU64,
}

/// Shared handle; cheap to clone, every worker and transport adapter holds
/// one.
#[derive(Clone)]
pub struct EventBus {
	instance_id: u64,
	subscribers: Arc<DashMap<u64, Subscriber>>,
	next_subscriber_id: Arc<AtomicU64>,
	pool: VaultPool,
}

/// A live subscription. Wraps the raw receiver so idle ticks get turned
/// into synthetic `ping` events transparently (§6.4: "idle connections emit
/// ping at least every 300s").
pub struct EventSubscription {
	id: u64,
	rx: mpsc::Receiver<Event>,
	bus: EventBus,
}

impl EventBus {
	pub fn new(pool: VaultPool) -> Self {
		// Random 64-bit value, not persisted (§4.D): folding a v4 uuid's 128
		// bits is enough entropy and avoids pulling in a dedicated rng crate.
		let raw = uuid::Uuid::new_v4().as_u128();
		let instance_id = (raw as u64) ^ ((raw >> 64) as u64);
		Self {
			instance_id,
			subscribers: Arc::new(DashMap::new()),
			next_subscriber_id: Arc::new(AtomicU64::new(0)),
			pool,
		}
	}

	pub fn instance_id(&self) -> u64 {
		self.instance_id
	}

	/// Registers a new subscriber with a bounded channel and returns the
	/// stream handle.
	pub fn subscribe(&self) -> EventSubscription {
		let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
		let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
		self.subscribers.insert(id, Subscriber { tx, pending_lag: AtomicU64::new(0) });
		EventSubscription { id, rx, bus: self.clone() }
	}

	fn unsubscribe(&self, id: u64) {
		self.subscribers.remove(&id);
	}

	/// Broadcasts to every local subscriber, best-effort: a full buffer
	/// drops the event for that subscriber rather than blocking the
	/// publisher, and evicts that subscriber outright (§4.D: "evicts a
	/// subscriber repeatedly in overflow") rather than just counting the
	/// drop and leaving it attached.
	fn broadcast_local(&self, event: &Event) {
		let mut evict = Vec::new();
		for entry in self.subscribers.iter() {
			let (id, sub) = (*entry.key(), entry.value());
			match sub.tx.try_send(event.clone()) {
				Ok(()) => {
					sub.pending_lag.store(0, Ordering::Relaxed);
				}
				Err(mpsc::error::TrySendError::Full(_)) => {
					sub.pending_lag.fetch_add(1, Ordering::Relaxed);
					evict.push(id);
				}
				Err(mpsc::error::TrySendError::Closed(_)) => evict.push(id),
			}
		}
		for id in evict {
			if let Some((_, sub)) = self.subscribers.remove(&id) {
				if sub.pending_lag.load(Ordering::Relaxed) > 0 {
					warn!(subscriber_id = id, "event bus: evicting subscriber with a full buffer");
				}
			}
		}
	}

	/// Broadcasts an event that arrived from another instance via the
	/// outbox poller. Never re-persists it.
	pub(crate) fn broadcast_remote(&self, event: Event) {
		self.broadcast_local(&event);
	}

	/// Publishes `event_type`/`payload`: persists to the outbox then
	/// broadcasts to local subscribers (§4.D).
	pub async fn publish(&self, event_type: &str, payload: Value) -> Result<(), EventsError> {
		let now = Utc::now();
		let payload_json = payload.to_string();
		let id = sqlx::query(
			"INSERT INTO realtime_events (event_type, payload, source_instance, created_at) VALUES (?, ?, ?, ?)",
		)
		.bind(event_type)
		.bind(&payload_json)
		.bind(self.instance_id.to_string())
		.bind(now)
		.execute(self.pool.raw())
		.await
		.map_err(vault_store::StoreError::from)?
		.last_insert_rowid();

		let event = Event {
			id: Some(id),
			event_type: event_type.to_string(),
			payload,
			source_instance: self.instance_id.to_string(),
			created_at: now,
		};
		self.broadcast_local(&event);
		Ok(())
	}

	/// Replays every persisted event with `id > last_id`, in order, for an
	/// SSE client reconnecting with `Last-Event-ID` (§6.4).
	pub async fn replay_events_since(&self, last_id: i64) -> Result<Vec<Event>, EventsError> {
		let rows = sqlx::query("SELECT * FROM realtime_events WHERE id > ? ORDER BY id ASC")
			.bind(last_id)
			.fetch_all(self.pool.raw())
			.await
			.map_err(vault_store::StoreError::from)?;

		rows.into_iter()
			.map(|row| {
				let payload: String = row.try_get("payload").map_err(vault_store::StoreError::from)?;
				Ok(Event {
					id: Some(row.try_get("id").map_err(vault_store::StoreError::from)?),
					event_type: row.try_get("event_type").map_err(vault_store::StoreError::from)?,
					payload: serde_json::from_str(&payload)?,
					source_instance: row.try_get("source_instance").map_err(vault_store::StoreError::from)?,
					created_at: row.try_get("created_at").map_err(vault_store::StoreError::from)?,
				})
			})
			.collect()
	}

	pub(crate) fn pool(&self) -> &VaultPool {
		&self.pool
	}
}

impl EventSubscription {
	/// Waits for the next event, or a synthetic `ping` after 300s idle.
	pub async fn next(&mut self) -> Option<Event> {
		match tokio::time::timeout(PING_INTERVAL, self.rx.recv()).await {
			Ok(Some(event)) => Some(event),
			Ok(None) => None,
			Err(_) => Some(Event::ping()),
		}
	}
}

impl Drop for EventSubscription {
	fn drop(&mut self) {
		self.bus.unsubscribe(self.id);
		debug!(subscriber_id = self.id, "event bus: subscriber dropped");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn publish_delivers_to_subscriber_and_persists() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let bus = EventBus::new(pool);
		let mut sub = bus.subscribe();

		bus.publish("content_created", serde_json::json!({"content_id": 1})).await.unwrap();

		let event = sub.next().await.unwrap();
		assert_eq!(event.event_type, "content_created");
		assert!(event.id.is_some());
	}

	#[tokio::test]
	async fn replay_events_since_returns_only_newer_rows() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let bus = EventBus::new(pool);
		bus.publish("content_created", serde_json::json!({"n": 1})).await.unwrap();
		let second = {
			bus.publish("content_created", serde_json::json!({"n": 2})).await.unwrap();
			bus.replay_events_since(0).await.unwrap()[1].id.unwrap()
		};
		bus.publish("content_created", serde_json::json!({"n": 3})).await.unwrap();

		let replayed = bus.replay_events_since(second).await.unwrap();
		assert_eq!(replayed.len(), 1);
		assert_eq!(replayed[0].payload, serde_json::json!({"n": 3}));
	}

	#[tokio::test]
	async fn full_buffer_evicts_the_subscriber() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let bus = EventBus::new(pool);
		let sub = bus.subscribe();
		assert_eq!(bus.subscribers.len(), 1);

		// Never drain `sub`: fill its bounded channel past capacity so the
		// next publish observes `TrySendError::Full` and evicts it.
		for n in 0..(SUBSCRIBER_CAPACITY + 1) {
			bus.publish("content_created", serde_json::json!({"n": n})).await.unwrap();
		}

		assert_eq!(bus.subscribers.len(), 0, "a subscriber whose buffer overflowed must be evicted, not merely counted");
		drop(sub);
	}

	#[tokio::test]
	async fn dropped_subscriber_is_pruned_on_next_publish() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let bus = EventBus::new(pool);
		{
			let _sub = bus.subscribe();
			assert_eq!(bus.subscribers.len(), 1);
		}
		bus.publish("ping", serde_json::Value::Null).await.unwrap();
		assert_eq!(bus.subscribers.len(), 0);
	}
}
