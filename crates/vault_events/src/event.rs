use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item on the bus, whether it originated locally or arrived via the
/// outbox poller from another instance. `id` is `None` for events that have
/// not been persisted yet (a local-only fast path is not used today; every
/// publish is persisted before broadcast, but the field stays optional to
/// match the SSE contract's `id: <monotonic>` being itself optional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub id: Option<i64>,
	pub event_type: String,
	pub payload: Value,
	pub source_instance: String,
	pub created_at: DateTime<Utc>,
}

impl Event {
	/// Synthetic keepalive sent to idle subscribers (§4.D, §6.4).
	pub fn ping() -> Self {
		Event { id: None, event_type: "ping".into(), payload: Value::Null, source_instance: String::new(), created_at: Utc::now() }
	}
}
