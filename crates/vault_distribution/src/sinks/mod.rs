//! Push Sinks (component J, §4.J): one implementation per destination
//! platform, sharing HTTP client conventions but not a common wire format.

pub mod qq;
pub mod telegram;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::payload::PushPayload;

/// `push(payload, target_id) → message_id | none` (§6.3). Sinks never
/// retry internally; all retry is queue-level (§4.J).
#[async_trait]
pub trait PushSink: Send + Sync {
	async fn push(&self, payload: &PushPayload, target_id: &str) -> Result<Option<String>, SinkError>;
}

pub use qq::QqSink;
pub use telegram::TelegramSink;
