use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistributionError {
	#[error(transparent)]
	Store(#[from] vault_store::StoreError),
	#[error(transparent)]
	Events(#[from] vault_events::EventsError),
	#[error("serialization error: {0}")]
	Serde(#[from] serde_json::Error),
	#[error("content {0} not found")]
	ContentNotFound(i64),
	#[error("content {0} is not parse_success or its review status does not permit enqueueing")]
	ContentNotEnqueueable(i64),
	#[error("queue item {0} not found")]
	QueueItemNotFound(i64),
	#[error("queue item {0} is in a terminal state that forbids manual intervention")]
	QueueItemNotIntervenable(i64),
}

/// Errors a push sink can raise. Every variant except `TargetUnavailable`
/// is recoverable via queue-level retry (§7); `TargetUnavailable` instead
/// demotes the item back to `scheduled` without counting an attempt.
#[derive(Debug, Error)]
pub enum SinkError {
	#[error("http transport error: {0}")]
	Transport(#[from] reqwest::Error),
	#[error("sink rejected the push: {0}")]
	Rejected(String),
	#[error("target is disabled or inaccessible")]
	TargetUnavailable,
}
