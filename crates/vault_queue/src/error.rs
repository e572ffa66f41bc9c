use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
	#[error(transparent)]
	Store(#[from] vault_store::StoreError),
	#[error("serialization error: {0}")]
	Serde(#[from] serde_json::Error),
}
