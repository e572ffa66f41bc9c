use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Db(#[from] sqlx::Error),
	#[error("serialization error: {0}")]
	Serde(#[from] serde_json::Error),
	#[error("row not found")]
	NotFound,
	#[error("invalid enum value in row: {0}")]
	InvalidEnum(String),
}
