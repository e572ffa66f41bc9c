use thiserror::Error;

/// Transient failure: network hiccup, throttling, 5xx, parse-level timeout.
/// The Parse Worker retries these with exponential backoff.
#[derive(Debug, Error)]
#[error("retryable adapter error: {0}")]
pub struct RetryableAdapterError(pub String);

/// Permanent failure: resource gone, malformed URL, a format change the
/// adapter cannot handle. The Parse Worker fails immediately and dead-letters.
#[derive(Debug, Error)]
#[error("non-retryable adapter error: {0}")]
pub struct NonRetryableAdapterError(pub String);

/// The adapter's credential is invalid or expired. Not retried automatically;
/// surfaced to the operator via `last_error_type`.
#[derive(Debug, Error)]
#[error("adapter auth required: {0}")]
pub struct AuthRequiredAdapterError(pub String);

/// The classified error an `Adapter::parse` call can raise.
#[derive(Debug, Error)]
pub enum AdapterError {
	#[error(transparent)]
	Retryable(#[from] RetryableAdapterError),
	#[error(transparent)]
	NonRetryable(#[from] NonRetryableAdapterError),
	#[error(transparent)]
	AuthRequired(#[from] AuthRequiredAdapterError),
}

impl AdapterError {
	pub fn retryable(msg: impl Into<String>) -> Self {
		AdapterError::Retryable(RetryableAdapterError(msg.into()))
	}

	pub fn non_retryable(msg: impl Into<String>) -> Self {
		AdapterError::NonRetryable(NonRetryableAdapterError(msg.into()))
	}

	pub fn auth_required(msg: impl Into<String>) -> Self {
		AdapterError::AuthRequired(AuthRequiredAdapterError(msg.into()))
	}

	/// A short machine-readable label, used as `last_error_type`.
	pub const fn kind(&self) -> &'static str {
		match self {
			AdapterError::Retryable(_) => "retryable",
			AdapterError::NonRetryable(_) => "non_retryable",
			AdapterError::AuthRequired(_) => "auth_required",
		}
	}

	/// Whether the Parse Worker's retry loop should sleep and try again.
	pub const fn should_retry(&self) -> bool {
		matches!(self, AdapterError::Retryable(_) | AdapterError::AuthRequired(_))
	}
}
