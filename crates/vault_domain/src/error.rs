use thiserror::Error;

/// Errors for parsing identifiers and enum values from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown value: {0}")]
	Unknown(String),
}
