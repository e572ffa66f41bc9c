use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
	#[error("fetch failed: {0}")]
	Fetch(#[from] reqwest::Error),
	#[error("decode failed: {0}")]
	Decode(#[from] image::ImageError),
	#[error("no frames decoded")]
	NoFrames,
}
