#![forbid(unsafe_code)]

//! Media Processor: downloads images and videos referenced by an archive,
//! transcodes images to WebP, and stores both through a `vault_storage`
//! backend. Everything here is best-effort per item — one failing image
//! never aborts the rest of the archive.

mod error;
mod fetch;
mod headers;
mod processor;
mod transcode;

pub use error::MediaError;
pub use processor::{MediaProcessor, MediaProcessorConfig};
pub use transcode::TranscodeResult;
