#![forbid(unsafe_code)]

//! The Adapter Registry: URL canonicalization, platform detection, and the
//! `Adapter` SPI that the Parse Worker drives. Per-platform scraper bodies
//! are intentionally thin — only enough to exercise the pipeline end to
//! end, not production scraping fidelity.

mod adapters;
mod canonical;
mod error;
mod parsed;
mod registry;

pub use adapters::bilibili::BilibiliAdapter;
pub use adapters::generic::GenericAdapter;
pub use canonical::{CanonicalizeError, canonicalize_url};
pub use error::{AdapterError, AuthRequiredAdapterError, NonRetryableAdapterError, RetryableAdapterError};
pub use parsed::ParsedContent;
pub use registry::{Adapter, AdapterRegistry};
