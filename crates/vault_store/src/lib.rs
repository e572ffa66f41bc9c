#![forbid(unsafe_code)]

//! The shared SQLite schema and repository functions backing every other
//! crate in the vault pipeline (component K). One physical database, one
//! migration set; `vault_queue`, `vault_events` and `vault_distribution`
//! query tables defined here (`parse_tasks`, `dead_letter_tasks`,
//! `realtime_events`) directly rather than duplicating a schema owner.

pub mod chat;
pub mod codecs;
pub mod content;
mod error;
pub mod pool;
pub mod queue_item;
pub mod rule;

pub use error::StoreError;
pub use pool::VaultPool;
