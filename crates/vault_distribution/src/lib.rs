#![forbid(unsafe_code)]

//! The Distribution pipeline: the Enqueue Service (component H, §4.H) turns
//! reviewed content into queue items, the Scheduler Worker Pool (component
//! I, §4.I) claims and pushes them through per-platform Push Sinks
//! (component J, §4.J).

pub mod enqueue;
pub mod error;
pub mod payload;
pub mod scheduler;
pub mod sinks;

pub use enqueue::enqueue_content;
pub use error::{DistributionError, SinkError};
pub use payload::{PushPayload, build_content_payload};
pub use scheduler::{Sinks, process_item_now, run_worker, spawn_pool};
pub use sinks::{PushSink, QqSink, TelegramSink};
