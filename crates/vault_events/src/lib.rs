#![forbid(unsafe_code)]

//! The Event Bus (component D, §4.D): local pub/sub fan-out plus a durable
//! outbox for cross-instance delivery and SSE reconnect replay.

mod bus;
mod error;
mod event;
pub mod outbox;

pub use bus::{EventBus, EventSubscription};
pub use error::EventsError;
pub use event::Event;
