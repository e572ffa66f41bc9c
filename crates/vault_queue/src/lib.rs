#![forbid(unsafe_code)]

//! The durable Task Queue (component E, §4.E): FIFO parse jobs with
//! claim-by-update dequeue, at-least-once delivery, and a dead-letter table
//! for terminal failures.

mod error;
pub mod task_queue;

pub use error::QueueError;
