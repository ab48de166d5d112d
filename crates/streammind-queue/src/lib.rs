//! In-process job queue.
//!
//! This crate provides:
//! - An unbounded FIFO of analysis jobs with non-blocking enqueue
//! - Async dequeue that parks the caller until work arrives
//! - Drain and close operations for administration and shutdown

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QUEUE_LENGTH};
