//! Analysis worker pool.
//!
//! This crate provides:
//! - A fixed pool of workers consuming the in-process job queue
//! - Timeout-bounded calls to the external analysis service
//! - Per-job failure and panic isolation
//! - Graceful shutdown with a grace period before force-cancel

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pool;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pool::{PoolStatus, WorkerPool};
