//! Analysis token store.
//!
//! This crate provides:
//! - The [`TokenStore`] trait: an ordered, per-session append log
//! - [`MemoryTokenStore`] for single-process deployments and tests
//! - [`RedisTokenStore`] backed by one sorted set per session
//! - [`replay_stream`]: paged, streaming reads for replay clients

pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod redis_store;
pub mod replay;
pub mod store;

pub use config::{StoreBackend, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryTokenStore;
pub use redis_store::RedisTokenStore;
pub use replay::{replay_stream, DEFAULT_REPLAY_BATCH};
pub use store::{connect, TokenStore};
