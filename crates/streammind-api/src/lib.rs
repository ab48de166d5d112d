//! Axum HTTP/WS API server.
//!
//! This crate provides:
//! - Token ingestion with persist-then-publish ordering
//! - Streaming NDJSON replay and paged history
//! - Live WebSocket fan-out per session
//! - Video upload and job submission into the worker pool
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod ingest;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use hub::{FanoutHub, PublishOutcome, Subscriber, SubscriberId};
pub use routes::create_router;
pub use session::{OpenSessionDirectory, SessionDirectory, StaticSessionDirectory};
pub use state::AppState;
