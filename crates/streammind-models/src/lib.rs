//! Shared data models for the StreamMind analysis pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Session identifiers
//! - Analysis jobs handed to the worker pool
//! - Analysis tokens persisted by the token store
//! - Ingestion / replay wire payloads
//! - Markdown session reports

pub mod error;
pub mod job;
pub mod report;
pub mod session;
pub mod token;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use job::{AnalysisJob, JobId};
pub use report::render_markdown_report;
pub use session::SessionId;
pub use token::{AnalysisChunk, AnalysisToken, NewToken, SaveAnalysisRequest, SaveAnalysisResponse};
