//! Client for the external video analysis service.
//!
//! The service is an opaque remote process: the client asks it to analyze a
//! stored video segment and only logs the response, because the actual
//! analysis tokens are pushed back separately through ingestion.

pub mod client;
pub mod config;
pub mod error;

pub use client::{AnalyzerClient, VideoAnalyzer};
pub use config::AnalyzerConfig;
pub use error::{AnalyzerError, AnalyzerResult};
