//! Token store metrics.
//!
//! - Operation counters by backend, operation and outcome
//! - Latency histograms

use std::time::Instant;

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total store operations by backend, operation and outcome.
    pub const OPERATIONS_TOTAL: &str = "streammind_store_operations_total";

    /// Operation latency in seconds by backend and operation.
    pub const LATENCY_SECONDS: &str = "streammind_store_latency_seconds";
}

/// Record a completed store operation.
pub fn record_operation(backend: &'static str, operation: &'static str, ok: bool, started: Instant) {
    counter!(
        names::OPERATIONS_TOTAL,
        "backend" => backend,
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "backend" => backend,
        "operation" => operation
    )
    .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::OPERATIONS_TOTAL.starts_with("streammind_store"));
        assert!(names::LATENCY_SECONDS.contains("latency"));
    }
}
