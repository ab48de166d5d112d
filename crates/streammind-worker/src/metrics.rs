//! Worker pool metrics.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "streammind_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "streammind_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "streammind_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "streammind_job_duration_seconds";
    pub const WORKERS_ACTIVE: &str = "streammind_workers_active";
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

pub fn record_job_completed(elapsed: Duration) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "completed").record(elapsed.as_secs_f64());
}

/// Record a dropped job with its failure reason.
pub fn record_job_failed(reason: &'static str, elapsed: Duration) {
    counter!(names::JOBS_FAILED_TOTAL, "reason" => reason).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "failed").record(elapsed.as_secs_f64());
}

pub fn set_active_workers(count: usize) {
    gauge!(names::WORKERS_ACTIVE).set(count as f64);
}
