//! Structured job logging utilities.

use std::time::Duration;

use tracing::{error, info, Span};

use streammind_models::AnalysisJob;

/// Job logger carrying the job, session and worker ids on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    session_id: String,
    worker_id: usize,
}

impl JobLogger {
    /// Create a logger for a job picked up by `worker_id`.
    pub fn new(job: &AnalysisJob, worker_id: usize) -> Self {
        Self {
            job_id: job.job_id.to_string(),
            session_id: job.session_id.to_string(),
            worker_id,
        }
    }

    pub fn log_start(&self, video_path: &str) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            worker_id = self.worker_id,
            video_path,
            "Job started"
        );
    }

    pub fn log_completion(&self, elapsed: Duration, response: &str) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            worker_id = self.worker_id,
            elapsed_ms = elapsed.as_millis() as u64,
            response,
            "Job completed"
        );
    }

    /// Log a terminal failure; the job is dropped afterwards.
    pub fn log_error(&self, reason: &str, message: &str) {
        error!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            worker_id = self.worker_id,
            reason,
            "Job dropped: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            session_id = %self.session_id,
            worker_id = self.worker_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streammind_models::SessionId;

    #[test]
    fn test_job_logger_creation() {
        let session = SessionId::new();
        let job = AnalysisJob::new(session, "/tmp/videos/clip.webm").unwrap();
        let logger = JobLogger::new(&job, 3);

        assert_eq!(logger.job_id(), job.job_id.as_str());
        assert_eq!(logger.session_id(), session.to_string());
        assert_eq!(logger.worker_id(), 3);
    }
}
