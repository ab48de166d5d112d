//! Unbounded FIFO of analysis jobs.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use metrics::gauge;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use streammind_models::AnalysisJob;

use crate::error::{QueueError, QueueResult};

/// Gauge tracking the number of pending jobs.
pub const QUEUE_LENGTH: &str = "streammind_queue_length";

/// Job queue shared by the upload path (producers) and the worker pool
/// (consumers).
///
/// Enqueue never waits. Dequeue parks on a [`Notify`] until a job is pushed
/// or the queue is closed, so idle workers do not spin.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<AnalysisJob>>,
    available: Notify,
    depth: AtomicUsize,
    closed: AtomicBool,
}

impl JobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the deque lock held so gauge updates keep queue order.
    fn set_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::Release);
        gauge!(QUEUE_LENGTH).set(depth as f64);
    }

    fn jobs(&self) -> MutexGuard<'_, VecDeque<AnalysisJob>> {
        // Critical sections only push/pop, so a poisoned lock still holds a
        // consistent deque.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job to the tail of the queue.
    pub fn enqueue(&self, job: AnalysisJob) -> QueueResult<()> {
        if self.is_closed() {
            warn!(session_id = %job.session_id, "Rejected job for closed queue");
            return Err(QueueError::Closed);
        }

        let session_id = job.session_id;
        let depth = {
            let mut jobs = self.jobs();
            jobs.push_back(job);
            let depth = jobs.len();
            self.set_depth(depth);
            depth
        };
        self.available.notify_one();

        info!(session_id = %session_id, queue_size = depth, "Enqueued analysis job");
        Ok(())
    }

    /// Pop the head of the queue without waiting.
    pub fn try_dequeue(&self) -> Option<AnalysisJob> {
        let mut jobs = self.jobs();
        let job = jobs.pop_front();
        if job.is_some() {
            self.set_depth(jobs.len());
        }
        job
    }

    /// Wait for the next job in arrival order.
    ///
    /// Returns `None` once the queue has been closed. Cancel safe: a job is
    /// only removed from the queue in the same poll that returns it.
    pub async fn dequeue(&self) -> Option<AnalysisJob> {
        loop {
            let mut notified = pin!(self.available.notified());
            // Register interest before checking state so a concurrent
            // enqueue/close cannot slip between the check and the wait.
            notified.as_mut().enable();

            if self.is_closed() {
                return None;
            }

            if let Some(job) = self.try_dequeue() {
                debug!(
                    session_id = %job.session_id,
                    remaining = self.len(),
                    "Dequeued analysis job"
                );
                return Some(job);
            }

            notified.await;
        }
    }

    /// Remove every pending job. Jobs already handed to workers are not
    /// affected.
    pub fn drain(&self) -> usize {
        let removed = {
            let mut jobs = self.jobs();
            let removed = jobs.len();
            jobs.clear();
            self.set_depth(0);
            removed
        };

        warn!(removed, "Cleared job queue");
        removed
    }

    /// Stop accepting jobs and wake every parked consumer.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(pending = self.len(), "Closing job queue");
        }
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of jobs waiting to be claimed.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
