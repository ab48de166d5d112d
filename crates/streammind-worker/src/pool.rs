//! Fixed-size worker pool.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use streammind_analyzer::VideoAnalyzer;
use streammind_models::AnalysisJob;
use streammind_queue::JobQueue;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Point-in-time view of the pool for introspection endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub pool_size: usize,
    pub active_workers: usize,
    pub queue_size: usize,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
    pub running: bool,
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Marks a worker active for as long as it is held, including when the
/// task is aborted mid-call.
struct ActiveGuard<'a>(&'a Counters);

impl<'a> ActiveGuard<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_workers(active);
        Self(counters)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let active = self.0.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_workers(active);
    }
}

/// State shared by every worker task.
struct WorkerContext {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    analyzer: Arc<dyn VideoAnalyzer>,
    counters: Counters,
}

impl WorkerContext {
    async fn run(self: Arc<Self>, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker_id, "Worker started");
        loop {
            let job = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                job = self.queue.dequeue() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            self.process(worker_id, job).await;
        }
        debug!(worker_id, "Worker stopped");
    }

    /// Dispatch one job. Every outcome is terminal: the job is dropped
    /// after this returns.
    async fn process(&self, worker_id: usize, job: AnalysisJob) {
        let logger = JobLogger::new(&job, worker_id);
        let _active = ActiveGuard::enter(&self.counters);
        let started = Instant::now();

        logger.log_start(&job.video_path);
        metrics::record_job_started();

        let call = tokio::time::timeout(
            self.config.job_timeout,
            self.analyzer.analyze_video(&job.session_id, &job.video_path),
        );
        let result = match AssertUnwindSafe(call)
            .catch_unwind()
            .instrument(logger.create_span())
            .await
        {
            Ok(Ok(Ok(body))) => Ok(body),
            Ok(Ok(Err(e))) => Err(WorkerError::from(e)),
            Ok(Err(_)) => Err(WorkerError::Timeout(self.config.job_timeout)),
            Err(payload) => Err(WorkerError::panicked(panic_message(payload.as_ref()))),
        };

        let elapsed = started.elapsed();
        match result {
            Ok(body) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                metrics::record_job_completed(elapsed);
                logger.log_completion(elapsed, &body);
            }
            Err(e) => {
                if e.is_timeout() {
                    self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                metrics::record_job_failed(e.reason(), elapsed);
                logger.log_error(e.reason(), &e.to_string());
            }
        }
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means the pool is gone.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A fixed set of workers consuming a [`JobQueue`].
///
/// Started once with [`WorkerPool::start`] and stopped once with
/// [`WorkerPool::shutdown`].
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig, queue: Arc<JobQueue>, analyzer: Arc<dyn VideoAnalyzer>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx: Arc::new(WorkerContext {
                config,
                queue,
                analyzer,
                counters: Counters::default(),
            }),
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the workers on the current runtime.
    pub fn start(&self) -> WorkerResult<()> {
        if *self.shutdown.borrow() {
            return Err(WorkerError::ShutDown);
        }
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if !handles.is_empty() {
            return Err(WorkerError::AlreadyStarted);
        }

        let size = self.ctx.config.pool_size.max(1);
        for worker_id in 0..size {
            let ctx = Arc::clone(&self.ctx);
            handles.push(tokio::spawn(ctx.run(worker_id, self.shutdown.subscribe())));
        }

        info!(
            pool_size = size,
            job_timeout_secs = self.ctx.config.job_timeout.as_secs(),
            "Started worker pool"
        );
        Ok(())
    }

    /// Stop dequeuing, give in-flight calls the grace period, then abort
    /// whatever is still running.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        if handles.is_empty() {
            return;
        }

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let grace = self.ctx.config.shutdown_timeout;
        info!(
            workers = handles.len(),
            grace_secs = grace.as_secs(),
            "Shutting down worker pool"
        );

        match tokio::time::timeout(grace, join_all(handles)).await {
            Ok(_) => info!("Worker pool stopped"),
            Err(_) => {
                warn!(
                    active = self.ctx.counters.active.load(Ordering::SeqCst),
                    "Grace period elapsed, cancelling in-flight jobs"
                );
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
            && !self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
    }

    pub fn active_workers(&self) -> usize {
        self.ctx.counters.active.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> PoolStatus {
        let counters = &self.ctx.counters;
        PoolStatus {
            pool_size: self.ctx.config.pool_size.max(1),
            active_workers: counters.active.load(Ordering::SeqCst),
            queue_size: self.ctx.queue.len(),
            jobs_completed: counters.completed.load(Ordering::Relaxed),
            jobs_failed: counters.failed.load(Ordering::Relaxed),
            jobs_timed_out: counters.timed_out.load(Ordering::Relaxed),
            running: self.is_running(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use streammind_analyzer::{AnalyzerError, AnalyzerResult};
    use streammind_models::SessionId;
    use tokio::sync::Barrier;

    /// Behaves according to the video path it is given.
    struct ScriptedAnalyzer {
        calls: AtomicUsize,
        barrier: Barrier,
    }

    impl ScriptedAnalyzer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                barrier: Barrier::new(2),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VideoAnalyzer for ScriptedAnalyzer {
        async fn analyze_video(&self, _session_id: &SessionId, video_path: &str) -> AnalyzerResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match video_path {
                "/slow.webm" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("late".to_string())
                }
                "/hang.webm" => futures::future::pending().await,
                "/panic.webm" => panic!("analyzer exploded"),
                "/fail.webm" => Err(AnalyzerError::request("connection refused")),
                "/barrier.webm" => {
                    self.barrier.wait().await;
                    Ok("ok".to_string())
                }
                _ => Ok("{\"status\":\"completed\"}".to_string()),
            }
        }
    }

    fn pool_with(
        pool_size: usize,
        job_timeout: Duration,
        analyzer: Arc<ScriptedAnalyzer>,
    ) -> (WorkerPool, Arc<JobQueue>) {
        let queue = Arc::new(JobQueue::new());
        let config = WorkerConfig {
            pool_size,
            job_timeout,
            shutdown_timeout: Duration::from_millis(200),
        };
        (WorkerPool::new(config, Arc::clone(&queue), analyzer), queue)
    }

    fn job(path: &str) -> AnalysisJob {
        AnalysisJob::new(SessionId::new(), path).unwrap()
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_workers_idle_until_first_enqueue() {
        let analyzer = ScriptedAnalyzer::new();
        let (pool, queue) = pool_with(2, Duration::from_secs(5), Arc::clone(&analyzer));
        pool.start().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(analyzer.calls(), 0);
        assert_eq!(pool.active_workers(), 0);

        queue.enqueue(job("/tmp/videos/a.webm")).unwrap();
        wait_until(|| pool.status().jobs_completed == 1).await;
        assert_eq!(analyzer.calls(), 1);
        assert_eq!(pool.status().queue_size, 0);

        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_jobs_for_different_sessions_run_concurrently() {
        let analyzer = ScriptedAnalyzer::new();
        let (pool, queue) = pool_with(2, Duration::from_secs(5), Arc::clone(&analyzer));
        pool.start().unwrap();

        // Each call waits for the other; serialized dispatch would time out.
        queue.enqueue(job("/barrier.webm")).unwrap();
        queue.enqueue(job("/barrier.webm")).unwrap();
        wait_until(|| pool.status().jobs_completed == 2).await;

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_timed_out_job_is_dropped_and_next_job_runs() {
        let analyzer = ScriptedAnalyzer::new();
        let (pool, queue) = pool_with(1, Duration::from_millis(100), Arc::clone(&analyzer));
        pool.start().unwrap();

        queue.enqueue(job("/slow.webm")).unwrap();
        queue.enqueue(job("/tmp/videos/b.webm")).unwrap();
        wait_until(|| pool.status().jobs_completed == 1).await;

        let status = pool.status();
        assert_eq!(status.jobs_timed_out, 1);
        assert_eq!(status.jobs_failed, 0);
        assert_eq!(status.queue_size, 0);
        assert_eq!(analyzer.calls(), 2);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_isolated() {
        let analyzer = ScriptedAnalyzer::new();
        let (pool, queue) = pool_with(1, Duration::from_secs(5), Arc::clone(&analyzer));
        pool.start().unwrap();

        queue.enqueue(job("/panic.webm")).unwrap();
        queue.enqueue(job("/fail.webm")).unwrap();
        queue.enqueue(job("/tmp/videos/c.webm")).unwrap();
        wait_until(|| pool.status().jobs_completed == 1).await;

        let status = pool.status();
        assert_eq!(status.jobs_failed, 2);
        assert_eq!(status.active_workers, 0);
        assert!(status.running);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_hanging_call_after_grace_period() {
        let analyzer = ScriptedAnalyzer::new();
        let (pool, queue) = pool_with(1, Duration::from_secs(60), Arc::clone(&analyzer));
        pool.start().unwrap();

        queue.enqueue(job("/hang.webm")).unwrap();
        wait_until(|| pool.active_workers() == 1).await;

        let started = Instant::now();
        pool.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!pool.is_running());

        wait_until(|| pool.active_workers() == 0).await;
        assert_eq!(pool.status().jobs_completed, 0);
    }

    #[tokio::test]
    async fn test_shutdown_leaves_pending_jobs_queued() {
        let analyzer = ScriptedAnalyzer::new();
        let (pool, queue) = pool_with(1, Duration::from_secs(5), Arc::clone(&analyzer));
        pool.start().unwrap();
        pool.shutdown().await;

        queue.enqueue(job("/tmp/videos/d.webm")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(analyzer.calls(), 0);
        assert_eq!(pool.status().queue_size, 1);
    }

    #[tokio::test]
    async fn test_start_is_once_only() {
        let (pool, _queue) = pool_with(1, Duration::from_secs(5), ScriptedAnalyzer::new());
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(WorkerError::AlreadyStarted)));
        pool.shutdown().await;
        assert!(matches!(pool.start(), Err(WorkerError::ShutDown)));
    }
}
