//! Application state.

use std::sync::Arc;

use anyhow::Context;

use streammind_analyzer::{AnalyzerClient, VideoAnalyzer};
use streammind_queue::JobQueue;
use streammind_store::{StoreConfig, TokenStore};
use streammind_worker::{WorkerConfig, WorkerPool};

use crate::config::ApiConfig;
use crate::hub::FanoutHub;
use crate::session::{OpenSessionDirectory, SessionDirectory};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn TokenStore>,
    pub queue: Arc<JobQueue>,
    pub pool: Arc<WorkerPool>,
    pub hub: Arc<FanoutHub>,
    pub sessions: Arc<dyn SessionDirectory>,
}

impl AppState {
    /// Wire the pipeline together. The worker pool is created but not
    /// started.
    pub fn new(
        config: ApiConfig,
        worker_config: WorkerConfig,
        store: Arc<dyn TokenStore>,
        analyzer: Arc<dyn VideoAnalyzer>,
    ) -> Self {
        let queue = Arc::new(JobQueue::new());
        let pool = Arc::new(WorkerPool::new(worker_config, Arc::clone(&queue), analyzer));

        Self {
            config,
            store,
            queue,
            pool,
            hub: Arc::new(FanoutHub::new()),
            sessions: Arc::new(OpenSessionDirectory),
        }
    }

    /// Build state from environment variables, connecting the token store.
    pub async fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let store_config = StoreConfig::from_env().context("invalid token store configuration")?;
        let store = streammind_store::connect(&store_config)
            .await
            .with_context(|| format!("failed to open {} token store", store_config.backend.as_str()))?;
        let analyzer = AnalyzerClient::from_env().context("invalid analysis service configuration")?;

        Ok(Self::new(config, WorkerConfig::from_env(), store, Arc::new(analyzer)))
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionDirectory>) -> Self {
        self.sessions = sessions;
        self
    }
}
