//! Application state.

use std::sync::Arc;

use slidecast_storage::FileStorage;
use slidecast_store::{InMemoryJobStore, JobRepository};
use slidecast_worker::{ConversionPipeline, JobExecutor, JobService, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub service: Arc<JobService>,
    pub executor: Arc<JobExecutor>,
}

impl AppState {
    /// Wire the in-memory store, file storage and the real tool pipeline.
    ///
    /// Must run inside a tokio runtime; the executor spawns its dispatcher.
    pub fn new(config: ApiConfig, worker_config: &WorkerConfig) -> Self {
        let store: Arc<dyn JobRepository> = Arc::new(InMemoryJobStore::new());
        let service = JobService::new(
            store,
            FileStorage::new(&worker_config.storage_path),
            ConversionPipeline::from_config(worker_config),
        );
        Self::with_service(config, Arc::new(service), worker_config)
    }

    /// Build state around an existing service, e.g. one using fake tools.
    pub fn with_service(
        config: ApiConfig,
        service: Arc<JobService>,
        worker_config: &WorkerConfig,
    ) -> Self {
        let executor = JobExecutor::new(Arc::clone(&service), worker_config);
        Self {
            config,
            service,
            executor: Arc::new(executor),
        }
    }
}
