//! Composition root for long-running services

use dbaudit_core::config::load_dotenv;
use dbaudit_core::{AuditConfig, AuditedContext, AuditedContextBuilder, ConfigError, DataStore};
use dbaudit_jobs::{InMemoryBackend, JobQueue, WorkerPool};
use std::sync::Arc;

/// The commit queue and its workers, started from an [`AuditConfig`].
///
/// Every context built through [`AuditRuntime::builder`] hands its post-save audit
/// commits to the same queue. Call [`shutdown`](AuditRuntime::shutdown) to stop the
/// workers; commits still queued at that point are not run.
///
/// Must be created inside a tokio runtime.
pub struct AuditRuntime {
    config: AuditConfig,
    queue: JobQueue,
    workers: WorkerPool,
}

impl AuditRuntime {
    pub fn new(config: AuditConfig) -> Self {
        let queue = JobQueue::new(InMemoryBackend::new()).poll_interval(config.poll_interval());
        let workers = queue.spawn_workers(config.commit_workers);
        tracing::info!(
            workers = workers.len(),
            max_attempts = config.commit_max_attempts,
            "audit runtime started"
        );

        Self {
            config,
            queue,
            workers,
        }
    }

    /// Load `.env` if present, then read the `DBAUDIT_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Ok(Self::new(AuditConfig::from_env()?))
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// A context builder wired to this runtime's queue and configuration
    pub fn builder(&self, store: Arc<dyn DataStore>) -> AuditedContextBuilder {
        AuditedContext::builder(store)
            .queue(self.queue.clone())
            .config(self.config.clone())
    }

    /// Stop the workers after their current commit
    pub async fn shutdown(self) {
        let pending = self.queue.pending().await.unwrap_or_default();
        if pending > 0 {
            tracing::warn!(pending, "audit runtime stopping with queued commits");
        }
        self.workers.shutdown().await;
        tracing::info!("audit runtime stopped");
    }
}
