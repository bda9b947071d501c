use crate::error::{AuditError, Result, StoreError};
use crate::model::ChangeSet;
use crate::store::AuditStore;
use async_trait::async_trait;
use dbaudit_jobs::{CancellationToken, Job, JobContext, JobError};
use std::fmt;
use std::sync::Arc;

/// A prepared ChangeSet and the store it will be written to
#[derive(Clone)]
pub struct PendingCommit {
    recorder: &'static str,
    change_set: ChangeSet,
    store: Arc<dyn AuditStore>,
}

impl fmt::Debug for PendingCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommit")
            .field("recorder", &self.recorder)
            .field("changes", &self.change_set.len())
            .finish()
    }
}

impl PendingCommit {
    pub fn new(recorder: &'static str, change_set: ChangeSet, store: Arc<dyn AuditStore>) -> Self {
        Self {
            recorder,
            change_set,
            store,
        }
    }

    pub fn recorder(&self) -> &'static str {
        self.recorder
    }

    pub fn change_set(&self) -> &ChangeSet {
        &self.change_set
    }

    /// Insert the ChangeSet and return the id the store assigned.
    ///
    /// The pending commit is left intact so a failed attempt can be retried.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<i64> {
        let id = self
            .store
            .insert_change_set(self.change_set.clone(), cancel)
            .await?;
        tracing::info!(
            recorder = self.recorder,
            change_set_id = id,
            changes = self.change_set.len(),
            "committed change set"
        );
        Ok(id)
    }
}

/// Background job writing one [`PendingCommit`].
///
/// The store sees a token cancelled by either the request that saved or the queue
/// shutting down.
#[derive(Debug, Clone)]
pub struct CommitChangeSetJob {
    pending: PendingCommit,
    request: CancellationToken,
}

impl CommitChangeSetJob {
    pub fn new(pending: PendingCommit, request: CancellationToken) -> Self {
        Self { pending, request }
    }
}

#[async_trait]
impl Job for CommitChangeSetJob {
    const NAME: &'static str = "commit_change_set";

    async fn execute(&self, ctx: JobContext) -> dbaudit_jobs::Result<()> {
        let cancel = CancellationToken::linked(&[&self.request, &ctx.shutdown]);
        match self.pending.run(&cancel).await {
            Ok(_) => Ok(()),
            Err(AuditError::Store(StoreError::Cancelled)) => Err(JobError::Cancelled),
            Err(e) => Err(JobError::WorkerError(format!(
                "{} commit failed on attempt {}: {}",
                self.pending.recorder, ctx.attempt, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use dbaudit_jobs::{EnqueueOptions, InMemoryBackend, JobQueue};
    use std::time::Duration;

    fn pending(store: &MemoryStore) -> PendingCommit {
        PendingCommit::new(
            "test",
            ChangeSet::new(Some("alice".to_string())),
            Arc::new(store.clone()),
        )
    }

    #[tokio::test]
    async fn test_job_writes_change_set() {
        let store = MemoryStore::new();
        let queue = JobQueue::new(InMemoryBackend::new());
        queue
            .enqueue(CommitChangeSetJob::new(pending(&store), CancellationToken::new()))
            .await
            .unwrap();

        assert_eq!(queue.run_until_idle().await.unwrap(), 1);
        assert_eq!(AuditStore::count(&store).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_request_is_dead_lettered_without_retry() {
        let store = MemoryStore::new();
        let queue = JobQueue::new(InMemoryBackend::new());
        let request = CancellationToken::new();
        request.cancel();

        queue
            .enqueue_opts(
                CommitChangeSetJob::new(pending(&store), request),
                EnqueueOptions::new()
                    .max_attempts(3)
                    .retry_backoff(Duration::ZERO),
            )
            .await
            .unwrap();

        assert_eq!(queue.run_until_idle().await.unwrap(), 1);
        assert_eq!(AuditStore::count(&store).await.unwrap(), 0);
        assert_eq!(queue.dead_letters().await.unwrap().len(), 1);
    }
}
