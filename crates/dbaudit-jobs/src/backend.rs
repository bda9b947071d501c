use crate::error::Result;
use crate::job::JobHandler;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

pub mod memory;

/// A job waiting in the queue, together with its retry bookkeeping
#[derive(Clone)]
pub struct JobRequest {
    pub id: String,
    pub handler: Arc<dyn JobHandler>,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub retry_backoff: std::time::Duration,
    pub last_error: Option<String>,
    pub run_at: Option<DateTime<Utc>>,
}

impl JobRequest {
    pub fn name(&self) -> &'static str {
        self.handler.name()
    }

    /// Whether the job may run at `now`
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.run_at.map_or(true, |run_at| run_at <= now)
    }
}

impl fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRequest")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("created_at", &self.created_at)
            .field("attempts", &self.attempts)
            .field("max_attempts", &self.max_attempts)
            .field("last_error", &self.last_error)
            .field("run_at", &self.run_at)
            .finish()
    }
}

/// A job that exhausted its attempts
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub id: String,
    pub name: &'static str,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Backend storage for jobs
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Push a new job to the queue
    async fn push(&self, job: JobRequest) -> Result<()>;

    /// Pop the next available job
    /// Should return None if no job is available or ready
    async fn pop(&self) -> Result<Option<JobRequest>>;

    /// Mark a job as completed successfully
    async fn complete(&self, job_id: &str) -> Result<()>;

    /// Mark a job as failed permanently
    /// The queue has already decided not to retry it
    async fn fail(&self, job: &JobRequest, error: &str) -> Result<()>;

    /// Number of jobs still queued, ready or not
    async fn pending(&self) -> Result<usize>;

    /// Jobs that failed permanently
    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;
}
