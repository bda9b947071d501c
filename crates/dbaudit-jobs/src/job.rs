use crate::cancel::CancellationToken;
use crate::error::Result;
use async_trait::async_trait;

/// Context passed to job execution
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub attempt: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Fires when the queue that owns the worker shuts down.
    pub shutdown: CancellationToken,
}

/// A job that can be executed
///
/// The job value itself carries everything it needs, so dispatch is a plain virtual call.
/// `execute` takes `&self` because a failed attempt is retried with the same value.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// The job name, used for logging and dead letters
    const NAME: &'static str;

    /// Execute the job
    async fn execute(&self, ctx: JobContext) -> Result<()>;
}

/// A type-erased job handler
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: JobContext) -> Result<()>;
}

#[async_trait]
impl<J: Job> JobHandler for J {
    fn name(&self) -> &'static str {
        J::NAME
    }

    async fn handle(&self, ctx: JobContext) -> Result<()> {
        self.execute(ctx).await
    }
}
