use crate::backend::{DeadLetter, JobBackend, JobRequest};
use crate::cancel::CancellationToken;
use crate::error::{JobError, Result};
use crate::job::{Job, JobContext};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Upper bound for the delay between two attempts of the same job
pub const MAX_BACKOFF: Duration = Duration::from_secs(86400);

/// Delay before the next attempt, `base * 2^attempts`, capped at [`MAX_BACKOFF`]
pub fn backoff_delay(base: Duration, attempts: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempts))
        .min(MAX_BACKOFF)
}

/// Main job queue manager
#[derive(Clone)]
pub struct JobQueue {
    backend: Arc<dyn JobBackend>,
    shutdown: CancellationToken,
    poll_interval: Duration,
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("poll_interval", &self.poll_interval)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl JobQueue {
    /// Create a new job queue with a backend
    pub fn new<B: JobBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            shutdown: CancellationToken::new(),
            poll_interval: Duration::from_millis(100),
        }
    }

    /// How long an idle worker sleeps before polling the backend again
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Token cancelled when the queue shuts down. Jobs see it as [`JobContext::shutdown`].
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Signal every worker of this queue to stop after its current job
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Enqueue a job
    pub async fn enqueue<J: Job>(&self, job: J) -> Result<String> {
        self.enqueue_opts(job, EnqueueOptions::default()).await
    }

    /// Enqueue a job with options
    pub async fn enqueue_opts<J: Job>(&self, job: J, opts: EnqueueOptions) -> Result<String> {
        if opts.max_attempts == 0 {
            return Err(JobError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let request = JobRequest {
            id: id.clone(),
            handler: Arc::new(job),
            created_at: chrono::Utc::now(),
            attempts: 0,
            max_attempts: opts.max_attempts,
            retry_backoff: opts.retry_backoff,
            last_error: None,
            run_at: opts.run_at,
        };

        self.backend.push(request).await?;
        tracing::trace!(job = J::NAME, job_id = %id, "job enqueued");
        Ok(id)
    }

    /// Process a single job (for testing or manual control)
    pub async fn process_one(&self) -> Result<bool> {
        let Some(req) = self.backend.pop().await? else {
            return Ok(false);
        };

        let ctx = JobContext {
            job_id: req.id.clone(),
            attempt: req.attempts + 1,
            created_at: req.created_at,
            shutdown: self.shutdown.clone(),
        };

        match req.handler.handle(ctx).await {
            Ok(()) => {
                self.backend.complete(&req.id).await?;
                tracing::debug!(job = req.name(), job_id = %req.id, "job completed");
            }
            Err(e) => {
                let mut new_req = req.clone();
                new_req.attempts += 1;
                new_req.last_error = Some(e.to_string());

                let retryable = !matches!(e, JobError::Cancelled);
                if retryable && new_req.attempts < new_req.max_attempts {
                    let delay = backoff_delay(new_req.retry_backoff, new_req.attempts);
                    let retry_delay = chrono::Duration::from_std(delay)
                        .unwrap_or_else(|_| chrono::Duration::seconds(86400));
                    new_req.run_at = Some(chrono::Utc::now() + retry_delay);

                    tracing::warn!(
                        job = req.name(),
                        job_id = %req.id,
                        attempt = new_req.attempts,
                        error = %e,
                        "job failed, retrying in {:?}",
                        delay
                    );
                    self.backend.push(new_req).await?;
                } else {
                    tracing::error!(
                        job = req.name(),
                        job_id = %req.id,
                        attempts = new_req.attempts,
                        error = %e,
                        "job failed permanently"
                    );
                    self.backend.fail(&new_req, &e.to_string()).await?;
                }
            }
        }

        Ok(true)
    }

    /// Process jobs until none is ready. Returns the number of attempts made.
    pub async fn run_until_idle(&self) -> Result<usize> {
        let mut processed = 0;
        while self.process_one().await? {
            processed += 1;
        }
        Ok(processed)
    }

    /// Number of queued jobs, including delayed retries
    pub async fn pending(&self) -> Result<usize> {
        self.backend.pending().await
    }

    /// Jobs that failed permanently
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.backend.dead_letters().await
    }

    /// Start a worker loop. Returns once the queue is shut down.
    pub async fn start_worker(&self) -> Result<()> {
        while !self.shutdown.is_cancelled() {
            let idle = match self.process_one().await {
                Ok(processed) => {
                    if processed {
                        continue;
                    }
                    self.poll_interval
                }
                Err(e) => {
                    tracing::error!("Worker error: {}", e);
                    Duration::from_secs(1)
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(idle) => {}
            }
        }
        Ok(())
    }

    /// Spawn `count` workers on the current runtime
    pub fn spawn_workers(&self, count: usize) -> WorkerPool {
        let handles = (0..count.max(1))
            .map(|_| {
                let queue = self.clone();
                tokio::spawn(async move { queue.start_worker().await })
            })
            .collect();

        WorkerPool {
            handles,
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Workers spawned by [`JobQueue::spawn_workers`]
pub struct WorkerPool {
    handles: Vec<JoinHandle<Result<()>>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop all workers and wait for their current jobs to finish
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Worker stopped with error: {}", e),
                Err(e) => tracing::error!("Worker task panicked: {}", e),
            }
        }
    }
}

/// Options for enqueueing a job
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub run_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_backoff: Duration::from_secs(1),
            run_at: None,
        }
    }
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Base delay of the exponential backoff between attempts
    pub fn retry_backoff(mut self, base: Duration) -> Self {
        self.retry_backoff = base;
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        let delay = chrono::Duration::from_std(duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(86400));
        self.run_at = Some(chrono::Utc::now() + delay);
        self
    }
}
