use super::{DeadLetter, JobBackend, JobRequest};
use crate::error::{JobError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// In-memory job backend (not persistent, for testing/dev)
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    queue: Arc<Mutex<VecDeque<JobRequest>>>,
    dead: Arc<Mutex<Vec<DeadLetter>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> JobError {
    JobError::BackendError("Lock poisoned".to_string())
}

#[async_trait]
impl JobBackend for InMemoryBackend {
    async fn push(&self, job: JobRequest) -> Result<()> {
        let mut q = self.queue.lock().map_err(poisoned)?;
        q.push_back(job);
        Ok(())
    }

    async fn pop(&self) -> Result<Option<JobRequest>> {
        let mut q = self.queue.lock().map_err(poisoned)?;

        // A delayed retry must not hold back ready jobs queued behind it
        let now = chrono::Utc::now();
        match q.iter().position(|job| job.is_ready(now)) {
            Some(index) => Ok(q.remove(index)),
            None => Ok(None),
        }
    }

    async fn complete(&self, _job_id: &str) -> Result<()> {
        // Jobs leave the queue on pop
        Ok(())
    }

    async fn fail(&self, job: &JobRequest, error: &str) -> Result<()> {
        let mut dead = self.dead.lock().map_err(poisoned)?;
        dead.push(DeadLetter {
            id: job.id.clone(),
            name: job.name(),
            attempts: job.attempts,
            error: error.to_string(),
            failed_at: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn pending(&self) -> Result<usize> {
        Ok(self.queue.lock().map_err(poisoned)?.len())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.dead.lock().map_err(poisoned)?.clone())
    }
}
