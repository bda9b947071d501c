//! Background work queue for dbaudit
//!
//! Deferred work is expressed as strongly typed [`Job`] values. The queue stores them in a
//! pluggable [`JobBackend`], and workers dequeue and execute them, retrying failed
//! attempts with exponential backoff and moving exhausted jobs to a dead-letter list.
//!
//! ```rust,ignore
//! use dbaudit_jobs::{InMemoryBackend, JobQueue};
//!
//! let queue = JobQueue::new(InMemoryBackend::new());
//! let workers = queue.spawn_workers(2);
//! queue.enqueue(MyJob { .. }).await?;
//! workers.shutdown().await;
//! ```

pub mod backend;
pub mod cancel;
pub mod error;
pub mod job;
pub mod queue;

pub use backend::memory::InMemoryBackend;
pub use backend::{DeadLetter, JobBackend, JobRequest};
pub use cancel::CancellationToken;
pub use error::{JobError, Result};
pub use job::{Job, JobContext, JobHandler};
pub use queue::{EnqueueOptions, JobQueue, WorkerPool};
