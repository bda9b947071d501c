use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Worker error: {0}")]
    WorkerError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, JobError>;
