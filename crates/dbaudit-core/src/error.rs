//! Error types for dbaudit

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for audit operations
pub type Result<T, E = AuditError> = std::result::Result<T, E>;

/// Failures reported by a store of record.
///
/// These are the primary-save failures a caller is expected to handle, so an audited
/// context hands them back untouched inside [`AuditError::Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write conflicts with existing data (for example a duplicate key).
    #[error("Update conflict: {0}")]
    UpdateConflict(String),

    /// The row to update or delete no longer matches what was read.
    #[error("Concurrency violation on {entity_type} {id}")]
    ConcurrencyViolation { entity_type: String, id: Uuid },

    /// The store could not be reached or failed internally.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The operation was cancelled before anything was written.
    #[error("Store operation cancelled")]
    Cancelled,
}

/// Errors raised by the audit pipeline
#[derive(Debug, Error)]
pub enum AuditError {
    /// A store failure, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A recorder needing the parent-context relation was used before it was set.
    #[error("The parent context of recorder `{0}` has not been set")]
    MissingParentContext(&'static str),

    /// A persisted type key has no entry in the type registry.
    #[error("Unknown type key: {0}")]
    UnknownType(String),

    /// An entity does not describe the named property.
    #[error("Entity type `{entity_type}` has no property `{property}`")]
    UnknownProperty {
        entity_type: String,
        property: String,
    },

    /// A value does not fit the declared type of a property.
    #[error("Property `{property}` expects {expected}, got {actual}")]
    PropertyType {
        property: String,
        expected: String,
        actual: String,
    },

    /// Serializing or deserializing a value failed.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The staging area shared with recorders is unusable.
    #[error("Staging error: {0}")]
    Staging(String),

    /// Loading configuration failed.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl AuditError {
    /// The original store error, if this is a store failure
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            AuditError::Store(err) => Some(err),
            _ => None,
        }
    }

    /// Unwrap the original store error, if this is a store failure
    pub fn into_store_error(self) -> Option<StoreError> {
        match self {
            AuditError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::Codec(err.to_string())
    }
}
