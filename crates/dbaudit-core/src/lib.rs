//! # dbaudit Core
//!
//! Change capture for audited units of work: change tracking, diffing, recorders, the
//! ChangeSet/Change model and the two-phase audit commit.
//!
//! This crate is not meant to be used directly. Use `dbaudit` instead.

pub mod codec;
pub mod config;
mod context;
pub mod entity;
mod error;
mod identity;
mod model;
pub mod query;
pub mod recorder;
pub mod schema;
pub mod store;
pub mod tracking;
pub mod types;
mod value;
#[cfg(test)]
mod test_support;

// Public API
pub use codec::{JsonCodec, ValueCodec};
pub use config::{AuditConfig, ConfigError};
pub use context::{AuditedContext, AuditedContextBuilder, SaveState};
pub use entity::{
    AuditStamps, AuditedEntity, Entity, EntityDescriptor, EntityKey, PropertyDescriptor,
    PropertyRole,
};
pub use error::{AuditError, Result, StoreError};
pub use identity::{Identity, SharedIdentity, StaticIdentity};
pub use model::{Change, ChangeSet, EntityChange, EntityRef};
pub use query::{ChangeQuery, ChangeQueryBuilder};
pub use recorder::{
    ChangeRecorder, CommitChangeSetJob, HasParentContext, ParentContext, PendingCommit,
    RecordingBuffer, SameStoreRecorder, SeparateStoreRecorder,
};
pub use store::{AuditStore, DataStore, EntityWrite, MemoryStore, WriteBatch};
#[cfg(feature = "sqlite")]
pub use store::SqliteAuditStore;
pub use tracking::{ChangeTracker, EntityEntry, EntityState, PropertyEntry};
pub use types::{TypeDescriptor, TypeRegistry};
pub use value::{Value, ValueKind};
