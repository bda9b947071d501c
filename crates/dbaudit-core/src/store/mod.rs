//! Stores of record
//!
//! A [`DataStore`] holds the business entities. An [`AuditStore`] holds ChangeSets.
//! [`MemoryStore`] implements both, so a single instance can serve as the store being
//! audited and as the audit store of a same-store setup.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use crate::error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAuditStore;

use crate::entity::{Entity, EntityKey};
use crate::model::ChangeSet;
use crate::query::ChangeQuery;
use async_trait::async_trait;
use dbaudit_jobs::CancellationToken;
use std::fmt;

/// One entity write of a save
#[derive(Debug, Clone)]
pub enum EntityWrite {
    Insert(Box<dyn Entity>),
    Update(Box<dyn Entity>),
    Delete(EntityKey),
}

impl EntityWrite {
    pub fn key(&self) -> EntityKey {
        match self {
            EntityWrite::Insert(entity) | EntityWrite::Update(entity) => entity.key(),
            EntityWrite::Delete(key) => *key,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            EntityWrite::Insert(_) => "insert",
            EntityWrite::Update(_) => "update",
            EntityWrite::Delete(_) => "delete",
        }
    }
}

impl fmt::Display for EntityWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.key())
    }
}

/// Everything one save writes, applied atomically
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub writes: Vec<EntityWrite>,
    /// ChangeSets staged to be written in the same transaction
    pub change_sets: Vec<ChangeSet>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.change_sets.is_empty()
    }

    /// Rows this batch writes: entities, ChangeSets and their Changes
    pub fn row_count(&self) -> usize {
        self.writes.len()
            + self
                .change_sets
                .iter()
                .map(|set| 1 + set.changes.len())
                .sum::<usize>()
    }
}

/// Store of the audited entities
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Apply a batch atomically and return the number of rows written.
    ///
    /// Nothing is written when an error is returned.
    async fn save(&self, batch: WriteBatch, cancel: &CancellationToken) -> Result<usize, StoreError>;

    /// Load an entity as currently stored
    async fn fetch(&self, key: &EntityKey) -> Result<Option<Box<dyn Entity>>, StoreError>;
}

/// Store of ChangeSets
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Insert a ChangeSet with its Changes in one transaction and return its new id
    async fn insert_change_set(
        &self,
        change_set: ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<i64, StoreError>;

    /// ChangeSets matching the query. Each set carries only its matching Changes.
    async fn query(&self, query: &ChangeQuery) -> Result<Vec<ChangeSet>, StoreError>;

    async fn change_set(&self, id: i64) -> Result<Option<ChangeSet>, StoreError>;

    /// Number of stored ChangeSets
    async fn count(&self) -> Result<usize, StoreError>;
}
