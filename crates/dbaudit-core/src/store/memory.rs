//! In-memory store

use super::{AuditStore, DataStore, EntityWrite, StoreError, WriteBatch};
use crate::entity::{Entity, EntityKey};
use crate::model::ChangeSet;
use crate::query::ChangeQuery;
use async_trait::async_trait;
use dbaudit_jobs::CancellationToken;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Tables {
    entities: HashMap<EntityKey, Box<dyn Entity>>,
    change_sets: BTreeMap<i64, ChangeSet>,
    next_change_set_id: i64,
}

impl Tables {
    /// Reject the batch if any write would fail, before anything is applied
    fn check(&self, writes: &[EntityWrite]) -> Result<(), StoreError> {
        let mut inserted = Vec::new();
        for write in writes {
            let key = write.key();
            let exists = self.entities.contains_key(&key) || inserted.contains(&key);
            match write {
                EntityWrite::Insert(_) if exists => {
                    return Err(StoreError::UpdateConflict(format!(
                        "{} already exists",
                        key
                    )));
                }
                EntityWrite::Insert(_) => inserted.push(key),
                EntityWrite::Update(_) | EntityWrite::Delete(_) if !exists => {
                    return Err(StoreError::ConcurrencyViolation {
                        entity_type: key.entity_type.to_string(),
                        id: key.id,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn insert_change_set(&mut self, mut change_set: ChangeSet) -> i64 {
        self.next_change_set_id += 1;
        let id = self.next_change_set_id;
        change_set.assign_ids(id);
        self.change_sets.insert(id, change_set);
        id
    }
}

/// Entity and audit tables kept in memory behind one lock.
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an entity in the table directly, bypassing change tracking
    pub fn seed(&self, entity: Box<dyn Entity>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.entities.insert(entity.key(), entity);
        Ok(())
    }

    /// Number of stored entities
    pub fn entity_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables.read().map_err(poisoned)?.entities.len())
    }

    /// Every stored ChangeSet, oldest first
    pub fn change_sets(&self) -> Result<Vec<ChangeSet>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.change_sets.values().cloned().collect())
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("Lock poisoned".to_string())
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn save(&self, batch: WriteBatch, cancel: &CancellationToken) -> Result<usize, StoreError> {
        let rows = batch.row_count();
        let mut tables = self.tables.write().map_err(poisoned)?;

        tables.check(&batch.writes)?;
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        for write in batch.writes {
            match write {
                EntityWrite::Insert(entity) | EntityWrite::Update(entity) => {
                    tables.entities.insert(entity.key(), entity);
                }
                EntityWrite::Delete(key) => {
                    tables.entities.remove(&key);
                }
            }
        }
        for change_set in batch.change_sets {
            tables.insert_change_set(change_set);
        }

        tracing::trace!(rows, "memory store saved batch");
        Ok(rows)
    }

    async fn fetch(&self, key: &EntityKey) -> Result<Option<Box<dyn Entity>>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.entities.get(key).cloned())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_change_set(
        &self,
        change_set: ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(tables.insert_change_set(change_set))
    }

    async fn query(&self, query: &ChangeQuery) -> Result<Vec<ChangeSet>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(query.apply(tables.change_sets.values()))
    }

    async fn change_set(&self, id: i64) -> Result<Option<ChangeSet>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.change_sets.get(&id).cloned())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.tables.read().map_err(poisoned)?.change_sets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Change;
    use crate::test_support::Note;
    use uuid::Uuid;

    fn note(title: &str) -> Box<dyn Entity> {
        Box::new(Note {
            id: Uuid::new_v4(),
            ..Note::new(title)
        })
    }

    fn change_set(changes: usize) -> ChangeSet {
        let mut set = ChangeSet::new(Some("alice".to_string()));
        for i in 0..changes {
            set.changes.push(Change {
                id: Uuid::nil(),
                change_set_id: 0,
                entity_id: Uuid::new_v4(),
                entity_type: "note".to_string(),
                name: format!("P{}", i),
                property_type: "string".to_string(),
                previous_value: None,
                new_value: Some("\"x\"".to_string()),
            });
        }
        set
    }

    #[tokio::test]
    async fn test_save_counts_entity_and_audit_rows() {
        let store = MemoryStore::new();
        let batch = WriteBatch {
            writes: vec![EntityWrite::Insert(note("a")), EntityWrite::Insert(note("b"))],
            change_sets: vec![change_set(2)],
        };

        let rows = store.save(batch, &CancellationToken::new()).await.unwrap();
        assert_eq!(rows, 5);
        assert_eq!(store.entity_count().unwrap(), 2);

        let sets = store.change_sets().unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].id, 1);
        assert!(sets[0].changes.iter().all(|c| c.change_set_id == 1));
    }

    #[tokio::test]
    async fn test_conflict_writes_nothing() {
        let store = MemoryStore::new();
        let existing = note("a");
        store.seed(existing.clone()).unwrap();

        let batch = WriteBatch {
            writes: vec![EntityWrite::Insert(note("b")), EntityWrite::Insert(existing)],
            change_sets: vec![change_set(1)],
        };
        let err = store.save(batch, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, StoreError::UpdateConflict(_)));
        assert_eq!(store.entity_count().unwrap(), 1);
        assert_eq!(AuditStore::count(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_concurrency_violation() {
        let store = MemoryStore::new();
        let batch = WriteBatch {
            writes: vec![EntityWrite::Update(note("a"))],
            change_sets: vec![],
        };
        let err = store.save(batch, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::ConcurrencyViolation { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_save_writes_nothing() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let batch = WriteBatch {
            writes: vec![EntityWrite::Insert(note("a"))],
            change_sets: vec![],
        };
        let err = store.save(batch, &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
        assert_eq!(store.entity_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_returns_copy() {
        let store = MemoryStore::new();
        let entity = note("a");
        let key = entity.key();
        store.seed(entity).unwrap();

        let fetched = store.fetch(&key).await.unwrap().unwrap();
        assert_eq!(fetched.downcast_ref::<Note>().unwrap().title.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_insert_change_set_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let token = CancellationToken::new();
        let first = store.insert_change_set(change_set(1), &token).await.unwrap();
        let second = store.insert_change_set(change_set(1), &token).await.unwrap();
        assert_eq!((first, second), (1, 2));

        let stored = store.change_set(2).await.unwrap().unwrap();
        assert!(!stored.changes[0].id.is_nil());
    }
}
