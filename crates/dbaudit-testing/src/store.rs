//! Fault injection around [`MemoryStore`]

use async_trait::async_trait;
use dbaudit_core::{
    AuditStore, ChangeQuery, ChangeSet, DataStore, Entity, EntityKey, MemoryStore, StoreError,
    WriteBatch,
};
use dbaudit_jobs::CancellationToken;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Faults {
    save: VecDeque<StoreError>,
    insert: VecDeque<StoreError>,
}

/// A [`MemoryStore`] whose next writes can be made to fail.
///
/// Queued faults are consumed one per call, in order. Clones share the tables and the
/// fault queues.
#[derive(Debug, Clone, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Arc<Mutex<Faults>>,
    saves: Arc<AtomicUsize>,
    inserts: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrap(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next primary write with `error`
    pub fn fail_next_save(&self, error: StoreError) {
        self.faults().save.push_back(error);
    }

    /// Fail the next ChangeSet insert with `error`
    pub fn fail_next_insert(&self, error: StoreError) {
        self.faults().insert.push_back(error);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Primary writes attempted so far, failed ones included
    pub fn save_calls(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// ChangeSet inserts attempted so far, failed ones included
    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore for FaultyStore {
    async fn save(&self, batch: WriteBatch, cancel: &CancellationToken) -> Result<usize, StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let fault = self.faults().save.pop_front();
        if let Some(error) = fault {
            tracing::debug!(error = %error, "injected save failure");
            return Err(error);
        }
        self.inner.save(batch, cancel).await
    }

    async fn fetch(&self, key: &EntityKey) -> Result<Option<Box<dyn Entity>>, StoreError> {
        self.inner.fetch(key).await
    }
}

#[async_trait]
impl AuditStore for FaultyStore {
    async fn insert_change_set(
        &self,
        change_set: ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<i64, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let fault = self.faults().insert.pop_front();
        if let Some(error) = fault {
            tracing::debug!(error = %error, "injected insert failure");
            return Err(error);
        }
        self.inner.insert_change_set(change_set, cancel).await
    }

    async fn query(&self, query: &ChangeQuery) -> Result<Vec<ChangeSet>, StoreError> {
        self.inner.query(query).await
    }

    async fn change_set(&self, id: i64) -> Result<Option<ChangeSet>, StoreError> {
        self.inner.change_set(id).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        AuditStore::count(&self.inner).await
    }
}
