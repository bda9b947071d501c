//! The audited context
//!
//! An [`AuditedContext`] is one unit of work over a [`DataStore`]. Saving it runs the
//! audit state machine:
//!
//! ```text
//! Idle -> Recording -> Saving -> Committing -> Idle
//!                            \-> Discarding -> Idle
//! ```
//!
//! Recording stamps audited entities and feeds every diff to the recorders. Saving runs
//! the primary write. On success each recorder's pending commit is queued; on failure
//! every recorder discards and the store error is returned as it was raised.

mod builder;

pub use builder::AuditedContextBuilder;

use crate::entity::{now, Entity, EntityClone, EntityKey};
use crate::error::{AuditError, Result};
use crate::identity::SharedIdentity;
use crate::recorder::{ChangeRecorder, CommitChangeSetJob, ParentContext, PendingCommit};
use crate::store::{DataStore, EntityWrite, StoreError, WriteBatch};
use crate::tracking::{ChangeTracker, EntityEntry, EntityState};
use dbaudit_jobs::{CancellationToken, EnqueueOptions, JobQueue};
use futures_util::future;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Where a save currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Recording,
    Saving,
    Committing,
    Discarding,
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SaveState::Idle => "idle",
            SaveState::Recording => "recording",
            SaveState::Saving => "saving",
            SaveState::Committing => "committing",
            SaveState::Discarding => "discarding",
        };
        f.write_str(name)
    }
}

/// A unit of work whose saves are audited
pub struct AuditedContext {
    store: Arc<dyn DataStore>,
    tracker: ChangeTracker,
    recorders: Vec<Box<dyn ChangeRecorder>>,
    parent: ParentContext,
    queue: Option<JobQueue>,
    commit_options: EnqueueOptions,
    state: SaveState,
}

impl fmt::Debug for AuditedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recorders: Vec<_> = self.recorders.iter().map(|r| r.name()).collect();
        f.debug_struct("AuditedContext")
            .field("state", &self.state)
            .field("tracked", &self.tracker.len())
            .field("recorders", &recorders)
            .field("identity", &self.parent.identity())
            .finish_non_exhaustive()
    }
}

impl AuditedContext {
    pub fn builder(store: Arc<dyn DataStore>) -> AuditedContextBuilder {
        AuditedContextBuilder::new(store)
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    fn transition(&mut self, next: SaveState) {
        tracing::trace!(from = %self.state, to = %next, "save state");
        self.state = next;
    }

    pub fn identity(&self) -> Option<&SharedIdentity> {
        self.parent.identity()
    }

    pub fn recorders(&self) -> &[Box<dyn ChangeRecorder>] {
        &self.recorders
    }

    pub fn parent_context(&self) -> &ParentContext {
        &self.parent
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// At least one recorder and an acting identity are configured
    pub fn can_audit(&self) -> bool {
        !self.recorders.is_empty() && self.parent.identity().is_some()
    }

    // Entity access

    /// Track a new entity and return its id
    pub fn add<T: Entity>(&mut self, entity: T) -> Result<Uuid> {
        self.tracker.add(Box::new(entity))
    }

    /// Track an entity that already exists in the store
    pub fn attach<T: Entity>(&mut self, entity: T) -> Result<Uuid> {
        self.tracker.attach(Box::new(entity))
    }

    /// Mark a tracked entity for deletion
    pub fn remove(&mut self, id: Uuid) -> bool {
        self.tracker.remove(id)
    }

    pub fn get<T: Entity>(&self, id: Uuid) -> Option<&T> {
        self.tracker.find(id)?.entity().downcast_ref()
    }

    /// Mutable access to a tracked entity. Changes are picked up by change detection.
    pub fn get_mut<T: Entity>(&mut self, id: Uuid) -> Option<&mut T> {
        self.tracker.find_mut(id)?.entity_mut().downcast_mut()
    }

    pub fn entry(&self, id: Uuid) -> Option<&EntityEntry> {
        self.tracker.find(id)
    }

    pub fn entry_mut(&mut self, id: Uuid) -> Option<&mut EntityEntry> {
        self.tracker.find_mut(id)
    }

    pub fn state_of(&self, id: Uuid) -> EntityState {
        self.tracker.state_of(id)
    }

    /// Find an entity among the tracked ones, then in the store. A stored entity is
    /// attached.
    pub async fn find<T: Entity>(&mut self, id: Uuid) -> Result<Option<&T>> {
        if self.tracker.find(id).is_none() {
            let key = EntityKey {
                entity_type: T::type_descriptor().name,
                id,
            };
            if let Some(entity) = self.store.fetch(&key).await? {
                self.tracker.attach(entity)?;
            }
        }
        Ok(self
            .tracker
            .find(id)
            .and_then(|entry| entry.entity().downcast_ref()))
    }

    // Save orchestration

    /// Detect changes, stamp audited entities and feed every diff to the recorders.
    ///
    /// Recorders only see the diffs when the context can audit; stamping happens
    /// either way.
    pub fn record_changes(&mut self) -> Result<()> {
        if self.tracker.auto_detect_changes() {
            self.tracker.detect_changes();
        }

        let can_audit = self.can_audit();
        let at = now();
        let by = self.parent.identity().map(|i| i.id().to_string());

        let recorders = &mut self.recorders;
        for entry in self.tracker.entries_mut() {
            let state = entry.state();
            let Some(audited) = entry.entity_mut().as_audited_mut() else {
                continue;
            };
            match state {
                EntityState::Added => audited.set_created(at, by.clone()),
                EntityState::Modified => audited.set_last_modified(at, by.clone()),
                _ => {}
            }

            if can_audit {
                record_entry(recorders, entry)?;
            }
        }

        if can_audit {
            for recorder in recorders.iter_mut() {
                if let Some(child) = recorder.as_has_parent_context() {
                    child.set_parent_context(self.parent.clone());
                }
                recorder.on_saving_changes()?;
            }
        }
        Ok(())
    }

    /// Save with a token that is never cancelled
    pub async fn save_changes(&mut self) -> Result<usize> {
        self.save_changes_with_cancellation(&CancellationToken::new())
            .await
    }

    /// Record, write and then commit or discard the audit records.
    ///
    /// Returns the number of rows the primary write touched. A failed primary write
    /// is returned as [`AuditError::Store`] holding the store's own error.
    pub async fn save_changes_with_cancellation(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.transition(SaveState::Recording);
        if let Err(e) = self.record_changes() {
            tracing::warn!(error = %e, "recording changes failed");
            self.discard_after_failure(cancel).await?;
            return Err(e);
        }

        self.transition(SaveState::Saving);
        let batch = match self.write_batch() {
            Ok(batch) => batch,
            Err(e) => {
                self.discard_after_failure(cancel).await?;
                return Err(e);
            }
        };

        match self.store.save(batch, cancel).await {
            Ok(rows) => {
                self.tracker.accept_all_changes();
                self.transition(SaveState::Committing);
                self.schedule_commits(cancel).await;
                self.transition(SaveState::Idle);
                tracing::debug!(rows, "saved changes");
                Ok(rows)
            }
            Err(e) => {
                tracing::warn!(error = %e, "primary save failed, discarding recorded changes");
                self.discard_after_failure(cancel).await?;
                Err(AuditError::Store(e))
            }
        }
    }

    fn write_batch(&self) -> Result<WriteBatch> {
        let writes = self
            .tracker
            .entries()
            .filter_map(|entry| match entry.state() {
                EntityState::Added => Some(EntityWrite::Insert(entry.entity().clone_entity())),
                EntityState::Modified => {
                    Some(EntityWrite::Update(entry.entity().clone_entity()))
                }
                EntityState::Deleted => Some(EntityWrite::Delete(entry.entity().key())),
                EntityState::Unchanged | EntityState::Detached => None,
            })
            .collect();

        Ok(WriteBatch {
            writes,
            change_sets: self.parent.take_staged()?,
        })
    }

    async fn discard_after_failure(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.transition(SaveState::Discarding);
        let discarded = self.discard_recorded_changes(cancel).await;
        let cleared = self.parent.take_staged().map(|_| ());
        self.transition(SaveState::Idle);
        discarded.and(cleared)
    }

    /// Hand every recorder's pending commit to the queue. Failures here are logged and
    /// never reach the caller of the save.
    async fn schedule_commits(&mut self, cancel: &CancellationToken) {
        let mut pending = Vec::new();
        for recorder in self.recorders.iter_mut() {
            match recorder.take_commit() {
                Ok(Some(commit)) => pending.push(commit),
                Ok(None) => {}
                Err(e) => tracing::error!(
                    recorder = recorder.name(),
                    error = %e,
                    "failed to prepare audit commit"
                ),
            }
        }

        for commit in pending {
            self.schedule(commit, cancel).await;
        }
    }

    async fn schedule(&self, commit: PendingCommit, cancel: &CancellationToken) {
        let recorder = commit.recorder();
        match &self.queue {
            Some(queue) => {
                let job = CommitChangeSetJob::new(commit, cancel.clone());
                match queue.enqueue_opts(job, self.commit_options.clone()).await {
                    Ok(job_id) => {
                        tracing::debug!(recorder, %job_id, "queued audit commit")
                    }
                    Err(e) => {
                        tracing::error!(recorder, error = %e, "failed to queue audit commit")
                    }
                }
            }
            // no queue: write in the background so the save does not wait on the audit store
            None => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let cancel = cancel.clone();
                    handle.spawn(async move {
                        if let Err(e) = commit.run(&cancel).await {
                            tracing::error!(recorder, error = %e, "audit commit failed");
                        }
                    });
                    tracing::debug!(recorder, "spawned audit commit");
                }
                Err(_) => {
                    if let Err(e) = commit.run(cancel).await {
                        tracing::error!(recorder, error = %e, "audit commit failed");
                    }
                }
            },
        }
    }

    /// Write the recorded changes of every recorder now
    pub async fn commit_recorded_changes(&mut self, cancel: &CancellationToken) -> Result<()> {
        if !self.can_audit() {
            return Ok(());
        }
        future::try_join_all(self.recorders.iter_mut().map(|r| r.commit(cancel))).await?;
        Ok(())
    }

    /// Drop the recorded changes of every recorder. Every recorder is discarded even if
    /// one fails; the first failure is returned.
    pub async fn discard_recorded_changes(&mut self, cancel: &CancellationToken) -> Result<()> {
        if !self.can_audit() {
            return Ok(());
        }
        let results =
            future::join_all(self.recorders.iter_mut().map(|r| r.discard(cancel))).await;
        results.into_iter().collect()
    }

    /// Revert pending changes: deleted entities are kept, modified ones are reloaded
    /// from the store and added ones are detached. The audit store is not touched.
    pub async fn undo_changes(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.tracker.auto_detect_changes() {
            self.tracker.detect_changes();
        }

        let store = self.store.clone();
        let mut detach = Vec::new();
        for entry in self.tracker.entries_mut() {
            if cancel.is_cancelled() {
                return Err(AuditError::Store(StoreError::Cancelled));
            }
            match entry.state() {
                EntityState::Deleted => entry.accept(),
                EntityState::Modified => {
                    let key = entry.entity().key();
                    match store.fetch(&key).await? {
                        Some(fresh) => entry.reload(fresh),
                        None => detach.push(key.id),
                    }
                }
                EntityState::Added => detach.push(entry.entity().id()),
                EntityState::Unchanged | EntityState::Detached => {}
            }
        }

        self.tracker
            .retain(|entry| !detach.contains(&entry.entity().id()));
        Ok(())
    }
}

fn record_entry(recorders: &mut [Box<dyn ChangeRecorder>], entry: &EntityEntry) -> Result<()> {
    let entity = entry.entity();
    match entry.state() {
        EntityState::Added => {
            for recorder in recorders.iter_mut() {
                recorder.record_add(entity);
            }
        }
        EntityState::Deleted => {
            for recorder in recorders.iter_mut() {
                recorder.record_delete(entity);
            }
        }
        EntityState::Modified => {
            for descriptor in entity.descriptor().data_properties() {
                let Some(property) = entry.property(descriptor.name) else {
                    continue;
                };
                if !property.is_changed() {
                    continue;
                }
                tracing::debug!(
                    entity = %entity.key(),
                    property = property.name,
                    "recorded change"
                );
                for recorder in recorders.iter_mut() {
                    recorder.record_change(
                        entity,
                        property.name,
                        property.original.clone(),
                        property.current.clone(),
                    )?;
                }
            }
        }
        EntityState::Unchanged | EntityState::Detached => {}
    }
    Ok(())
}
