//! Change recorders
//!
//! A recorder buffers what one save adds, deletes and modifies, turns the buffer into a
//! [`ChangeSet`] when the save is about to run, and either commits or discards it
//! depending on the outcome of the primary write.
//!
//! The buffers are empty before the first `record_*` call of a save and are empty again
//! after [`ChangeRecorder::take_commit`], [`ChangeRecorder::commit`] or
//! [`ChangeRecorder::discard`].

mod commit;
mod same_store;
mod separate_store;

pub use commit::{CommitChangeSetJob, PendingCommit};
pub use same_store::SameStoreRecorder;
pub use separate_store::SeparateStoreRecorder;

use crate::codec::ValueCodec;
use crate::entity::Entity;
use crate::error::{AuditError, Result};
use crate::identity::SharedIdentity;
use crate::model::{Change, ChangeSet, EntityChange, EntityRef};
use crate::types::TypeRegistry;
use crate::value::Value;
use async_trait::async_trait;
use dbaudit_jobs::CancellationToken;
use std::sync::{Arc, Mutex};

/// What one save recorded so far
#[derive(Debug, Clone, Default)]
pub struct RecordingBuffer {
    pub additions: Vec<EntityRef>,
    pub deletions: Vec<EntityRef>,
    pub modifications: Vec<EntityChange>,
}

impl RecordingBuffer {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty()
    }

    pub fn clear(&mut self) {
        self.additions.clear();
        self.deletions.clear();
        self.modifications.clear();
    }
}

/// Capture buffer and persistence strategy for audit records
#[async_trait]
pub trait ChangeRecorder: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    fn buffer(&self) -> &RecordingBuffer;

    fn buffer_mut(&mut self) -> &mut RecordingBuffer;

    fn record_add(&mut self, entity: &dyn Entity) {
        self.buffer_mut().additions.push(EntityRef::of(entity));
    }

    fn record_delete(&mut self, entity: &dyn Entity) {
        self.buffer_mut().deletions.push(EntityRef::of(entity));
    }

    fn record_change(
        &mut self,
        entity: &dyn Entity,
        property: &str,
        original: Value,
        current: Value,
    ) -> Result<()> {
        let change = EntityChange::new(entity, property, original, current)?;
        self.buffer_mut().modifications.push(change);
        Ok(())
    }

    /// Called once per save after every entity has been recorded
    fn on_saving_changes(&mut self) -> Result<()> {
        Ok(())
    }

    /// Clear the buffers and hand out the durable write still to be done, if any.
    ///
    /// The audited context runs the returned commit on its background queue.
    fn take_commit(&mut self) -> Result<Option<PendingCommit>> {
        self.buffer_mut().clear();
        Ok(None)
    }

    /// Write the recorded changes now and clear the buffers.
    ///
    /// A no-op when nothing is recorded.
    async fn commit(&mut self, cancel: &CancellationToken) -> Result<()> {
        if let Some(pending) = self.take_commit()? {
            pending.run(cancel).await?;
        }
        Ok(())
    }

    /// Drop the recorded changes without writing them
    async fn discard(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.buffer_mut().clear();
        Ok(())
    }

    /// Recorders that need the audited context return themselves here
    fn as_has_parent_context(&mut self) -> Option<&mut dyn HasParentContext> {
        None
    }
}

/// A recorder that needs its parent context set before `on_saving_changes`
pub trait HasParentContext {
    fn set_parent_context(&mut self, parent: ParentContext);

    fn parent_context(&self) -> Option<&ParentContext>;
}

/// A ChangeSet staged for the primary write
#[derive(Debug, Clone)]
struct Staged {
    ticket: u64,
    change_set: ChangeSet,
}

#[derive(Debug, Default)]
struct Staging {
    next_ticket: u64,
    sets: Vec<Staged>,
}

/// The audited context as seen by its recorders.
///
/// Clones share the staging area, so a ChangeSet staged by a recorder is picked up by
/// the context's next primary write.
#[derive(Debug, Clone)]
pub struct ParentContext {
    identity: Option<SharedIdentity>,
    types: Arc<TypeRegistry>,
    codec: Arc<dyn ValueCodec>,
    staging: Arc<Mutex<Staging>>,
}

fn staging_poisoned<T>(_: T) -> AuditError {
    AuditError::Staging("Lock poisoned".to_string())
}

impl ParentContext {
    pub fn new(
        identity: Option<SharedIdentity>,
        types: Arc<TypeRegistry>,
        codec: Arc<dyn ValueCodec>,
    ) -> Self {
        Self {
            identity,
            types,
            codec,
            staging: Arc::new(Mutex::new(Staging::default())),
        }
    }

    pub fn identity(&self) -> Option<&SharedIdentity> {
        self.identity.as_ref()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn codec(&self) -> &dyn ValueCodec {
        self.codec.as_ref()
    }

    /// Stage a ChangeSet for the next primary write. The ticket can unstage it again.
    pub fn stage(&self, change_set: ChangeSet) -> Result<u64> {
        let mut staging = self.staging.lock().map_err(staging_poisoned)?;
        staging.next_ticket += 1;
        let ticket = staging.next_ticket;
        staging.sets.push(Staged { ticket, change_set });
        Ok(ticket)
    }

    /// Remove a staged ChangeSet. Unknown tickets are ignored.
    pub fn unstage(&self, ticket: u64) -> Result<()> {
        let mut staging = self.staging.lock().map_err(staging_poisoned)?;
        staging.sets.retain(|s| s.ticket != ticket);
        Ok(())
    }

    /// Hand every staged ChangeSet to the primary write
    pub fn take_staged(&self) -> Result<Vec<ChangeSet>> {
        let mut staging = self.staging.lock().map_err(staging_poisoned)?;
        Ok(staging.sets.drain(..).map(|s| s.change_set).collect())
    }

    pub fn staged_len(&self) -> Result<usize> {
        Ok(self.staging.lock().map_err(staging_poisoned)?.sets.len())
    }

    /// Build a ChangeSet from recorded modifications, attributed to the acting identity.
    ///
    /// Every property type must resolve through the type registry.
    pub fn build_change_set(&self, modifications: &[EntityChange]) -> Result<ChangeSet> {
        let created_by = self.identity.as_ref().map(|i| i.id().to_string());
        let mut change_set = ChangeSet::new(created_by);
        for modification in modifications {
            self.types.resolve(modification.property_type)?;
            change_set
                .changes
                .push(Change::from_entity_change(modification, self.codec.as_ref())?);
        }
        Ok(change_set)
    }
}
