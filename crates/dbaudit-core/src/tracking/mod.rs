//! Change tracking
//!
//! A [`ChangeTracker`] holds the entities of one unit of work in insertion order,
//! together with the state each one will be saved in.

mod entry;

pub use entry::{EntityEntry, EntityState, PropertyEntry};

use crate::entity::Entity;
use crate::error::{AuditError, Result, StoreError};
use uuid::Uuid;

/// Tracked entities of one unit of work
#[derive(Debug)]
pub struct ChangeTracker {
    entries: Vec<EntityEntry>,
    auto_detect_changes: bool,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            auto_detect_changes: true,
        }
    }

    pub fn auto_detect_changes(&self) -> bool {
        self.auto_detect_changes
    }

    pub fn set_auto_detect_changes(&mut self, enabled: bool) {
        self.auto_detect_changes = enabled;
    }

    /// Track a new entity. A nil id is replaced with a generated one.
    pub fn add(&mut self, mut entity: Box<dyn Entity>) -> Result<Uuid> {
        if entity.id().is_nil() {
            entity.set_id(Uuid::new_v4());
        }
        self.track(entity, EntityState::Added)
    }

    /// Track an entity that already exists in the store
    pub fn attach(&mut self, entity: Box<dyn Entity>) -> Result<Uuid> {
        self.track(entity, EntityState::Unchanged)
    }

    fn track(&mut self, entity: Box<dyn Entity>, state: EntityState) -> Result<Uuid> {
        let id = entity.id();
        if self.find(id).is_some() {
            return Err(AuditError::Store(StoreError::UpdateConflict(format!(
                "{} is already tracked",
                entity.key()
            ))));
        }
        tracing::trace!(entity = %entity.key(), %state, "tracking entity");
        self.entries.push(EntityEntry::new(entity, state));
        Ok(id)
    }

    /// Mark an entity for deletion. An entity added in this unit of work is detached instead.
    ///
    /// Returns false if the entity is not tracked.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        if self.entries[index].state() == EntityState::Added {
            self.entries.remove(index);
        } else {
            self.entries[index].set_state(EntityState::Deleted);
        }
        true
    }

    /// Stop tracking an entity and hand it back
    pub fn detach(&mut self, id: Uuid) -> Option<Box<dyn Entity>> {
        let index = self.position(id)?;
        Some(self.entries.remove(index).into_entity())
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.entries.iter().position(|e| e.entity().id() == id)
    }

    pub fn find(&self, id: Uuid) -> Option<&EntityEntry> {
        self.entries.iter().find(|e| e.entity().id() == id)
    }

    pub fn find_mut(&mut self, id: Uuid) -> Option<&mut EntityEntry> {
        self.entries.iter_mut().find(|e| e.entity().id() == id)
    }

    pub fn state_of(&self, id: Uuid) -> EntityState {
        self.find(id)
            .map_or(EntityState::Detached, EntityEntry::state)
    }

    pub fn entries(&self) -> impl Iterator<Item = &EntityEntry> {
        self.entries.iter()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut EntityEntry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compare every tracked entity with its snapshot
    pub fn detect_changes(&mut self) {
        let found = self
            .entries
            .iter_mut()
            .fold(0usize, |n, entry| n + usize::from(entry.detect_changes()));
        if found > 0 {
            tracing::trace!(entities = found, "detected changes");
        }
    }

    /// Whether a save would write anything
    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(|e| {
            matches!(
                e.state(),
                EntityState::Added | EntityState::Modified | EntityState::Deleted
            )
        })
    }

    /// After a successful save: deleted entries leave, added and modified ones become
    /// unchanged. Unchanged entries keep their snapshot so edits not yet detected are
    /// still found by the next `detect_changes`.
    pub fn accept_all_changes(&mut self) {
        self.entries
            .retain(|e| !matches!(e.state(), EntityState::Deleted | EntityState::Detached));
        for entry in &mut self.entries {
            if matches!(entry.state(), EntityState::Added | EntityState::Modified) {
                entry.accept();
            }
        }
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&EntityEntry) -> bool) {
        self.entries.retain(keep);
    }
}
