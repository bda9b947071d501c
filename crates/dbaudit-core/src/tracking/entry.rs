use crate::entity::{Entity, PropertyRole};
use crate::error::Result;
use crate::value::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Lifecycle state of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// New, inserted on the next save
    Added,
    /// Changed since it was read, updated on the next save
    Modified,
    /// Removed, deleted on the next save
    Deleted,
    Unchanged,
    /// No longer tracked
    Detached,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityState::Added => "added",
            EntityState::Modified => "modified",
            EntityState::Deleted => "deleted",
            EntityState::Unchanged => "unchanged",
            EntityState::Detached => "detached",
        };
        f.write_str(name)
    }
}

/// Original and current value of one property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    pub name: &'static str,
    pub original: Value,
    pub current: Value,
    /// Flagged by the tracker. The values may still be equal.
    pub is_modified: bool,
}

impl PropertyEntry {
    /// Flagged modified and actually different
    pub fn is_changed(&self) -> bool {
        self.is_modified && !self.original.same_as(&self.current)
    }
}

/// A tracked entity with its original-value snapshot
#[derive(Debug)]
pub struct EntityEntry {
    entity: Box<dyn Entity>,
    state: EntityState,
    original: HashMap<&'static str, Value>,
    modified: BTreeSet<&'static str>,
}

fn snapshot(entity: &dyn Entity) -> HashMap<&'static str, Value> {
    entity
        .descriptor()
        .properties
        .iter()
        .map(|p| (p.name, entity.get_value(p.name).unwrap_or(Value::Null)))
        .collect()
}

impl EntityEntry {
    pub(crate) fn new(entity: Box<dyn Entity>, state: EntityState) -> Self {
        let original = snapshot(entity.as_ref());
        Self {
            entity,
            state,
            original,
            modified: BTreeSet::new(),
        }
    }

    pub fn entity(&self) -> &dyn Entity {
        self.entity.as_ref()
    }

    /// Direct access to the entity. Changes made this way are found by change detection.
    pub fn entity_mut(&mut self) -> &mut dyn Entity {
        self.entity.as_mut()
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: EntityState) {
        self.state = state;
    }

    pub fn original_value(&self, property: &str) -> Option<&Value> {
        self.original.get(property)
    }

    pub fn current_value(&self, property: &str) -> Option<Value> {
        self.entity.get_value(property)
    }

    pub fn is_modified(&self, property: &str) -> bool {
        self.modified.contains(property)
    }

    pub fn property(&self, property: &str) -> Option<PropertyEntry> {
        let descriptor = self.entity.descriptor().property(property)?;
        Some(PropertyEntry {
            name: descriptor.name,
            original: self.original.get(descriptor.name).cloned().unwrap_or(Value::Null),
            current: self.entity.get_value(descriptor.name).unwrap_or(Value::Null),
            is_modified: self.modified.contains(descriptor.name),
        })
    }

    /// Every property, in declaration order
    pub fn properties(&self) -> impl Iterator<Item = PropertyEntry> + '_ {
        self.entity
            .descriptor()
            .properties
            .iter()
            .filter_map(|p| self.property(p.name))
    }

    /// Assign a property through the tracker.
    ///
    /// The property is flagged modified even when the new value equals the old one.
    pub fn set_current_value(&mut self, property: &str, value: Value) -> Result<()> {
        let descriptor = self.entity.descriptor().require(property)?;
        self.entity.set_value(descriptor.name, value)?;
        self.flag(descriptor.name);
        Ok(())
    }

    pub fn set_property_modified(&mut self, property: &str, modified: bool) -> Result<()> {
        let descriptor = self.entity.descriptor().require(property)?;
        if modified {
            self.flag(descriptor.name);
        } else {
            self.modified.remove(descriptor.name);
        }
        Ok(())
    }

    fn flag(&mut self, name: &'static str) {
        self.modified.insert(name);
        if self.state == EntityState::Unchanged {
            self.state = EntityState::Modified;
        }
    }

    /// Compare the entity with its snapshot and flag differing properties.
    ///
    /// Returns true if a property was newly flagged.
    pub fn detect_changes(&mut self) -> bool {
        if !matches!(self.state, EntityState::Unchanged | EntityState::Modified) {
            return false;
        }

        let descriptor = self.entity.descriptor();
        let mut found = false;
        for property in descriptor.properties {
            if property.role == PropertyRole::Key || self.modified.contains(property.name) {
                continue;
            }
            let current = self.entity.get_value(property.name).unwrap_or(Value::Null);
            let original = self.original.get(property.name).unwrap_or(&Value::Null);
            if !current.same_as(original) {
                self.flag(property.name);
                found = true;
            }
        }
        found
    }

    /// Make the current values the new originals
    pub(crate) fn accept(&mut self) {
        self.original = snapshot(self.entity.as_ref());
        self.modified.clear();
        self.state = EntityState::Unchanged;
    }

    /// Replace the entity with a freshly loaded copy
    pub(crate) fn reload(&mut self, fresh: Box<dyn Entity>) {
        self.entity = fresh;
        self.accept();
    }

    pub(crate) fn into_entity(self) -> Box<dyn Entity> {
        self.entity
    }
}
