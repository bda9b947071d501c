//! Audit records
//!
//! [`EntityChange`] is the transient diff a recorder buffers during a save.
//! [`ChangeSet`] and [`Change`] are the durable rows written to an audit store.

use crate::codec::ValueCodec;
use crate::entity::{now, Entity};
use crate::error::Result;
use crate::types::TypeRegistry;
use crate::value::Value;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reference to a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub id: Uuid,
    pub entity_type: &'static str,
}

impl EntityRef {
    pub fn of(entity: &dyn Entity) -> Self {
        Self {
            id: entity.id(),
            entity_type: entity.descriptor().name,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity_type, self.id)
    }
}

/// One property mutation detected during a save
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange {
    pub entity: EntityRef,
    pub property: &'static str,
    /// Type key of the property, taken from the entity descriptor
    pub property_type: &'static str,
    pub original: Value,
    pub current: Value,
}

impl EntityChange {
    pub fn new(entity: &dyn Entity, property: &str, original: Value, current: Value) -> Result<Self> {
        let descriptor = entity.descriptor().require(property)?;
        Ok(Self {
            entity: EntityRef::of(entity),
            property: descriptor.name,
            property_type: descriptor.type_key,
            original,
            current,
        })
    }
}

/// All changes captured in one save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeSet {
    /// Assigned by the audit store on insert, 0 before that
    pub id: i64,
    pub created: DateTime<FixedOffset>,
    pub created_by: Option<String>,
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(created_by: Option<String>) -> Self {
        Self {
            id: 0,
            created: now(),
            created_by,
            changes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Set the ChangeSet id and give every Change an id and its owner
    pub fn assign_ids(&mut self, id: i64) {
        self.id = id;
        for change in &mut self.changes {
            if change.id.is_nil() {
                change.id = Uuid::new_v4();
            }
            change.change_set_id = id;
        }
    }
}

/// One property's before and after value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Change {
    pub id: Uuid,
    pub change_set_id: i64,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub name: String,
    /// Type key resolvable through a [`TypeRegistry`]
    #[serde(rename = "Type")]
    pub property_type: String,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
}

impl Change {
    /// Build the durable row for a diff, serializing both values
    pub fn from_entity_change(change: &EntityChange, codec: &dyn ValueCodec) -> Result<Self> {
        Ok(Self {
            id: Uuid::nil(),
            change_set_id: 0,
            entity_id: change.entity.id,
            entity_type: change.entity.entity_type.to_string(),
            name: change.property.to_string(),
            property_type: change.property_type.to_string(),
            previous_value: Some(codec.serialize(&change.original)?),
            new_value: Some(codec.serialize(&change.current)?),
        })
    }

    /// Decode the previous value through the recorded type
    pub fn previous(&self, registry: &TypeRegistry, codec: &dyn ValueCodec) -> Result<Value> {
        self.decode(self.previous_value.as_deref(), registry, codec)
    }

    /// Decode the new value through the recorded type
    pub fn current(&self, registry: &TypeRegistry, codec: &dyn ValueCodec) -> Result<Value> {
        self.decode(self.new_value.as_deref(), registry, codec)
    }

    fn decode(
        &self,
        text: Option<&str>,
        registry: &TypeRegistry,
        codec: &dyn ValueCodec,
    ) -> Result<Value> {
        let ty = registry.resolve(&self.property_type)?;
        match text {
            Some(text) => codec.deserialize(text, ty),
            None => Ok(Value::Null),
        }
    }
}
