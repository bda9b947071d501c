//! Entity capabilities
//!
//! The pipeline works on `dyn Entity`. An entity describes its properties through a static
//! [`EntityDescriptor`] and exposes them as [`Value`]s. Entities that carry audit stamps
//! opt in by returning themselves from [`Entity::as_audited`] /
//! [`Entity::as_audited_mut`].

use crate::error::{AuditError, Result};
use crate::value::Value;
use chrono::{DateTime, FixedOffset, Utc};
use std::any::Any;
use std::fmt;
use uuid::Uuid;

/// What a property is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyRole {
    /// The primary key
    Key,
    /// A business value. Only these are diffed.
    Data,
    /// One of the created / modified stamps
    AuditStamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    /// Key in the [`TypeRegistry`](crate::types::TypeRegistry)
    pub type_key: &'static str,
    pub role: PropertyRole,
}

impl PropertyDescriptor {
    pub const fn key(name: &'static str) -> Self {
        Self {
            name,
            type_key: "uuid",
            role: PropertyRole::Key,
        }
    }

    pub const fn data(name: &'static str, type_key: &'static str) -> Self {
        Self {
            name,
            type_key,
            role: PropertyRole::Data,
        }
    }

    pub const fn stamp(name: &'static str, type_key: &'static str) -> Self {
        Self {
            name,
            type_key,
            role: PropertyRole::AuditStamp,
        }
    }
}

/// The shape of an entity type
#[derive(Debug)]
pub struct EntityDescriptor {
    /// Stable type key, stored as `EntityType`
    pub name: &'static str,
    pub properties: &'static [PropertyDescriptor],
}

impl EntityDescriptor {
    pub fn property(&self, name: &str) -> Option<&'static PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Properties that are diffed, in declaration order
    pub fn data_properties(&self) -> impl Iterator<Item = &'static PropertyDescriptor> {
        self.properties
            .iter()
            .filter(|p| p.role == PropertyRole::Data)
    }

    /// Look up a property or fail with [`AuditError::UnknownProperty`]
    pub fn require(&self, name: &str) -> Result<&'static PropertyDescriptor> {
        self.property(name)
            .ok_or_else(|| AuditError::UnknownProperty {
                entity_type: self.name.to_string(),
                property: name.to_string(),
            })
    }
}

/// Identifies a row across entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub entity_type: &'static str,
    pub id: Uuid,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity_type, self.id)
    }
}

/// A persistable, trackable object
pub trait Entity: Any + Send + Sync + fmt::Debug + EntityClone {
    /// Descriptor of the implementing type, for lookups made before an instance exists
    fn type_descriptor() -> &'static EntityDescriptor
    where
        Self: Sized;

    fn descriptor(&self) -> &'static EntityDescriptor;

    fn id(&self) -> Uuid;

    fn set_id(&mut self, id: Uuid);

    /// Current value of a property, `None` if the property does not exist
    fn get_value(&self, property: &str) -> Option<Value>;

    fn set_value(&mut self, property: &str, value: Value) -> Result<()>;

    fn as_audited(&self) -> Option<&dyn AuditedEntity> {
        None
    }

    fn as_audited_mut(&mut self) -> Option<&mut dyn AuditedEntity> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn key(&self) -> EntityKey {
        EntityKey {
            entity_type: self.descriptor().name,
            id: self.id(),
        }
    }
}

/// Cloning into a box, implemented for every `Entity + Clone`
pub trait EntityClone {
    fn clone_entity(&self) -> Box<dyn Entity>;
}

impl<T: Entity + Clone> EntityClone for T {
    fn clone_entity(&self) -> Box<dyn Entity> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Entity> {
    fn clone(&self) -> Self {
        (**self).clone_entity()
    }
}

impl dyn Entity {
    pub fn downcast_ref<T: Entity>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: Entity>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }

    pub fn is_audited(&self) -> bool {
        self.as_audited().is_some()
    }
}

/// Created / modified stamps carried by an audited entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditStamps {
    pub created: Option<DateTime<FixedOffset>>,
    pub created_by: Option<String>,
    pub last_modified: Option<DateTime<FixedOffset>>,
    pub last_modified_by: Option<String>,
}

/// An entity whose creation and last modification are stamped on save
pub trait AuditedEntity {
    fn stamps(&self) -> &AuditStamps;

    fn stamps_mut(&mut self) -> &mut AuditStamps;

    fn created(&self) -> Option<DateTime<FixedOffset>> {
        self.stamps().created
    }

    fn created_by(&self) -> Option<&str> {
        self.stamps().created_by.as_deref()
    }

    fn last_modified(&self) -> Option<DateTime<FixedOffset>> {
        self.stamps().last_modified
    }

    fn last_modified_by(&self) -> Option<&str> {
        self.stamps().last_modified_by.as_deref()
    }

    fn set_created(&mut self, at: DateTime<FixedOffset>, by: Option<String>) {
        let stamps = self.stamps_mut();
        stamps.created = Some(at);
        stamps.created_by = by;
    }

    fn set_last_modified(&mut self, at: DateTime<FixedOffset>, by: Option<String>) {
        let stamps = self.stamps_mut();
        stamps.last_modified = Some(at);
        stamps.last_modified_by = by;
    }
}

/// Current time with its offset
pub fn now() -> DateTime<FixedOffset> {
    Utc::now().into()
}

/// Stamp values exposed as properties, for entities that map their stamps like columns
pub fn stamp_value(stamps: &AuditStamps, property: &str) -> Option<Value> {
    match property {
        "Created" => Some(stamps.created.into()),
        "CreatedBy" => Some(stamps.created_by.clone().into()),
        "LastModified" => Some(stamps.last_modified.into()),
        "LastModifiedBy" => Some(stamps.last_modified_by.clone().into()),
        _ => None,
    }
}

/// Assign a stamp column from a value. Returns `Ok(false)` if `property` is not a stamp.
pub fn set_stamp_value(stamps: &mut AuditStamps, property: &str, value: Value) -> Result<bool> {
    let mismatch = |expected: &str, value: &Value| AuditError::PropertyType {
        property: property.to_string(),
        expected: expected.to_string(),
        actual: value.type_name().to_string(),
    };

    match property {
        "Created" | "LastModified" => {
            let at = match value {
                Value::Null => None,
                Value::Timestamp(ts) => Some(ts),
                other => return Err(mismatch("datetime", &other)),
            };
            if property == "Created" {
                stamps.created = at;
            } else {
                stamps.last_modified = at;
            }
        }
        "CreatedBy" | "LastModifiedBy" => {
            let by = match value {
                Value::Null => None,
                Value::Text(s) => Some(s),
                other => return Err(mismatch("string", &other)),
            };
            if property == "CreatedBy" {
                stamps.created_by = by;
            } else {
                stamps.last_modified_by = by;
            }
        }
        _ => return Ok(false),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    static PROPERTIES: [PropertyDescriptor; 3] = [
        PropertyDescriptor::key("Id"),
        PropertyDescriptor::data("Name", "string"),
        PropertyDescriptor::stamp("Created", "datetime"),
    ];

    static DESCRIPTOR: EntityDescriptor = EntityDescriptor {
        name: "widget",
        properties: &PROPERTIES,
    };

    #[test]
    fn test_only_data_properties_are_diffed() {
        let names: Vec<_> = DESCRIPTOR.data_properties().map(|p| p.name).collect();
        assert_eq!(names, vec!["Name"]);
    }

    #[test]
    fn test_require_unknown_property() {
        let err = DESCRIPTOR.require("Colour").unwrap_err();
        assert!(matches!(
            err,
            AuditError::UnknownProperty { entity_type, property }
                if entity_type == "widget" && property == "Colour"
        ));
    }

    #[test]
    fn test_stamp_columns() {
        let mut stamps = AuditStamps::default();
        let at = now();
        assert!(set_stamp_value(&mut stamps, "Created", Value::Timestamp(at)).unwrap());
        assert!(set_stamp_value(&mut stamps, "CreatedBy", Value::from("alice")).unwrap());
        assert!(!set_stamp_value(&mut stamps, "Name", Value::Null).unwrap());

        assert_eq!(stamp_value(&stamps, "Created"), Some(Value::Timestamp(at)));
        assert_eq!(stamp_value(&stamps, "LastModifiedBy"), Some(Value::Null));
        assert!(set_stamp_value(&mut stamps, "CreatedBy", Value::Int(1)).is_err());
    }
}
