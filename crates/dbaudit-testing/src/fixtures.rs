//! Reference entities
//!
//! [`TestEntity`] is audited and carries two business properties of different types.
//! [`PlainEntity`] has no audit stamps, so the context neither stamps nor records it.

use dbaudit_core::entity::{set_stamp_value, stamp_value};
use dbaudit_core::{
    AuditError, AuditStamps, AuditedEntity, Entity, EntityDescriptor, PropertyDescriptor,
    Result, Value,
};
use std::any::Any;
use uuid::Uuid;

static TEST_ENTITY_PROPERTIES: [PropertyDescriptor; 7] = [
    PropertyDescriptor::key("Id"),
    PropertyDescriptor::data("Value1", "string"),
    PropertyDescriptor::data("Value2", "i32"),
    PropertyDescriptor::stamp("Created", "datetime"),
    PropertyDescriptor::stamp("CreatedBy", "string"),
    PropertyDescriptor::stamp("LastModified", "datetime"),
    PropertyDescriptor::stamp("LastModifiedBy", "string"),
];

static TEST_ENTITY: EntityDescriptor = EntityDescriptor {
    name: "test_entity",
    properties: &TEST_ENTITY_PROPERTIES,
};

static PLAIN_ENTITY_PROPERTIES: [PropertyDescriptor; 2] = [
    PropertyDescriptor::key("Id"),
    PropertyDescriptor::data("Name", "string"),
];

static PLAIN_ENTITY: EntityDescriptor = EntityDescriptor {
    name: "plain_entity",
    properties: &PLAIN_ENTITY_PROPERTIES,
};

fn mismatch(descriptor: &EntityDescriptor, property: &str, actual: &Value) -> AuditError {
    match descriptor.require(property) {
        Ok(p) => AuditError::PropertyType {
            property: property.to_string(),
            expected: p.type_key.to_string(),
            actual: actual.type_name().to_string(),
        },
        Err(e) => e,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestEntity {
    pub id: Uuid,
    pub value1: Option<String>,
    pub value2: i32,
    pub stamps: AuditStamps,
}

impl TestEntity {
    pub fn new(value1: impl Into<String>, value2: i32) -> Self {
        Self {
            value1: Some(value1.into()),
            value2,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}

impl Entity for TestEntity {
    fn type_descriptor() -> &'static EntityDescriptor {
        &TEST_ENTITY
    }

    fn descriptor(&self) -> &'static EntityDescriptor {
        &TEST_ENTITY
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn get_value(&self, property: &str) -> Option<Value> {
        match property {
            "Id" => Some(Value::Uuid(self.id)),
            "Value1" => Some(self.value1.clone().into()),
            "Value2" => Some(self.value2.into()),
            other => stamp_value(&self.stamps, other),
        }
    }

    fn set_value(&mut self, property: &str, value: Value) -> Result<()> {
        match (property, value) {
            ("Id", Value::Uuid(id)) => self.id = id,
            ("Value1", Value::Null) => self.value1 = None,
            ("Value1", Value::Text(s)) => self.value1 = Some(s),
            ("Value2", Value::Int(n)) => {
                self.value2 = i32::try_from(n)
                    .map_err(|_| mismatch(&TEST_ENTITY, "Value2", &Value::Int(n)))?;
            }
            (other, value) => {
                let rejected = mismatch(&TEST_ENTITY, other, &value);
                if !set_stamp_value(&mut self.stamps, other, value)? {
                    return Err(rejected);
                }
            }
        }
        Ok(())
    }

    fn as_audited(&self) -> Option<&dyn AuditedEntity> {
        Some(self)
    }

    fn as_audited_mut(&mut self) -> Option<&mut dyn AuditedEntity> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl AuditedEntity for TestEntity {
    fn stamps(&self) -> &AuditStamps {
        &self.stamps
    }

    fn stamps_mut(&mut self) -> &mut AuditStamps {
        &mut self.stamps
    }
}

/// An entity without audit stamps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlainEntity {
    pub id: Uuid,
    pub name: String,
}

impl PlainEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.into(),
        }
    }
}

impl Entity for PlainEntity {
    fn type_descriptor() -> &'static EntityDescriptor {
        &PLAIN_ENTITY
    }

    fn descriptor(&self) -> &'static EntityDescriptor {
        &PLAIN_ENTITY
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn get_value(&self, property: &str) -> Option<Value> {
        match property {
            "Id" => Some(Value::Uuid(self.id)),
            "Name" => Some(Value::Text(self.name.clone())),
            _ => None,
        }
    }

    fn set_value(&mut self, property: &str, value: Value) -> Result<()> {
        match (property, value) {
            ("Id", Value::Uuid(id)) => self.id = id,
            ("Name", Value::Text(s)) => self.name = s,
            (other, value) => return Err(mismatch(&PLAIN_ENTITY, other, &value)),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
