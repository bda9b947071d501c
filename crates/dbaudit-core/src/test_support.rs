//! Entities shared by the unit tests of this crate

use crate::entity::{
    set_stamp_value, stamp_value, AuditStamps, AuditedEntity, Entity, EntityDescriptor,
    PropertyDescriptor,
};
use crate::error::{AuditError, Result};
use crate::value::Value;
use std::any::Any;
use uuid::Uuid;

static NOTE_PROPERTIES: [PropertyDescriptor; 8] = [
    PropertyDescriptor::key("Id"),
    PropertyDescriptor::data("Title", "string"),
    PropertyDescriptor::data("Stars", "i32"),
    PropertyDescriptor::data("Rating", "f64"),
    PropertyDescriptor::stamp("Created", "datetime"),
    PropertyDescriptor::stamp("CreatedBy", "string"),
    PropertyDescriptor::stamp("LastModified", "datetime"),
    PropertyDescriptor::stamp("LastModifiedBy", "string"),
];

static NOTE: EntityDescriptor = EntityDescriptor {
    name: "note",
    properties: &NOTE_PROPERTIES,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Note {
    pub id: Uuid,
    pub title: Option<String>,
    pub stars: i32,
    pub rating: f64,
    pub stamps: AuditStamps,
}

impl Note {
    pub fn new(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }
}

impl Entity for Note {
    fn type_descriptor() -> &'static EntityDescriptor {
        &NOTE
    }

    fn descriptor(&self) -> &'static EntityDescriptor {
        &NOTE
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
            "Title" => Some(self.title.clone().into()),
            "Stars" => Some(self.stars.into()),
            "Rating" => Some(self.rating.into()),
            other => stamp_value(&self.stamps, other),
        }
    }

    fn set_value(&mut self, property: &str, value: Value) -> Result<()> {
        match (property, value) {
            ("Id", Value::Uuid(id)) => self.id = id,
            ("Title", Value::Null) => self.title = None,
            ("Title", Value::Text(s)) => self.title = Some(s),
            ("Stars", Value::Int(n)) => {
                self.stars = i32::try_from(n).map_err(|_| AuditError::PropertyType {
                    property: "Stars".to_string(),
                    expected: "i32".to_string(),
                    actual: n.to_string(),
                })?
            }
            ("Rating", Value::Float(x)) => self.rating = x,
            (other, value) => {
                let actual = value.type_name();
                if !set_stamp_value(&mut self.stamps, other, value)? {
                    return Err(AuditError::PropertyType {
                        property: other.to_string(),
                        expected: NOTE
                            .require(other)?
                            .type_key
                            .to_string(),
                        actual: actual.to_string(),
                    });
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

impl AuditedEntity for Note {
    fn stamps(&self) -> &AuditStamps {
        &self.stamps
    }

    fn stamps_mut(&mut self) -> &mut AuditStamps {
        &mut self.stamps
    }
}
