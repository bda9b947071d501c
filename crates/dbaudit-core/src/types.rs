//! Stable type keys for persisted values
//!
//! A Change row stores the type of its property as a string key. The key is resolved
//! through a [`TypeRegistry`] when the serialized values are read back, never through
//! runtime type names.

use crate::error::{AuditError, Result};
use crate::value::ValueKind;
use std::collections::HashMap;

/// A registered type key and the value shape it decodes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub key: String,
    pub kind: ValueKind,
}

impl TypeDescriptor {
    pub fn new(key: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }
}

/// Registry of type keys
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
}

const BUILTINS: [ValueKind; 8] = [
    ValueKind::Bool,
    ValueKind::Int32,
    ValueKind::Int64,
    ValueKind::Float,
    ValueKind::Text,
    ValueKind::Uuid,
    ValueKind::Timestamp,
    ValueKind::Json,
];

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// A registry holding the built-in keys
    pub fn new() -> Self {
        let types = BUILTINS
            .iter()
            .map(|kind| {
                let key = kind.as_str().to_string();
                (key.clone(), TypeDescriptor { key, kind: *kind })
            })
            .collect();
        Self { types }
    }

    /// Register an application key. Re-registering a key replaces it.
    pub fn register(mut self, key: impl Into<String>, kind: ValueKind) -> Self {
        let descriptor = TypeDescriptor::new(key, kind);
        self.types.insert(descriptor.key.clone(), descriptor);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.types.contains_key(key)
    }

    pub fn resolve(&self, key: &str) -> Result<&TypeDescriptor> {
        self.types
            .get(key)
            .ok_or_else(|| AuditError::UnknownType(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.len(), 8);
        assert_eq!(registry.resolve("string").unwrap().kind, ValueKind::Text);
        assert_eq!(registry.resolve("i32").unwrap().kind, ValueKind::Int32);
    }

    #[test]
    fn test_unknown_key() {
        let registry = TypeRegistry::new();
        let err = registry.resolve("money").unwrap_err();
        assert!(matches!(err, AuditError::UnknownType(key) if key == "money"));
    }

    #[test]
    fn test_register_custom_key() {
        let registry = TypeRegistry::new().register("order_status", ValueKind::Text);
        assert!(registry.contains("order_status"));
        assert_eq!(
            registry.resolve("order_status").unwrap(),
            &TypeDescriptor::new("order_status", ValueKind::Text)
        );
    }
}
