//! The acting identity changes are attributed to

use std::fmt;
use std::sync::Arc;

/// An authenticated caller
pub trait Identity: Send + Sync + fmt::Debug {
    /// Unique identifier, stored as `CreatedBy` / `LastModifiedBy`
    fn id(&self) -> &str;

    /// Display name
    fn name(&self) -> &str;
}

/// Shared handle to an identity
pub type SharedIdentity = Arc<dyn Identity>;

/// A fixed identity, for services acting on their own behalf and for tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity {
    id: String,
    name: String,
}

impl StaticIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn shared(self) -> SharedIdentity {
        Arc::new(self)
    }
}

impl Identity for StaticIdentity {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}
