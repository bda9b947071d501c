//! # dbaudit
//!
//! Audit trails for persistence contexts.
//!
//! An [`AuditedContext`] tracks entities like a unit of work. When it saves, every
//! property that actually changed is captured as a [`Change`], grouped into one
//! [`ChangeSet`] per save and attributed to the acting identity. Audited entities get
//! their `Created` / `LastModified` stamps on the way.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dbaudit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     dbaudit::telemetry::init_tracing();
//!
//!     let runtime = AuditRuntime::from_env()?;
//!     let store = MemoryStore::new();
//!
//!     let mut ctx = runtime
//!         .builder(Arc::new(store.clone()))
//!         .identity(StaticIdentity::new("u-42", "Alice"))
//!         .same_store_auditing()
//!         .build();
//!
//!     let id = ctx.add(Invoice::new(120))?;
//!     ctx.save_changes().await?;
//!
//!     ctx.get_mut::<Invoice>(id).unwrap().amount = 150;
//!     ctx.save_changes().await?;
//!
//!     let history = (&store as &dyn AuditStore).history().entity(id).execute().await?;
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Recorders
//!
//! - [`SameStoreRecorder`] writes the ChangeSet in the same write as the data. Both are
//!   saved or neither is.
//! - [`SeparateStoreRecorder`] writes the ChangeSet to its own [`AuditStore`] on the
//!   background queue once the data is saved. A failed audit write never fails the save.
//!
//! ## Optional Features
//!
//! - `sqlite` - `SqliteAuditStore`, an [`AuditStore`] over SQLite using `sqlx`
//!
//! ```toml
//! [dependencies]
//! dbaudit = { version = "0.1", features = ["sqlite"] }
//! ```

pub mod runtime;
pub mod telemetry;

// Re-export core functionality
pub use dbaudit_core::*;

pub use runtime::AuditRuntime;

/// Background queue types
pub mod jobs {
    pub use dbaudit_jobs::*;
}

pub use dbaudit_jobs::CancellationToken;

// Re-export commonly used crates
pub use tokio;
pub use tracing;

/// Prelude module - import everything you need with `use dbaudit::prelude::*`
pub mod prelude {
    pub use dbaudit_core::{
        // Errors
        AuditError,
        // Store traits
        AuditStore,
        // Entities
        AuditStamps,
        AuditedContext,
        AuditedContextBuilder,
        AuditedEntity,
        Change,
        ChangeQuery,
        // Recorders
        ChangeRecorder,
        ChangeSet,
        DataStore,
        Entity,
        EntityDescriptor,
        EntityState,
        Identity,
        MemoryStore,
        PropertyDescriptor,
        Result,
        SameStoreRecorder,
        SaveState,
        SeparateStoreRecorder,
        StaticIdentity,
        StoreError,
        Value,
    };

    pub use crate::runtime::AuditRuntime;
    pub use dbaudit_core::AuditConfig;
    pub use dbaudit_jobs::CancellationToken;

    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_imports_work() {
        // This test ensures prelude exports compile correctly
        let _: fn() -> Result<()> = || Ok(());
        let _ = CancellationToken::new();
        let _ = MemoryStore::new();
    }
}
