//! Testing utilities for dbaudit
//!
//! # Harness
//!
//! The [`Harness`] wires an [`AuditedContext`](dbaudit_core::AuditedContext) to in-memory
//! stores and a background queue, so a test can save and then inspect the audit rows:
//!
//! ```rust,ignore
//! let harness = Harness::same_store();
//! let mut ctx = harness.context();
//! let id = ctx.add(TestEntity::new("a", 1))?;
//! ctx.save_changes().await?;
//! harness.settle().await;
//! assert!(harness.change_sets().await.is_empty());
//! ```

pub mod expectation;
pub mod fixtures;
pub mod harness;
pub mod recorder;
pub mod store;

pub use expectation::{Expectation, RecorderCall, Times};
pub use fixtures::{PlainEntity, TestEntity};
pub use harness::{AuditMode, Harness};
pub use recorder::{MockRecorder, RecorderProbe};
pub use store::FaultyStore;
