use super::{ChangeRecorder, HasParentContext, ParentContext, PendingCommit, RecordingBuffer};
use crate::error::{AuditError, Result};
use crate::model::ChangeSet;
use crate::store::AuditStore;
use async_trait::async_trait;
use dbaudit_jobs::CancellationToken;
use std::fmt;
use std::sync::Arc;

/// Writes the ChangeSet to its own audit store after the primary write succeeded.
///
/// The audit rows are eventually consistent with the data: a failed commit leaves the
/// data saved and the ChangeSet missing.
pub struct SeparateStoreRecorder {
    buffer: RecordingBuffer,
    store: Arc<dyn AuditStore>,
    parent: Option<ParentContext>,
    change_set: Option<ChangeSet>,
}

impl fmt::Debug for SeparateStoreRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeparateStoreRecorder")
            .field("buffer", &self.buffer)
            .field("change_set", &self.change_set)
            .finish_non_exhaustive()
    }
}

impl SeparateStoreRecorder {
    pub const NAME: &'static str = "separate_store";

    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            buffer: RecordingBuffer::default(),
            store,
            parent: None,
            change_set: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// The ChangeSet prepared for the current save
    pub fn prepared(&self) -> Option<&ChangeSet> {
        self.change_set.as_ref()
    }
}

impl HasParentContext for SeparateStoreRecorder {
    fn set_parent_context(&mut self, parent: ParentContext) {
        self.parent = Some(parent);
    }

    fn parent_context(&self) -> Option<&ParentContext> {
        self.parent.as_ref()
    }
}

#[async_trait]
impl ChangeRecorder for SeparateStoreRecorder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn buffer(&self) -> &RecordingBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut RecordingBuffer {
        &mut self.buffer
    }

    fn on_saving_changes(&mut self) -> Result<()> {
        let parent = self
            .parent
            .as_ref()
            .ok_or(AuditError::MissingParentContext(Self::NAME))?;
        let change_set = parent.build_change_set(&self.buffer.modifications)?;

        if change_set.is_empty() {
            self.change_set = None;
        } else {
            tracing::debug!(
                recorder = Self::NAME,
                changes = change_set.len(),
                "prepared change set"
            );
            self.change_set = Some(change_set);
        }
        Ok(())
    }

    fn take_commit(&mut self) -> Result<Option<PendingCommit>> {
        self.buffer.clear();
        Ok(self
            .change_set
            .take()
            .map(|set| PendingCommit::new(Self::NAME, set, self.store.clone())))
    }

    async fn discard(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.buffer.clear();
        if self.change_set.take().is_some() {
            tracing::debug!(recorder = Self::NAME, "discarded prepared change set");
        }
        Ok(())
    }

    fn as_has_parent_context(&mut self) -> Option<&mut dyn HasParentContext> {
        Some(self)
    }
}
