use super::{ChangeRecorder, HasParentContext, ParentContext, PendingCommit, RecordingBuffer};
use crate::error::{AuditError, Result};
use async_trait::async_trait;
use dbaudit_jobs::CancellationToken;

/// Writes the ChangeSet together with the audited data.
///
/// The ChangeSet is staged into the parent context before the primary write, so it
/// lands in the same transaction. Committing afterwards has nothing left to do.
#[derive(Debug, Default)]
pub struct SameStoreRecorder {
    buffer: RecordingBuffer,
    parent: Option<ParentContext>,
    staged: Option<u64>,
}

impl SameStoreRecorder {
    pub const NAME: &'static str = "same_store";

    pub fn new() -> Self {
        Self::default()
    }

    fn parent(&self) -> Result<&ParentContext> {
        self.parent
            .as_ref()
            .ok_or(AuditError::MissingParentContext(Self::NAME))
    }
}

impl HasParentContext for SameStoreRecorder {
    fn set_parent_context(&mut self, parent: ParentContext) {
        self.parent = Some(parent);
    }

    fn parent_context(&self) -> Option<&ParentContext> {
        self.parent.as_ref()
    }
}

#[async_trait]
impl ChangeRecorder for SameStoreRecorder {
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
        let parent = self.parent()?;
        let change_set = parent.build_change_set(&self.buffer.modifications)?;
        if change_set.is_empty() {
            tracing::trace!(recorder = Self::NAME, "no changes to stage");
            return Ok(());
        }

        let changes = change_set.len();
        let ticket = parent.stage(change_set)?;
        tracing::debug!(recorder = Self::NAME, changes, "staged change set");
        self.staged = Some(ticket);
        Ok(())
    }

    fn take_commit(&mut self) -> Result<Option<PendingCommit>> {
        self.buffer.clear();
        self.staged = None;
        Ok(None)
    }

    async fn discard(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.buffer.clear();
        if let Some(ticket) = self.staged.take() {
            self.parent()?.unstage(ticket)?;
        }
        Ok(())
    }

    fn as_has_parent_context(&mut self) -> Option<&mut dyn HasParentContext> {
        Some(self)
    }
}
