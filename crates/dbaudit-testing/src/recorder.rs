//! A recorder that records its own calls

use crate::expectation::{Expectation, RecorderCall};
use async_trait::async_trait;
use dbaudit_core::{
    AuditError, ChangeRecorder, Entity, EntityChange, EntityRef, HasParentContext, ParentContext,
    PendingCommit, RecordingBuffer, Result, StoreError, Value,
};
use dbaudit_jobs::CancellationToken;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct ProbeState {
    calls: Vec<RecorderCall>,
    changes: Vec<EntityChange>,
    expectations: Vec<Expectation>,
    parent_set: bool,
    fail_saving: bool,
    fail_discard: bool,
}

/// Shared view into a [`MockRecorder`] that stays usable after the recorder moved into
/// a context
#[derive(Debug, Clone, Default)]
pub struct RecorderProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl RecorderProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, call: RecorderCall) {
        self.lock().calls.push(call);
    }

    /// Every call in the order received
    pub fn calls(&self) -> Vec<RecorderCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, call: RecorderCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    /// Every diff passed to `record_change`
    pub fn changes(&self) -> Vec<EntityChange> {
        self.lock().changes.clone()
    }

    /// Whether the context handed over its parent context
    pub fn parent_set(&self) -> bool {
        self.lock().parent_set
    }

    /// Make `on_saving_changes` fail
    pub fn fail_on_saving(&self, fail: bool) {
        self.lock().fail_saving = fail;
    }

    /// Make `discard` fail
    pub fn fail_on_discard(&self, fail: bool) {
        self.lock().fail_discard = fail;
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.calls.clear();
        state.changes.clear();
    }

    /// Add an expectation, checked by [`verify`](Self::verify)
    pub fn expect(&self, expectation: Expectation) -> &Self {
        self.lock().expectations.push(expectation);
        self
    }

    /// Verify that all expectations were met
    pub fn verify(&self) {
        let state = self.lock();
        for expectation in &state.expectations {
            let count = state
                .calls
                .iter()
                .filter(|c| **c == expectation.call())
                .count();
            if let Err(message) = expectation.check(count) {
                panic!("{}", message);
            }
        }
    }
}

/// A [`ChangeRecorder`] that buffers like the real ones, keeps nothing durable and
/// reports every call to its [`RecorderProbe`]
#[derive(Debug, Default)]
pub struct MockRecorder {
    buffer: RecordingBuffer,
    parent: Option<ParentContext>,
    probe: RecorderProbe,
}

impl MockRecorder {
    pub const NAME: &'static str = "mock";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> RecorderProbe {
        self.probe.clone()
    }
}

impl HasParentContext for MockRecorder {
    fn set_parent_context(&mut self, parent: ParentContext) {
        self.probe.lock().parent_set = true;
        self.parent = Some(parent);
    }

    fn parent_context(&self) -> Option<&ParentContext> {
        self.parent.as_ref()
    }
}

#[async_trait]
impl ChangeRecorder for MockRecorder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn buffer(&self) -> &RecordingBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut RecordingBuffer {
        &mut self.buffer
    }

    fn record_add(&mut self, entity: &dyn Entity) {
        self.probe.push(RecorderCall::RecordAdd);
        self.buffer.additions.push(EntityRef::of(entity));
    }

    fn record_delete(&mut self, entity: &dyn Entity) {
        self.probe.push(RecorderCall::RecordDelete);
        self.buffer.deletions.push(EntityRef::of(entity));
    }

    fn record_change(
        &mut self,
        entity: &dyn Entity,
        property: &str,
        original: Value,
        current: Value,
    ) -> Result<()> {
        let change = EntityChange::new(entity, property, original, current)?;
        {
            let mut state = self.probe.lock();
            state.calls.push(RecorderCall::RecordChange);
            state.changes.push(change.clone());
        }
        self.buffer.modifications.push(change);
        Ok(())
    }

    fn on_saving_changes(&mut self) -> Result<()> {
        self.probe.push(RecorderCall::SavingChanges);
        if self.probe.lock().fail_saving {
            return Err(AuditError::Staging(format!(
                "{} refused to prepare the save",
                Self::NAME
            )));
        }
        Ok(())
    }

    fn take_commit(&mut self) -> Result<Option<PendingCommit>> {
        self.probe.push(RecorderCall::TakeCommit);
        self.buffer.clear();
        Ok(None)
    }

    async fn commit(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.probe.push(RecorderCall::Commit);
        self.buffer.clear();
        Ok(())
    }

    async fn discard(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.probe.push(RecorderCall::Discard);
        self.buffer.clear();
        if self.probe.lock().fail_discard {
            return Err(AuditError::Store(StoreError::Unavailable(
                "discard failed".to_string(),
            )));
        }
        Ok(())
    }

    fn as_has_parent_context(&mut self) -> Option<&mut dyn HasParentContext> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestEntity;

    #[test]
    fn test_probe_sees_calls_after_move() {
        let recorder = MockRecorder::new();
        let probe = recorder.probe();
        let mut boxed: Box<dyn ChangeRecorder> = Box::new(recorder);

        boxed.record_add(&TestEntity::new("a", 1));
        boxed
            .record_change(
                &TestEntity::new("a", 1),
                "Value2",
                Value::Int(1),
                Value::Int(2),
            )
            .unwrap();

        assert_eq!(
            probe.calls(),
            vec![RecorderCall::RecordAdd, RecorderCall::RecordChange]
        );
        assert_eq!(probe.changes()[0].property, "Value2");
        assert_eq!(boxed.buffer().modifications.len(), 1);
    }

    #[tokio::test]
    async fn test_discard_failure_clears_buffer() {
        let mut recorder = MockRecorder::new();
        let probe = recorder.probe();
        probe.fail_on_discard(true);
        recorder.record_add(&TestEntity::new("a", 1));

        let err = recorder.discard(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err.as_store_error(),
            Some(StoreError::Unavailable(_))
        ));
        assert!(recorder.buffer().is_empty());
    }

    #[test]
    #[should_panic(expected = "expected commit to be called once")]
    fn test_verify_panics_on_unmet_expectation() {
        let recorder = MockRecorder::new();
        recorder
            .probe()
            .expect(Expectation::new(RecorderCall::Commit).once())
            .verify();
    }
}
