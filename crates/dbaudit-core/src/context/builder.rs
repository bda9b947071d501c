use super::{AuditedContext, SaveState};
use crate::codec::{JsonCodec, ValueCodec};
use crate::config::AuditConfig;
use crate::identity::{Identity, SharedIdentity};
use crate::recorder::{ChangeRecorder, ParentContext, SameStoreRecorder, SeparateStoreRecorder};
use crate::store::{AuditStore, DataStore};
use crate::tracking::ChangeTracker;
use crate::types::TypeRegistry;
use dbaudit_jobs::{EnqueueOptions, JobQueue};
use std::sync::Arc;

/// Composition root of an [`AuditedContext`]
pub struct AuditedContextBuilder {
    store: Arc<dyn DataStore>,
    recorders: Vec<Box<dyn ChangeRecorder>>,
    identity: Option<SharedIdentity>,
    queue: Option<JobQueue>,
    types: TypeRegistry,
    codec: Arc<dyn ValueCodec>,
    config: AuditConfig,
}

impl AuditedContextBuilder {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            recorders: Vec::new(),
            identity: None,
            queue: None,
            types: TypeRegistry::new(),
            codec: Arc::new(JsonCodec::new()),
            config: AuditConfig::default(),
        }
    }

    /// Register a recorder. Recorders run in registration order.
    pub fn recorder<R: ChangeRecorder + 'static>(mut self, recorder: R) -> Self {
        self.recorders.push(Box::new(recorder));
        self
    }

    pub fn boxed_recorder(mut self, recorder: Box<dyn ChangeRecorder>) -> Self {
        self.recorders.push(recorder);
        self
    }

    /// Record into the audited store itself, in the same write as the data
    pub fn same_store_auditing(self) -> Self {
        self.recorder(SameStoreRecorder::new())
    }

    /// Record into a separate audit store after the data is written
    pub fn separate_store_auditing(self, store: Arc<dyn AuditStore>) -> Self {
        self.recorder(SeparateStoreRecorder::new(store))
    }

    pub fn identity<I: Identity + 'static>(mut self, identity: I) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }

    pub fn shared_identity(mut self, identity: Option<SharedIdentity>) -> Self {
        self.identity = identity;
        self
    }

    /// Queue running the post-save commits. Without one they are spawned onto the current tokio runtime.
    pub fn queue(mut self, queue: JobQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    pub fn codec<C: ValueCodec + 'static>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn config(mut self, config: AuditConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> AuditedContext {
        let mut tracker = ChangeTracker::new();
        tracker.set_auto_detect_changes(self.config.auto_detect_changes);

        let commit_options = EnqueueOptions::new()
            .max_attempts(self.config.commit_max_attempts.max(1))
            .retry_backoff(self.config.commit_retry_backoff());

        AuditedContext {
            store: self.store,
            tracker,
            recorders: self.recorders,
            parent: ParentContext::new(self.identity, Arc::new(self.types), self.codec),
            queue: self.queue,
            commit_options,
            state: SaveState::Idle,
        }
    }
}
