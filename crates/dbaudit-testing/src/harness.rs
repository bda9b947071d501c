//! End-to-end wiring for tests

use crate::store::FaultyStore;
use dbaudit_core::{
    AuditConfig, AuditStore, AuditedContext, AuditedContextBuilder, ChangeQuery, ChangeSet,
    Entity, SharedIdentity, StaticIdentity, StoreError,
};
use dbaudit_jobs::{InMemoryBackend, JobQueue};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Which recorder a [`Harness`] registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditMode {
    SameStore,
    SeparateStore,
    Disabled,
}

/// A data store, an audit store and a commit queue wired together.
///
/// The queue has no workers; call [`settle`](Harness::settle) to run the queued
/// commits.
#[derive(Debug)]
pub struct Harness {
    mode: AuditMode,
    store: FaultyStore,
    audit_store: FaultyStore,
    queue: JobQueue,
    identity: Option<SharedIdentity>,
    config: AuditConfig,
}

impl Harness {
    pub fn new(mode: AuditMode) -> Self {
        let store = FaultyStore::new();
        let audit_store = match mode {
            AuditMode::SeparateStore => FaultyStore::new(),
            AuditMode::SameStore | AuditMode::Disabled => store.clone(),
        };
        let config = AuditConfig {
            commit_retry_backoff_ms: 0,
            ..AuditConfig::default()
        };

        Self {
            mode,
            store,
            audit_store,
            queue: JobQueue::new(InMemoryBackend::new()).poll_interval(Duration::from_millis(5)),
            identity: Some(StaticIdentity::new("user-1", "Test User").shared()),
            config,
        }
    }

    pub fn same_store() -> Self {
        Self::new(AuditMode::SameStore)
    }

    pub fn separate_store() -> Self {
        Self::new(AuditMode::SeparateStore)
    }

    /// No recorder registered; an identity is still set
    pub fn without_auditing() -> Self {
        Self::new(AuditMode::Disabled)
    }

    /// Drop the acting identity
    pub fn anonymous(mut self) -> Self {
        self.identity = None;
        self
    }

    pub fn config(mut self, config: AuditConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mode(&self) -> AuditMode {
        self.mode
    }

    pub fn identity(&self) -> Option<&SharedIdentity> {
        self.identity.as_ref()
    }

    /// The data store. Same-store auditing writes its ChangeSets here too.
    pub fn store(&self) -> &FaultyStore {
        &self.store
    }

    pub fn audit_store(&self) -> &FaultyStore {
        &self.audit_store
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// A builder with the stores, identity, queue and config of this harness but no
    /// recorder
    pub fn builder(&self) -> AuditedContextBuilder {
        AuditedContext::builder(Arc::new(self.store.clone()))
            .shared_identity(self.identity.clone())
            .queue(self.queue.clone())
            .config(self.config.clone())
    }

    /// A fresh context with the recorder of this harness
    pub fn context(&self) -> AuditedContext {
        let builder = self.builder();
        match self.mode {
            AuditMode::SameStore => builder.same_store_auditing(),
            AuditMode::SeparateStore => {
                builder.separate_store_auditing(Arc::new(self.audit_store.clone()))
            }
            AuditMode::Disabled => builder,
        }
        .build()
    }

    /// Write an entity straight to the data store, bypassing any context
    pub fn seed<T: Entity>(&self, mut entity: T) -> Result<Uuid, StoreError> {
        if entity.id().is_nil() {
            entity.set_id(Uuid::new_v4());
        }
        let id = entity.id();
        self.store.inner().seed(Box::new(entity))?;
        Ok(id)
    }

    /// Run every queued commit, retries included. Returns the attempts made.
    pub async fn settle(&self) -> usize {
        match self.queue.run_until_idle().await {
            Ok(attempts) => attempts,
            Err(e) => {
                tracing::error!(error = %e, "commit queue failed");
                0
            }
        }
    }

    /// Every ChangeSet in the audit store, oldest first
    pub async fn change_sets(&self) -> Result<Vec<ChangeSet>, StoreError> {
        self.audit_store.query(&ChangeQuery::new()).await
    }
}
