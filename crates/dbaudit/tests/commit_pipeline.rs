//! Post-save commits, cancellation, undo and history

use dbaudit::prelude::*;
use dbaudit_testing::{Harness, TestEntity};
use std::time::Duration;
use uuid::Uuid;

async fn modify(harness: &Harness, value2: i32) -> (AuditedContext, Uuid) {
    let id = harness.seed(TestEntity::new("a", 1)).unwrap();
    let mut ctx = harness.context();
    ctx.find::<TestEntity>(id).await.unwrap();
    ctx.get_mut::<TestEntity>(id).unwrap().value2 = value2;
    (ctx, id)
}

#[tokio::test]
async fn separate_store_commit_is_retried() {
    let harness = Harness::separate_store();
    harness
        .audit_store()
        .fail_next_insert(StoreError::Unavailable("audit database restarting".to_string()));

    let (mut ctx, _) = modify(&harness, 2).await;
    ctx.save_changes().await.unwrap();

    assert_eq!(harness.settle().await, 2);
    assert_eq!(harness.audit_store().insert_calls(), 2);
    assert_eq!(harness.change_sets().await.unwrap().len(), 1);
    assert!(harness.queue().dead_letters().await.unwrap().is_empty());
}

#[tokio::test]
async fn exhausted_commit_does_not_touch_saved_data() {
    let harness = Harness::separate_store().config(AuditConfig {
        commit_max_attempts: 1,
        commit_retry_backoff_ms: 0,
        ..AuditConfig::default()
    });
    harness
        .audit_store()
        .fail_next_insert(StoreError::Unavailable("audit database down".to_string()));

    let (mut ctx, id) = modify(&harness, 2).await;
    ctx.save_changes().await.unwrap();
    harness.settle().await;

    let dead = harness.queue().dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].name, "commit_change_set");
    assert!(harness.change_sets().await.unwrap().is_empty());

    let mut fresh = harness.context();
    let saved = fresh.find::<TestEntity>(id).await.unwrap().unwrap();
    assert_eq!(saved.value2, 2);
}

#[tokio::test]
async fn cancelled_save_writes_nothing() {
    for harness in [Harness::same_store(), Harness::separate_store()] {
        let (mut ctx, id) = modify(&harness, 2).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ctx.save_changes_with_cancellation(&cancel).await.unwrap_err();
        harness.settle().await;

        assert!(matches!(err.as_store_error(), Some(StoreError::Cancelled)));
        assert_eq!(ctx.state_of(id), EntityState::Modified);
        assert!(harness.change_sets().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn cancelling_the_request_drops_the_queued_commit() {
    let harness = Harness::separate_store();
    let (mut ctx, id) = modify(&harness, 2).await;
    let cancel = CancellationToken::new();

    ctx.save_changes_with_cancellation(&cancel).await.unwrap();
    cancel.cancel();
    // a cancelled commit is not retried
    assert_eq!(harness.settle().await, 1);

    assert!(harness.change_sets().await.unwrap().is_empty());
    assert_eq!(harness.queue().dead_letters().await.unwrap().len(), 1);
    assert_eq!(ctx.state_of(id), EntityState::Unchanged);
}

#[tokio::test]
async fn same_store_change_set_is_written_with_the_data() {
    let harness = Harness::same_store();
    let (mut ctx, _) = modify(&harness, 2).await;

    // entity row, ChangeSet row and one Change row
    assert_eq!(ctx.save_changes().await.unwrap(), 3);
    assert_eq!(harness.queue().pending().await.unwrap(), 0);
    assert_eq!(harness.change_sets().await.unwrap().len(), 1);
}

#[tokio::test]
async fn undo_reverts_tracked_changes() {
    let harness = Harness::same_store();
    let (mut ctx, modified) = modify(&harness, 5).await;
    let added = ctx.add(TestEntity::new("new", 0)).unwrap();

    ctx.undo_changes(&CancellationToken::new()).await.unwrap();

    assert_eq!(ctx.get::<TestEntity>(modified).unwrap().value2, 1);
    assert_eq!(ctx.state_of(modified), EntityState::Unchanged);
    assert_eq!(ctx.state_of(added), EntityState::Detached);

    // nothing left to save or audit
    ctx.save_changes().await.unwrap();
    assert!(harness.change_sets().await.unwrap().is_empty());
}

#[tokio::test]
async fn history_query_filters_by_entity_and_property() {
    let harness = Harness::separate_store();
    let first = harness.seed(TestEntity::new("a", 1)).unwrap();
    let second = harness.seed(TestEntity::new("b", 1)).unwrap();

    let mut ctx = harness.context();
    ctx.find::<TestEntity>(first).await.unwrap();
    ctx.find::<TestEntity>(second).await.unwrap();
    ctx.get_mut::<TestEntity>(first).unwrap().value2 = 2;
    ctx.get_mut::<TestEntity>(second).unwrap().value1 = Some("c".to_string());
    ctx.save_changes().await.unwrap();
    ctx.get_mut::<TestEntity>(first).unwrap().value1 = Some("d".to_string());
    ctx.save_changes().await.unwrap();
    harness.settle().await;

    let store: &dyn AuditStore = harness.audit_store();
    let history = store.history().entity(first).execute().await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .flat_map(|set| &set.changes)
        .all(|change| change.entity_id == first));

    let renames = store
        .history()
        .property("Value1")
        .newest_first()
        .limit(1)
        .execute()
        .await
        .unwrap();
    assert_eq!(renames.len(), 1);
    assert_eq!(renames[0].changes.len(), 1);
    assert_eq!(renames[0].changes[0].entity_id, first);
    assert_eq!(renames[0].changes[0].new_value.as_deref(), Some("\"d\""));

    let by_user = store.history().created_by("user-1").execute().await.unwrap();
    assert_eq!(by_user.len(), 2);
}

#[tokio::test]
async fn runtime_workers_commit_in_the_background() {
    let runtime = AuditRuntime::new(AuditConfig {
        commit_workers: 2,
        poll_interval_ms: 5,
        ..AuditConfig::default()
    });
    let store = MemoryStore::new();
    let audit = MemoryStore::new();

    let mut ctx = runtime
        .builder(Arc::new(store.clone()))
        .identity(StaticIdentity::new("user-9", "Worker Test"))
        .separate_store_auditing(Arc::new(audit.clone()))
        .build();
    let id = ctx.add(TestEntity::new("a", 1)).unwrap();
    ctx.save_changes().await.unwrap();
    ctx.get_mut::<TestEntity>(id).unwrap().value2 = 2;
    ctx.save_changes().await.unwrap();

    let mut committed = 0;
    for _ in 0..200 {
        committed = AuditStore::count(&audit).await.unwrap();
        if committed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(committed, 1);
    assert_eq!(audit.change_sets().unwrap()[0].created_by.as_deref(), Some("user-9"));

    runtime.shutdown().await;
}
