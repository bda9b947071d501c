//! Save behaviour shared by both recorders

use dbaudit::prelude::*;
use dbaudit::{JsonCodec, TypeRegistry};
use dbaudit_testing::{Harness, TestEntity};
use std::collections::HashSet;
use uuid::Uuid;

macro_rules! both_recorders {
    ($name:ident, $body:ident) => {
        mod $name {
            use super::*;

            #[tokio::test]
            async fn same_store() {
                $body(Harness::same_store()).await;
            }

            #[tokio::test]
            async fn separate_store() {
                $body(Harness::separate_store()).await;
            }
        }
    };
}

async fn loaded(harness: &Harness, ctx: &mut AuditedContext, value1: &str, value2: i32) -> Uuid {
    let id = harness.seed(TestEntity::new(value1, value2)).unwrap();
    ctx.find::<TestEntity>(id).await.unwrap().unwrap();
    id
}

async fn save(harness: &Harness, ctx: &mut AuditedContext) -> usize {
    let rows = ctx.save_changes().await.unwrap();
    harness.settle().await;
    rows
}

async fn created_stamps(harness: Harness) {
    let mut ctx = harness.context();
    let id = ctx.add(TestEntity::new("a", 1)).unwrap();
    save(&harness, &mut ctx).await;

    let entity = ctx.get::<TestEntity>(id).unwrap();
    assert!(entity.stamps.created.is_some());
    assert_eq!(entity.stamps.created_by.as_deref(), Some("user-1"));
    assert!(entity.stamps.last_modified.is_none());
}

both_recorders!(added_entities_get_created_stamps, created_stamps);

#[tokio::test]
async fn created_stamps_without_recorders() {
    created_stamps(Harness::without_auditing()).await;
}

async fn modified_stamps(harness: Harness) {
    let mut ctx = harness.context();
    let id = loaded(&harness, &mut ctx, "a", 1).await;
    ctx.get_mut::<TestEntity>(id).unwrap().value2 = 2;
    save(&harness, &mut ctx).await;

    let entity = ctx.get::<TestEntity>(id).unwrap();
    assert!(entity.stamps.last_modified.is_some());
    assert_eq!(entity.stamps.last_modified_by.as_deref(), Some("user-1"));
}

both_recorders!(modified_entities_get_last_modified_stamps, modified_stamps);

#[tokio::test]
async fn no_recorders_no_change_sets() {
    let harness = Harness::without_auditing();
    let mut ctx = harness.context();
    assert!(!ctx.can_audit());

    let id = loaded(&harness, &mut ctx, "a", 1).await;
    ctx.get_mut::<TestEntity>(id).unwrap().value2 = 2;
    save(&harness, &mut ctx).await;

    assert!(harness.change_sets().await.unwrap().is_empty());
    assert!(ctx.get::<TestEntity>(id).unwrap().stamps.last_modified.is_some());
}

async fn no_identity_no_change_sets(harness: Harness) {
    let harness = harness.anonymous();
    let mut ctx = harness.context();
    assert!(!ctx.can_audit());

    let id = loaded(&harness, &mut ctx, "a", 1).await;
    ctx.get_mut::<TestEntity>(id).unwrap().value2 = 2;
    let added = ctx.add(TestEntity::new("b", 1)).unwrap();
    save(&harness, &mut ctx).await;

    assert!(harness.change_sets().await.unwrap().is_empty());
    assert!(ctx.get::<TestEntity>(id).unwrap().stamps.last_modified.is_some());
    assert!(ctx.get::<TestEntity>(added).unwrap().stamps.created.is_some());
}

both_recorders!(anonymous_saves_are_not_audited, no_identity_no_change_sets);

async fn two_properties_one_save(harness: Harness) {
    let mut ctx = harness.context();
    let id = loaded(&harness, &mut ctx, "a", 1).await;
    {
        let entity = ctx.get_mut::<TestEntity>(id).unwrap();
        entity.value1 = Some("b".to_string());
        entity.value2 = 2;
    }
    save(&harness, &mut ctx).await;

    let sets = harness.change_sets().await.unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].changes.len(), 2);
    assert_eq!(sets[0].created_by.as_deref(), Some("user-1"));

    let names: HashSet<_> = sets[0].changes.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, HashSet::from(["Value1", "Value2"]));
    for change in &sets[0].changes {
        assert_eq!(change.change_set_id, sets[0].id);
        assert_eq!(change.entity_id, id);
        assert_eq!(change.entity_type, "test_entity");
    }
}

both_recorders!(one_save_two_properties, two_properties_one_save);

async fn one_property_two_saves(harness: Harness) {
    let mut ctx = harness.context();
    let id = loaded(&harness, &mut ctx, "a", 1).await;

    ctx.get_mut::<TestEntity>(id).unwrap().value2 = 2;
    save(&harness, &mut ctx).await;
    ctx.get_mut::<TestEntity>(id).unwrap().value1 = Some("b".to_string());
    save(&harness, &mut ctx).await;

    let sets = harness.change_sets().await.unwrap();
    assert_eq!(sets.len(), 2);
    assert_ne!(sets[0].id, sets[1].id);
    assert_eq!(sets[0].changes.len(), 1);
    assert_eq!(sets[1].changes.len(), 1);
    assert_eq!(sets[0].changes[0].name, "Value2");
    assert_eq!(sets[1].changes[0].name, "Value1");
    assert_eq!(sets[0].changes[0].previous_value.as_deref(), Some("1"));
    assert_eq!(sets[0].changes[0].new_value.as_deref(), Some("2"));
}

both_recorders!(two_saves_two_change_sets, one_property_two_saves);

async fn two_entities_one_save(harness: Harness) {
    let mut ctx = harness.context();
    let first = loaded(&harness, &mut ctx, "a", 1).await;
    let second = loaded(&harness, &mut ctx, "b", 1).await;

    ctx.get_mut::<TestEntity>(first).unwrap().value2 = 10;
    ctx.get_mut::<TestEntity>(second).unwrap().value2 = 20;
    save(&harness, &mut ctx).await;

    let sets = harness.change_sets().await.unwrap();
    assert_eq!(sets.len(), 1);
    let entities: HashSet<_> = sets[0].changes.iter().map(|c| c.entity_id).collect();
    assert_eq!(entities, HashSet::from([first, second]));
    assert!(sets[0]
        .changes
        .iter()
        .all(|c| c.change_set_id == sets[0].id));
}

both_recorders!(one_save_two_entities, two_entities_one_save);

async fn text_round_trips(harness: Harness) {
    let text = "first line\nsecond line: Grüße, 日本語, emoji 🦀";
    let mut ctx = harness.context();
    let id = loaded(&harness, &mut ctx, "a", 1).await;
    ctx.get_mut::<TestEntity>(id).unwrap().value1 = Some(text.to_string());
    save(&harness, &mut ctx).await;

    let sets = harness.change_sets().await.unwrap();
    let change = &sets[0].changes[0];
    assert_eq!(change.property_type, "string");

    let types = TypeRegistry::new();
    let codec = JsonCodec::new();
    assert_eq!(
        change.current(&types, &codec).unwrap(),
        Value::Text(text.to_string())
    );
    assert_eq!(
        change.previous(&types, &codec).unwrap(),
        Value::Text("a".to_string())
    );
}

both_recorders!(multiline_text_round_trips, text_round_trips);

async fn failed_save_leaves_no_rows(harness: Harness) {
    let mut ctx = harness.context();
    let id = loaded(&harness, &mut ctx, "a", 1).await;

    // another unit of work deletes the row first
    let mut other = harness.context();
    other.find::<TestEntity>(id).await.unwrap();
    other.remove(id);
    save(&harness, &mut other).await;

    ctx.get_mut::<TestEntity>(id).unwrap().value2 = 2;
    let err = ctx.save_changes().await.unwrap_err();
    harness.settle().await;

    match err.into_store_error() {
        Some(StoreError::ConcurrencyViolation { entity_type, id: row }) => {
            assert_eq!(entity_type, "test_entity");
            assert_eq!(row, id);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(harness.change_sets().await.unwrap().is_empty());
    assert_eq!(ctx.state(), SaveState::Idle);
    assert!(ctx.recorders()[0].buffer().is_empty());
}

both_recorders!(primary_failure_writes_no_audit_rows, failed_save_leaves_no_rows);

async fn injected_failure_is_returned_as_is(harness: Harness) {
    let mut ctx = harness.context();
    let id = loaded(&harness, &mut ctx, "a", 1).await;
    harness
        .store()
        .fail_next_save(StoreError::UpdateConflict("stale row version".to_string()));

    ctx.get_mut::<TestEntity>(id).unwrap().value2 = 2;
    let err = ctx.save_changes().await.unwrap_err();
    harness.settle().await;

    assert_eq!(err.to_string(), "Update conflict: stale row version");
    assert!(harness.change_sets().await.unwrap().is_empty());

    // the same changes succeed on the next attempt
    save(&harness, &mut ctx).await;
    assert_eq!(harness.change_sets().await.unwrap().len(), 1);
}

both_recorders!(primary_failure_is_propagated, injected_failure_is_returned_as_is);

async fn same_value_is_not_a_change(harness: Harness) {
    let mut ctx = harness.context();
    let id = loaded(&harness, &mut ctx, "a", 1).await;
    ctx.entry_mut(id)
        .unwrap()
        .set_current_value("Value2", Value::Int(1))
        .unwrap();
    assert!(ctx.entry(id).unwrap().is_modified("Value2"));
    assert_eq!(ctx.state_of(id), EntityState::Modified);

    save(&harness, &mut ctx).await;

    assert!(harness.change_sets().await.unwrap().is_empty());
}

both_recorders!(reassigning_same_value_records_nothing, same_value_is_not_a_change);
