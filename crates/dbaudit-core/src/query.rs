//! Change history queries

use crate::model::{Change, ChangeSet};
use crate::store::{AuditStore, StoreError};
use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

/// Filter over stored ChangeSets and their Changes
#[derive(Debug, Clone, Default)]
pub struct ChangeQuery {
    pub entity_id: Option<Uuid>,
    pub entity_type: Option<String>,
    /// Property name
    pub property: Option<String>,
    pub created_by: Option<String>,
    /// Inclusive lower bound on `Created`
    pub from: Option<DateTime<FixedOffset>>,
    /// Exclusive upper bound on `Created`
    pub to: Option<DateTime<FixedOffset>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub newest_first: bool,
}

impl ChangeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the ChangeSet-level filters accept this set
    pub fn matches_set(&self, set: &ChangeSet) -> bool {
        if let Some(ref created_by) = self.created_by {
            if set.created_by.as_deref() != Some(created_by.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if set.created < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if set.created >= to {
                return false;
            }
        }
        true
    }

    /// Whether the Change-level filters accept this change
    pub fn matches_change(&self, change: &Change) -> bool {
        if let Some(entity_id) = self.entity_id {
            if change.entity_id != entity_id {
                return false;
            }
        }
        if let Some(ref entity_type) = self.entity_type {
            if &change.entity_type != entity_type {
                return false;
            }
        }
        if let Some(ref property) = self.property {
            if &change.name != property {
                return false;
            }
        }
        true
    }

    /// Whether any Change-level filter is set
    pub fn filters_changes(&self) -> bool {
        self.entity_id.is_some() || self.entity_type.is_some() || self.property.is_some()
    }

    /// Filter, order and page ChangeSets.
    ///
    /// Sets left without a matching Change are dropped when a Change-level filter is set.
    pub fn apply<'a>(&self, sets: impl IntoIterator<Item = &'a ChangeSet>) -> Vec<ChangeSet> {
        let mut results: Vec<ChangeSet> = sets
            .into_iter()
            .filter(|set| self.matches_set(set))
            .filter_map(|set| {
                let changes: Vec<Change> = set
                    .changes
                    .iter()
                    .filter(|c| self.matches_change(c))
                    .cloned()
                    .collect();
                if changes.is_empty() && self.filters_changes() {
                    return None;
                }
                Some(ChangeSet {
                    changes,
                    ..set.clone()
                })
            })
            .collect();

        if self.newest_first {
            results.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        } else {
            results.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        }

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        results.into_iter().skip(offset).take(limit).collect()
    }
}

/// Fluent builder for running a [`ChangeQuery`] against a store
pub struct ChangeQueryBuilder<'a> {
    store: &'a dyn AuditStore,
    query: ChangeQuery,
}

impl<'a> ChangeQueryBuilder<'a> {
    pub fn new(store: &'a dyn AuditStore) -> Self {
        Self {
            store,
            query: ChangeQuery::new(),
        }
    }

    pub fn entity(mut self, entity_id: Uuid) -> Self {
        self.query.entity_id = Some(entity_id);
        self
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.query.entity_type = Some(entity_type.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.query.property = Some(name.into());
        self
    }

    pub fn created_by(mut self, identity_id: impl Into<String>) -> Self {
        self.query.created_by = Some(identity_id.into());
        self
    }

    pub fn from(mut self, from: DateTime<FixedOffset>) -> Self {
        self.query.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<FixedOffset>) -> Self {
        self.query.to = Some(to);
        self
    }

    pub fn time_range(self, from: DateTime<FixedOffset>, to: DateTime<FixedOffset>) -> Self {
        self.from(from).to(to)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.query.newest_first = true;
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.query.newest_first = false;
        self
    }

    pub async fn execute(self) -> Result<Vec<ChangeSet>, StoreError> {
        self.store.query(&self.query).await
    }

    pub fn build(self) -> ChangeQuery {
        self.query
    }
}

impl<'s> dyn AuditStore + 's {
    /// Start a change history query against this store
    pub fn history(&self) -> ChangeQueryBuilder<'_> {
        ChangeQueryBuilder::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn change(entity_id: Uuid, name: &str) -> Change {
        Change {
            id: Uuid::new_v4(),
            change_set_id: 0,
            entity_id,
            entity_type: "note".to_string(),
            name: name.to_string(),
            property_type: "string".to_string(),
            previous_value: None,
            new_value: None,
        }
    }

    fn set(id: i64, by: &str, changes: Vec<Change>) -> ChangeSet {
        let mut set = ChangeSet::new(Some(by.to_string()));
        set.changes = changes;
        set.assign_ids(id);
        set
    }

    #[test]
    fn test_change_filters_trim_sets() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let sets = vec![
            set(1, "alice", vec![change(a, "Title"), change(b, "Title")]),
            set(2, "bob", vec![change(b, "Stars")]),
        ];

        let query = ChangeQuery {
            entity_id: Some(a),
            ..ChangeQuery::new()
        };
        let found = query.apply(&sets);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 1);
        assert_eq!(found[0].changes.len(), 1);
    }

    #[test]
    fn test_created_by_and_paging() {
        let sets: Vec<_> = (1..=5)
            .map(|i| set(i, if i % 2 == 0 { "bob" } else { "alice" }, vec![]))
            .collect();

        let query = ChangeQuery {
            created_by: Some("alice".to_string()),
            newest_first: true,
            limit: Some(2),
            ..ChangeQuery::new()
        };
        let ids: Vec<i64> = query.apply(&sets).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![5, 3]);
    }

    #[test]
    fn test_time_range() {
        let mut old = set(1, "alice", vec![]);
        old.created = old.created - Duration::hours(2);
        let recent = set(2, "alice", vec![]);
        let sets = vec![old, recent];

        let query = ChangeQuery {
            from: Some(crate::entity::now() - Duration::hours(1)),
            ..ChangeQuery::new()
        };
        let found = query.apply(&sets);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
    }
}
