//! SQLite audit store

use super::{AuditStore, StoreError};
use crate::model::{Change, ChangeSet};
use crate::query::ChangeQuery;
use crate::schema;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use dbaudit_jobs::CancellationToken;
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// Bound parameters per `IN (...)` list, well below SQLite's variable limit
const ID_CHUNK: usize = 500;

/// Audit store writing ChangeSets to SQLite
#[derive(Debug, Clone)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

fn unavailable(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a single-connection pool, so `sqlite::memory:` keeps one database
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(unavailable)?;
        Ok(Self::new(pool))
    }

    /// Create the audit tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(schema::CREATE_TABLES)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Changes of the given sets that pass the Change-level filters, in insertion order
    async fn load_changes(
        &self,
        set_ids: &[i64],
        query: &ChangeQuery,
    ) -> Result<Vec<Change>, StoreError> {
        let mut changes = Vec::new();
        for chunk in set_ids.chunks(ID_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new(r#"SELECT * FROM "Changes" WHERE "ChangeSetId" IN ("#);
            let mut ids = builder.separated(", ");
            for id in chunk {
                ids.push_bind(*id);
            }
            ids.push_unseparated(")");
            push_change_filters(&mut builder, query);
            builder.push(" ORDER BY rowid");

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;
            for row in &rows {
                changes.push(change_from_row(row)?);
            }
        }
        Ok(changes)
    }
}

/// `Created` as fixed-width UTC text, so text order is time order
fn timestamp_text(ts: &DateTime<FixedOffset>) -> String {
    ts.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn push_change_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &ChangeQuery) {
    if let Some(entity_id) = query.entity_id {
        builder.push(r#" AND "EntityId" = "#).push_bind(entity_id.to_string());
    }
    if let Some(ref entity_type) = query.entity_type {
        builder.push(r#" AND "EntityType" = "#).push_bind(entity_type.clone());
    }
    if let Some(ref property) = query.property {
        builder.push(r#" AND "Name" = "#).push_bind(property.clone());
    }
}

/// SELECT over "ChangeSets" with the query's filters, order and page
fn change_set_select(query: &ChangeQuery) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::<Sqlite>::new(r#"SELECT * FROM "ChangeSets" WHERE 1 = 1"#);
    if let Some(ref created_by) = query.created_by {
        builder.push(r#" AND "CreatedBy" = "#).push_bind(created_by.clone());
    }
    if let Some(from) = query.from {
        builder.push(r#" AND "Created" >= "#).push_bind(timestamp_text(&from));
    }
    if let Some(to) = query.to {
        builder.push(r#" AND "Created" < "#).push_bind(timestamp_text(&to));
    }
    if query.filters_changes() {
        // sets without a matching Change are dropped before paging
        builder.push(
            r#" AND EXISTS (SELECT 1 FROM "Changes" WHERE "Changes"."ChangeSetId" = "ChangeSets"."Id""#,
        );
        push_change_filters(&mut builder, query);
        builder.push(")");
    }

    builder.push(if query.newest_first {
        r#" ORDER BY "Created" DESC, "Id" DESC"#
    } else {
        r#" ORDER BY "Created" ASC, "Id" ASC"#
    });

    // SQLite needs a LIMIT before OFFSET; -1 means no limit
    let limit = query
        .limit
        .map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
    builder.push(" LIMIT ").push_bind(limit);
    if let Some(offset) = query.offset {
        builder
            .push(" OFFSET ")
            .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
    }
    builder
}

fn parse_uuid(text: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(text).map_err(unavailable)
}

fn change_set_from_row(row: &SqliteRow) -> Result<ChangeSet, StoreError> {
    let created: String = row.try_get(schema::change_set::CREATED).map_err(unavailable)?;
    Ok(ChangeSet {
        id: row.try_get(schema::change_set::ID).map_err(unavailable)?,
        created: DateTime::parse_from_rfc3339(&created).map_err(unavailable)?,
        created_by: row
            .try_get(schema::change_set::CREATED_BY)
            .map_err(unavailable)?,
        changes: Vec::new(),
    })
}

fn change_from_row(row: &SqliteRow) -> Result<Change, StoreError> {
    let id: String = row.try_get(schema::change::ID).map_err(unavailable)?;
    let entity_id: String = row.try_get(schema::change::ENTITY_ID).map_err(unavailable)?;
    Ok(Change {
        id: parse_uuid(&id)?,
        change_set_id: row
            .try_get(schema::change::CHANGE_SET_ID)
            .map_err(unavailable)?,
        entity_id: parse_uuid(&entity_id)?,
        entity_type: row.try_get(schema::change::ENTITY_TYPE).map_err(unavailable)?,
        name: row.try_get(schema::change::NAME).map_err(unavailable)?,
        property_type: row.try_get(schema::change::TYPE).map_err(unavailable)?,
        previous_value: row
            .try_get(schema::change::PREVIOUS_VALUE)
            .map_err(unavailable)?,
        new_value: row.try_get(schema::change::NEW_VALUE).map_err(unavailable)?,
    })
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn insert_change_set(
        &self,
        mut change_set: ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<i64, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let id = sqlx::query(r#"INSERT INTO "ChangeSets" ("Created", "CreatedBy") VALUES (?, ?)"#)
            .bind(timestamp_text(&change_set.created))
            .bind(change_set.created_by.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?
            .last_insert_rowid();
        change_set.assign_ids(id);

        for change in &change_set.changes {
            sqlx::query(
                r#"INSERT INTO "Changes"
                   ("Id", "ChangeSetId", "EntityId", "EntityType", "Name", "Type", "PreviousValue", "NewValue")
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(change.id.to_string())
            .bind(change.change_set_id)
            .bind(change.entity_id.to_string())
            .bind(&change.entity_type)
            .bind(&change.name)
            .bind(&change.property_type)
            .bind(change.previous_value.as_deref())
            .bind(change.new_value.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        }

        if cancel.is_cancelled() {
            tx.rollback().await.map_err(unavailable)?;
            return Err(StoreError::Cancelled);
        }
        tx.commit().await.map_err(unavailable)?;
        Ok(id)
    }

    async fn query(&self, query: &ChangeQuery) -> Result<Vec<ChangeSet>, StoreError> {
        let mut select = change_set_select(query);
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        let mut sets = rows
            .iter()
            .map(change_set_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        if sets.is_empty() {
            return Ok(sets);
        }

        let ids: Vec<i64> = sets.iter().map(|set| set.id).collect();
        let position: HashMap<i64, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        for change in self.load_changes(&ids, query).await? {
            if let Some(&i) = position.get(&change.change_set_id) {
                sets[i].changes.push(change);
            }
        }
        Ok(sets)
    }

    async fn change_set(&self, id: i64) -> Result<Option<ChangeSet>, StoreError> {
        let row = sqlx::query(r#"SELECT * FROM "ChangeSets" WHERE "Id" = ?"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut set = change_set_from_row(&row)?;
        let rows = sqlx::query(r#"SELECT * FROM "Changes" WHERE "ChangeSetId" = ? ORDER BY rowid"#)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        set.changes = rows.iter().map(change_from_row).collect::<Result<_, _>>()?;
        Ok(Some(set))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query(r#"SELECT COUNT(*) AS "Count" FROM "ChangeSets""#)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?
            .try_get("Count")
            .map_err(unavailable)?;
        usize::try_from(count).map_err(unavailable)
    }
}
