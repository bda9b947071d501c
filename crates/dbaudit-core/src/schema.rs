//! Persisted audit schema
//!
//! Table and column names of the audit tables, and DDL creating them.

pub const CHANGE_SETS: &str = "ChangeSets";
pub const CHANGES: &str = "Changes";

pub mod change_set {
    pub const ID: &str = "Id";
    pub const CREATED: &str = "Created";
    pub const CREATED_BY: &str = "CreatedBy";
}

pub mod change {
    pub const ID: &str = "Id";
    pub const CHANGE_SET_ID: &str = "ChangeSetId";
    pub const ENTITY_ID: &str = "EntityId";
    pub const ENTITY_TYPE: &str = "EntityType";
    pub const NAME: &str = "Name";
    pub const TYPE: &str = "Type";
    pub const PREVIOUS_VALUE: &str = "PreviousValue";
    pub const NEW_VALUE: &str = "NewValue";
}

/// DDL for the audit tables. Deleting a ChangeSet deletes its Changes.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS "ChangeSets" (
    "Id"        INTEGER PRIMARY KEY AUTOINCREMENT,
    "Created"   TEXT NOT NULL,
    "CreatedBy" TEXT NULL
);

CREATE TABLE IF NOT EXISTS "Changes" (
    "Id"            TEXT NOT NULL PRIMARY KEY,
    "ChangeSetId"   INTEGER NOT NULL REFERENCES "ChangeSets" ("Id") ON DELETE CASCADE,
    "EntityId"      TEXT NOT NULL,
    "EntityType"    TEXT NOT NULL,
    "Name"          TEXT NOT NULL,
    "Type"          TEXT NOT NULL,
    "PreviousValue" TEXT NULL,
    "NewValue"      TEXT NULL
);

CREATE INDEX IF NOT EXISTS "IX_Changes_EntityId" ON "Changes" ("EntityId");
CREATE INDEX IF NOT EXISTS "IX_Changes_ChangeSetId" ON "Changes" ("ChangeSetId");
CREATE INDEX IF NOT EXISTS "IX_ChangeSets_Created" ON "ChangeSets" ("Created");
"#;
