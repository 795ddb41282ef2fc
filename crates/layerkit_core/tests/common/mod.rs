#![allow(dead_code)]

use layerkit_core::model::{ColumnMap, Row};
use layerkit_core::storage::{BackingStore, Filter, SelectQuery, StoreResult};
use layerkit_core::{
    open_db_in_memory, AttributeSchema, ConstraintTranslation, ErrorCodeTable,
};
use rusqlite::Connection;
use serde_json::json;
use std::cell::Cell;
use std::sync::Arc;

pub const USERS_DDL: &str = "CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_name TEXT NOT NULL,
    email TEXT UNIQUE,
    profile TEXT,
    tags TEXT,
    password_hash TEXT,
    created_at TEXT,
    updated_at TEXT,
    deleted_at TEXT
);";

pub const MEMBERSHIPS_DDL: &str = "CREATE TABLE memberships (
    org_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    created_at TEXT,
    updated_at TEXT,
    PRIMARY KEY (org_id, user_id)
);";

pub fn setup_conn() -> Connection {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(USERS_DDL).unwrap();
    conn.execute_batch(MEMBERSHIPS_DDL).unwrap();
    conn
}

pub fn users_schema() -> Arc<AttributeSchema> {
    Arc::new(
        AttributeSchema::builder("users")
            .attribute("id", "id")
            .attribute("userName", "user_name")
            .attribute("email", "email")
            .attribute("profile", "profile")
            .attribute("tags", "tags")
            .attribute("passwordHash", "password_hash")
            .attribute("createdAt", "created_at")
            .attribute("updatedAt", "updated_at")
            .hidden_column("password_hash")
            .json_object_column("profile")
            .json_column("tags")
            .searchable("userName")
            .searchable("email")
            .default_value("tags", json!([]))
            .timestamps(true)
            .soft_delete(true)
            .error_table(ErrorCodeTable::new().by_message(
                2067,
                "users.email",
                ConstraintTranslation::new("user_email_taken", "This email is already registered.")
                    .with_field("email", "Email already taken."),
            ))
            .build()
            .unwrap(),
    )
}

pub fn memberships_schema() -> Arc<AttributeSchema> {
    Arc::new(
        AttributeSchema::builder("memberships")
            .attribute("orgId", "org_id")
            .attribute("userId", "user_id")
            .attribute("role", "role")
            .primary_key(&["orgId", "userId"])
            .timestamps(true)
            .build()
            .unwrap(),
    )
}

pub fn user_columns(name: &str, email: &str) -> ColumnMap {
    ColumnMap::from([
        ("user_name".to_string(), json!(name)),
        ("email".to_string(), json!(email)),
    ])
}

/// Forwards to `inner` and counts statements per kind.
pub struct CountingStore<S> {
    pub inner: S,
    pub selects: Cell<usize>,
    pub counts: Cell<usize>,
    pub inserts: Cell<usize>,
    pub updates: Cell<usize>,
    pub deletes: Cell<usize>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            selects: Cell::new(0),
            counts: Cell::new(0),
            inserts: Cell::new(0),
            updates: Cell::new(0),
            deletes: Cell::new(0),
        }
    }

    pub fn writes(&self) -> (usize, usize, usize) {
        (self.inserts.get(), self.updates.get(), self.deletes.get())
    }

    pub fn reset(&self) {
        for cell in [
            &self.selects,
            &self.counts,
            &self.inserts,
            &self.updates,
            &self.deletes,
        ] {
            cell.set(0);
        }
    }
}

fn bump(cell: &Cell<usize>) {
    cell.set(cell.get() + 1);
}

impl<S: BackingStore> BackingStore for CountingStore<S> {
    fn select(&self, query: &SelectQuery) -> StoreResult<Vec<Row>> {
        bump(&self.selects);
        self.inner.select(query)
    }

    fn count(&self, table: &str, filter: &Filter) -> StoreResult<u64> {
        bump(&self.counts);
        self.inner.count(table, filter)
    }

    fn insert(&self, table: &str, columns: &ColumnMap) -> StoreResult<Option<i64>> {
        bump(&self.inserts);
        self.inner.insert(table, columns)
    }

    fn update(
        &self,
        table: &str,
        columns: &ColumnMap,
        filter: &Filter,
        limit: Option<u64>,
    ) -> StoreResult<u64> {
        bump(&self.updates);
        self.inner.update(table, columns, filter, limit)
    }

    fn delete(&self, table: &str, filter: &Filter, limit: Option<u64>) -> StoreResult<u64> {
        bump(&self.deletes);
        self.inner.delete(table, filter, limit)
    }

    fn begin(&self) -> StoreResult<()> {
        self.inner.begin()
    }

    fn commit(&self) -> StoreResult<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> StoreResult<()> {
        self.inner.rollback()
    }
}
