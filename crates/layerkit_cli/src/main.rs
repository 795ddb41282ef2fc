//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire an in-memory SQLite store, a schema and a repository together.
//! - Print the outcome of one store/read/soft-delete cycle.

use layerkit_core::{
    open_db_in_memory, AttributeSchema, EngineConfig, Repository, SqliteStore,
};
use serde_json::json;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

const DDL: &str = "CREATE TABLE tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    labels TEXT,
    created_at TEXT,
    updated_at TEXT,
    deleted_at TEXT
);";

fn main() -> ExitCode {
    println!("layerkit_core version={}", layerkit_core::core_version());
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("layerkit smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let conn = open_db_in_memory()?;
    conn.execute_batch(DDL)?;

    let schema = Arc::new(
        AttributeSchema::builder("tasks")
            .attribute("id", "id")
            .attribute("title", "title")
            .attribute("labels", "labels")
            .json_column("labels")
            .searchable("title")
            .timestamps(true)
            .soft_delete(true)
            .build()?,
    );
    let repo = Repository::with_schema_factory(
        SqliteStore::new(&conn),
        Arc::clone(&schema),
        EngineConfig::default(),
    );

    let mut task = repo.new_entity();
    task.set("title", json!("write the smoke test"))?;
    task.set("labels", json!(["cli", "smoke"]))?;
    repo.store(&mut task)?;
    let id = task.value("id")?;
    println!("stored id={id} dirty={}", task.is_dirty());

    let found = repo.search_in_attributes(&["smoke"], &[], &[], None, None)?;
    println!("search hits={}", found.len());

    let deleted = repo.delete_by_id(&id, false)?;
    let remaining = repo.get_count(&json!([]))?;
    println!("soft_deleted={deleted} visible={remaining}");
    Ok(())
}
