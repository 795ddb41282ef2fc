//! Core persistence engine for LayerKit.
//! Dirty-tracking entities, attribute/column mapping, upsert-by-lookup
//! storage and a repository facade over any `BackingStore`.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod model;
pub mod query;
pub mod repo;
pub mod schema;
pub mod storage;

pub use config::EngineConfig;
pub use db::{open_db, open_db_in_memory, DbError, DbResult, SqliteStore};
pub use error::{PersistError, PersistResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use mapper::Mapper;
pub use model::{
    AttributeMap, ColumnMap, Entity, EntityContext, EntityFactory, FieldMap, FieldValue, Row,
    SchemaEntityFactory,
};
pub use query::{Condition, Direction, OrderBy, OrderSpec, Pagination};
pub use repo::{ContextResolver, Repository};
pub use schema::{AttributeSchema, AttributeSchemaBuilder, ConstraintTranslation, ErrorCodeTable};
pub use storage::{BackingStore, ErrorTranslator, StorageEngine, StoreError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
