//! Storage engine and its backing-store contract.
//!
//! # Responsibility
//! - Define what a backing store must offer (`BackingStore`).
//! - Run column-space reads/writes with upsert, soft-delete and error
//!   translation (`StorageEngine`).

pub mod backend;
pub mod engine;
pub mod translate;

pub use backend::{BackingStore, Filter, Predicate, SelectQuery, StoreError, StoreResult};
pub use engine::StorageEngine;
pub use translate::ErrorTranslator;
