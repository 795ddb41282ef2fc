//! Repository layer: attribute-space CRUD and search over one schema.
//!
//! # Responsibility
//! - Compose `Mapper`, `StorageEngine` and an entity factory.
//! - Keep column names and store handles out of caller code.

pub mod repository;

pub use repository::{ContextResolver, Repository};
