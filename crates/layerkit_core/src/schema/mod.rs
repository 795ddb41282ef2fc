//! Static per-entity-type schema descriptors.
//!
//! # Responsibility
//! - Describe how one entity type is laid out in storage.
//! - Own the native error-code tables used by error translation.
//!
//! # Invariants
//! - Schemas are constructed once and shared read-only (`Arc`).

pub mod attribute_schema;
pub mod error_table;

pub use attribute_schema::{
    AttributeSchema, AttributeSchemaBuilder, NestedDemap, RowDemap, RowMap, WILDCARD,
};
pub use error_table::{ConstraintTranslation, ErrorCodeTable, ErrorRule};
