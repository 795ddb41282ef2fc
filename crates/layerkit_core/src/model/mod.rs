//! In-memory records and the value shapes shared across layers.
//!
//! # Responsibility
//! - Define the attribute-space and column-space map types.
//! - Provide the dirty-tracking `Entity` and its construction context.
//!
//! # Invariants
//! - Attribute maps are keyed by attribute names, column maps and rows by
//!   column names; the `Mapper` is the only place that crosses the two.

use serde_json::Value;
use std::collections::BTreeMap;

pub mod context;
pub mod entity;

pub use context::{EntityContext, EntityFactory, SchemaEntityFactory};
pub use entity::{Entity, FieldMap, FieldValue};

/// Attribute name -> plain value.
pub type AttributeMap = BTreeMap<String, Value>;

/// Column name -> plain value, as written to the backing store.
pub type ColumnMap = BTreeMap<String, Value>;

/// One row read from the backing store, keyed by column (or alias) name.
pub type Row = BTreeMap<String, Value>;
