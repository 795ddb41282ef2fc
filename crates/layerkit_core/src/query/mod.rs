//! Query vocabulary shared by repository callers and the storage engine.
//!
//! # Responsibility
//! - Condition triples with the closed operator vocabulary.
//! - Pagination window and ordering in attribute and column space.

pub mod condition;
pub mod pagination;

pub use condition::{parse_conditions, Comparison, Condition, LikePlacement, Operator};
pub use pagination::{Direction, OrderBy, OrderSpec, Pagination};
