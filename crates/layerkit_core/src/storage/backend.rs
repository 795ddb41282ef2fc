//! Backing-store capability contract.
//!
//! # Responsibility
//! - Describe the primitive reads/writes the storage engine needs.
//! - Carry native failures (code + message) up to error translation.
//!
//! # Invariants
//! - Implementations execute exactly one statement per call.
//! - Implementations never retry and never translate errors themselves.

use crate::model::{ColumnMap, Row};
use crate::query::{Comparison, Direction};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Native failure reported by a backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// Store-specific error code; `None` for transport/decoding failures.
    pub code: Option<i32>,
    pub message: String,
}

impl StoreError {
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "store error {code}: {}", self.message),
            None => write!(f, "store error: {}", self.message),
        }
    }
}

impl Error for StoreError {}

/// One column-space predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: Comparison,
        value: Value,
    },
    Like {
        column: String,
        pattern: String,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    Between {
        column: String,
        low: Value,
        high: Value,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    /// Compares the date part of both sides.
    Date {
        column: String,
        op: Comparison,
        value: Value,
    },
    /// Caller-supplied operator rendered verbatim.
    Literal {
        column: String,
        operator: String,
        value: Value,
    },
    /// Matches when every predicate of at least one group matches.
    AnyOf(Vec<Vec<Predicate>>),
}

/// Conjunction of predicates. Empty means "every row".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    /// Select-list expressions; plain names or `expr AS alias` forms.
    pub columns: Vec<String>,
    pub filter: Filter,
    pub order: Option<(String, Direction)>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            filter: Filter::default(),
            order: None,
            limit: None,
            offset: 0,
        }
    }
}

/// Primitive operations over one backing store handle.
pub trait BackingStore {
    fn select(&self, query: &SelectQuery) -> StoreResult<Vec<Row>>;

    fn count(&self, table: &str, filter: &Filter) -> StoreResult<u64>;

    /// Inserts one row and returns the store-generated key, if any.
    fn insert(&self, table: &str, columns: &ColumnMap) -> StoreResult<Option<i64>>;

    /// Updates matching rows (at most `limit`) and returns the affected count.
    fn update(
        &self,
        table: &str,
        columns: &ColumnMap,
        filter: &Filter,
        limit: Option<u64>,
    ) -> StoreResult<u64>;

    /// Deletes matching rows (at most `limit`) and returns the affected count.
    fn delete(&self, table: &str, filter: &Filter, limit: Option<u64>) -> StoreResult<u64>;

    fn begin(&self) -> StoreResult<()>;

    fn commit(&self) -> StoreResult<()>;

    fn rollback(&self) -> StoreResult<()>;
}

impl<S: BackingStore + ?Sized> BackingStore for &S {
    fn select(&self, query: &SelectQuery) -> StoreResult<Vec<Row>> {
        (**self).select(query)
    }

    fn count(&self, table: &str, filter: &Filter) -> StoreResult<u64> {
        (**self).count(table, filter)
    }

    fn insert(&self, table: &str, columns: &ColumnMap) -> StoreResult<Option<i64>> {
        (**self).insert(table, columns)
    }

    fn update(
        &self,
        table: &str,
        columns: &ColumnMap,
        filter: &Filter,
        limit: Option<u64>,
    ) -> StoreResult<u64> {
        (**self).update(table, columns, filter, limit)
    }

    fn delete(&self, table: &str, filter: &Filter, limit: Option<u64>) -> StoreResult<u64> {
        (**self).delete(table, filter, limit)
    }

    fn begin(&self) -> StoreResult<()> {
        (**self).begin()
    }

    fn commit(&self) -> StoreResult<()> {
        (**self).commit()
    }

    fn rollback(&self) -> StoreResult<()> {
        (**self).rollback()
    }
}
