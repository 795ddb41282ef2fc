//! Crate-wide persistence error taxonomy.
//!
//! # Responsibility
//! - Give every validation and backing-store failure one typed home.
//! - Carry enough context (table, attribute, native code) for callers to
//!   render or log a failure without re-querying.
//!
//! # Invariants
//! - Validation-type variants are raised synchronously and never swallowed.
//! - Backing-store failures only enter this enum through
//!   `storage::translate::ErrorTranslator`.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type PersistResult<T> = Result<T, PersistError>;

/// Error returned by schema lookups, entity access, mapping and storage.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistError {
    /// Attribute name is not declared by the entity's schema.
    UnknownAttribute { table: String, attribute: String },
    /// A key-addressed write or delete was issued without its key value.
    MissingPrimaryKey { table: String, key: String },
    /// Malformed condition tuple or operator/value shape mismatch.
    InvalidConditionShape(String),
    /// Operation is not defined for this schema (e.g. batch store on a
    /// composite key).
    UnsupportedOperation(String),
    /// Backing-store failure without a schema-level translation.
    BackingStore {
        code: Option<i32>,
        message: String,
    },
    /// Known constraint violation mapped to a friendly message.
    TranslatedConstraint {
        native_code: i32,
        code: String,
        message: String,
        fields: BTreeMap<String, String>,
    },
}

impl PersistError {
    pub(crate) fn unknown_attribute(table: &str, attribute: &str) -> Self {
        Self::UnknownAttribute {
            table: table.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub(crate) fn missing_primary_key(table: &str, key: &str) -> Self {
        Self::MissingPrimaryKey {
            table: table.to_string(),
            key: key.to_string(),
        }
    }

    /// Returns the native store code when this error came from the store.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Self::BackingStore { code, .. } => *code,
            Self::TranslatedConstraint { native_code, .. } => Some(*native_code),
            _ => None,
        }
    }
}

impl Display for PersistError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAttribute { table, attribute } => {
                write!(f, "unknown attribute `{attribute}` for `{table}`")
            }
            Self::MissingPrimaryKey { table, key } => {
                write!(f, "missing primary key `{key}` for `{table}`")
            }
            Self::InvalidConditionShape(message) => write!(f, "invalid condition: {message}"),
            Self::UnsupportedOperation(message) => write!(f, "unsupported operation: {message}"),
            Self::BackingStore {
                code: Some(code),
                message,
            } => write!(f, "backing store error {code}: {message}"),
            Self::BackingStore {
                code: None,
                message,
            } => write!(f, "backing store error: {message}"),
            Self::TranslatedConstraint { code, message, .. } => write!(f, "[{code}] {message}"),
        }
    }
}

impl Error for PersistError {}
