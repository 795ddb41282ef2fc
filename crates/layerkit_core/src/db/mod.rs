//! SQLite bootstrap and the shipped `BackingStore` implementation.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Execute storage-engine statements against a borrowed connection.
//!
//! # Invariants
//! - Table creation is the caller's concern; nothing here runs DDL.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
mod sqlite_store;

pub use open::{open_db, open_db_in_memory};
pub use sqlite_store::SqliteStore;

pub type DbResult<T> = Result<T, DbError>;

/// Connection bootstrap failure.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
