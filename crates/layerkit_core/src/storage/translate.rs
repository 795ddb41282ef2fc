//! Native store failure -> `PersistError` translation.

use crate::error::PersistError;
use crate::schema::{AttributeSchema, ConstraintTranslation, ErrorCodeTable};
use crate::storage::backend::StoreError;
use log::{error, warn};

/// SQLite primary result codes with a friendlier wording.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CANTOPEN: i32 = 14;

/// Schema-level table first, then the engine's common table.
#[derive(Debug, Clone)]
pub struct ErrorTranslator {
    table: String,
    schema_rules: ErrorCodeTable,
    common_rules: ErrorCodeTable,
}

impl ErrorTranslator {
    pub fn new(schema: &AttributeSchema) -> Self {
        Self {
            table: schema.table().to_string(),
            schema_rules: schema.error_table().clone(),
            common_rules: common_rules(),
        }
    }

    pub fn translate(&self, err: StoreError) -> PersistError {
        let Some(code) = err.code else {
            error!(
                "event=store_error module=storage status=error table={} code=none",
                self.table
            );
            return PersistError::BackingStore {
                code: None,
                message: err.message,
            };
        };

        if let Some(hit) = self.schema_rules.lookup(code, &err.message) {
            warn!(
                "event=store_error module=storage status=translated table={} code={} translated_code={}",
                self.table, code, hit.code
            );
            return PersistError::TranslatedConstraint {
                native_code: code,
                code: hit.code.clone(),
                message: hit.message.clone(),
                fields: hit.fields.clone(),
            };
        }

        // Extended SQLite codes keep the primary code in the low byte.
        let primary = code & 0xff;
        if let Some(hit) = self
            .common_rules
            .lookup(code, &err.message)
            .or_else(|| self.common_rules.lookup(primary, &err.message))
        {
            warn!(
                "event=store_error module=storage status=common table={} code={}",
                self.table, code
            );
            return PersistError::BackingStore {
                code: Some(code),
                message: hit.message.clone(),
            };
        }

        error!(
            "event=store_error module=storage status=error table={} code={}",
            self.table, code
        );
        PersistError::BackingStore {
            code: Some(code),
            message: err.message,
        }
    }
}

fn common_rules() -> ErrorCodeTable {
    ErrorCodeTable::new()
        .single(
            SQLITE_BUSY,
            ConstraintTranslation::new("store_busy", "The database is busy, try again later."),
        )
        .single(
            SQLITE_LOCKED,
            ConstraintTranslation::new("store_locked", "The database table is locked."),
        )
        .single(
            SQLITE_CANTOPEN,
            ConstraintTranslation::new("store_unavailable", "Unable to open the database."),
        )
}
