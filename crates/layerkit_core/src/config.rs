//! Engine configuration.
//!
//! # Responsibility
//! - Name the bookkeeping columns the engine stamps on writes.
//! - Hold query defaults shared by every entity type.
//!
//! # Invariants
//! - `default_page_size` is never zero after loading.

use chrono::Utc;
use serde::Deserialize;

const DEFAULT_PAGE_SIZE: u32 = 20;

/// Storage-engine configuration shared by all schemas.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Column stamped once on the insert branch of `store`.
    pub created_column: String,
    /// Column stamped on every write path when timestamps are enabled.
    pub updated_column: String,
    /// Soft-delete marker column; `NULL` means the row is live.
    pub deleted_column: String,
    /// `chrono` format string for stamped timestamps (UTC).
    pub timestamp_format: String,
    /// Page size used when a read is issued without pagination.
    pub default_page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            created_column: "created_at".to_string(),
            updated_column: "updated_at".to_string(),
            deleted_column: "deleted_at".to_string(),
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Loads overrides from a JSON document; absent keys keep defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        let mut config: Self =
            serde_json::from_str(raw).map_err(|err| format!("invalid engine config: {err}"))?;
        if config.default_page_size == 0 {
            config.default_page_size = DEFAULT_PAGE_SIZE;
        }
        Ok(config)
    }

    /// Current UTC time rendered with `timestamp_format`.
    pub fn now(&self) -> String {
        Utc::now().format(&self.timestamp_format).to_string()
    }
}
