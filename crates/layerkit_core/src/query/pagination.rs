//! Pagination and ordering shapes.

use serde::{Deserialize, Serialize};

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_COUNT: u32 = 20;

/// 1-based page window. Both fields are clamped to at least 1, including
/// when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PaginationInput")]
pub struct Pagination {
    page: u32,
    count: u32,
}

#[derive(Deserialize)]
struct PaginationInput {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_count")]
    count: u32,
}

fn default_page() -> u32 {
    DEFAULT_PAGE
}

fn default_count() -> u32 {
    DEFAULT_COUNT
}

impl From<PaginationInput> for Pagination {
    fn from(input: PaginationInput) -> Self {
        Self::new(input.page, input.count)
    }
}

impl Pagination {
    pub fn new(page: u32, count: u32) -> Self {
        Self {
            page: page.max(1),
            count: count.max(1),
        }
    }

    /// First page with `count` rows.
    pub fn first(count: u32) -> Self {
        Self::new(DEFAULT_PAGE, count)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.count)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.count)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_COUNT)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Case-insensitive parse; anything but `desc` is ascending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Attribute-space ordering request. Without an attribute the storage
/// default (primary key, descending) applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub attribute: Option<String>,
    #[serde(default)]
    pub direction: Direction,
}

impl OrderSpec {
    pub fn new(attribute: impl Into<String>, direction: Direction) -> Self {
        Self {
            attribute: Some(attribute.into()),
            direction,
        }
    }

    pub fn asc(attribute: impl Into<String>) -> Self {
        Self::new(attribute, Direction::Asc)
    }

    pub fn desc(attribute: impl Into<String>) -> Self {
        Self::new(attribute, Direction::Desc)
    }
}

/// Column-space ordering handed to the storage engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}
