//! Native error-code translation tables.
//!
//! A table maps a backing store's native error code to either one
//! translation, or a list of translations disambiguated by a substring of
//! the native message (several constraints can share one code).

use std::collections::BTreeMap;

/// Friendly replacement for a native constraint failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintTranslation {
    pub code: String,
    pub message: String,
    /// Field name -> per-field explanation.
    pub fields: BTreeMap<String, String>,
}

impl ConstraintTranslation {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, detail: impl Into<String>) -> Self {
        self.fields.insert(field.into(), detail.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorRule {
    /// Any failure with this code maps to one translation.
    Single(ConstraintTranslation),
    /// First entry whose needle occurs in the native message wins.
    ByMessage(Vec<(String, ConstraintTranslation)>),
}

/// Native code -> translation rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCodeTable {
    rules: BTreeMap<i32, ErrorRule>,
}

impl ErrorCodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(mut self, code: i32, translation: ConstraintTranslation) -> Self {
        self.rules.insert(code, ErrorRule::Single(translation));
        self
    }

    /// Adds a message-disambiguated entry, appending to an existing list
    /// for the same code.
    pub fn by_message(
        mut self,
        code: i32,
        needle: impl Into<String>,
        translation: ConstraintTranslation,
    ) -> Self {
        let entry = (needle.into(), translation);
        match self.rules.get_mut(&code) {
            Some(ErrorRule::ByMessage(entries)) => entries.push(entry),
            _ => {
                self.rules.insert(code, ErrorRule::ByMessage(vec![entry]));
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolves a native failure to its translation, if any.
    pub fn lookup(&self, code: i32, message: &str) -> Option<&ConstraintTranslation> {
        match self.rules.get(&code)? {
            ErrorRule::Single(translation) => Some(translation),
            ErrorRule::ByMessage(entries) => entries
                .iter()
                .find(|(needle, _)| message.contains(needle.as_str()))
                .map(|(_, translation)| translation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConstraintTranslation, ErrorCodeTable};

    #[test]
    fn message_needle_disambiguates_shared_code() {
        let table = ErrorCodeTable::new()
            .by_message(
                2067,
                "users.email",
                ConstraintTranslation::new("user_email", "email taken"),
            )
            .by_message(
                2067,
                "users.phone",
                ConstraintTranslation::new("user_phone", "phone taken"),
            );

        let hit = table
            .lookup(2067, "UNIQUE constraint failed: users.phone")
            .expect("phone rule should match");
        assert_eq!(hit.code, "user_phone");
        assert!(table.lookup(2067, "UNIQUE constraint failed: users.nick").is_none());
        assert!(table.lookup(1299, "NOT NULL").is_none());
    }

    #[test]
    fn single_rule_ignores_message() {
        let table = ErrorCodeTable::new().single(
            787,
            ConstraintTranslation::new("fk", "unknown owner").with_field("ownerId", "missing"),
        );
        let hit = table.lookup(787, "anything").expect("single rule matches");
        assert_eq!(hit.fields.get("ownerId").map(String::as_str), Some("missing"));
    }
}
