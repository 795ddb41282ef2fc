//! Condition triples and the operator vocabulary.
//!
//! # Responsibility
//! - Parse operator strings (case-insensitive, synonyms folded).
//! - Normalize loosely shaped condition input into `(field, op, value)`.
//!
//! # Invariants
//! - Unknown operator strings are kept verbatim as `Operator::Literal`.
//! - A flat condition is recognized by its first element not being a list.

use crate::error::{PersistError, PersistResult};
use serde_json::Value;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Where the `%` wildcards go around a LIKE operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikePlacement {
    /// `like`: operand used as written.
    Exact,
    /// `%like%`
    Contains,
    /// `like%`
    Prefix,
    /// `%like`
    Suffix,
}

impl LikePlacement {
    pub fn pattern(self, operand: &str) -> String {
        match self {
            Self::Exact => operand.to_string(),
            Self::Contains => format!("%{operand}%"),
            Self::Prefix => format!("{operand}%"),
            Self::Suffix => format!("%{operand}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Compare(Comparison),
    Like(LikePlacement),
    In,
    NotIn,
    Between,
    Null,
    NotNull,
    /// Compared at date granularity; time of day is ignored.
    Date(Comparison),
    /// Anything outside the vocabulary, passed through untouched.
    Literal(String),
}

impl Operator {
    pub fn parse(raw: &str) -> Self {
        let folded = raw.trim().to_ascii_lowercase();
        match folded.as_str() {
            "" | "=" | "==" => Self::Compare(Comparison::Eq),
            "!=" | "<>" => Self::Compare(Comparison::Ne),
            "<" => Self::Compare(Comparison::Lt),
            "<=" => Self::Compare(Comparison::Le),
            ">" => Self::Compare(Comparison::Gt),
            ">=" => Self::Compare(Comparison::Ge),
            "like" => Self::Like(LikePlacement::Exact),
            "%like%" => Self::Like(LikePlacement::Contains),
            "like%" => Self::Like(LikePlacement::Prefix),
            "%like" => Self::Like(LikePlacement::Suffix),
            "in" => Self::In,
            "not in" | "notin" | "not_in" => Self::NotIn,
            "between" => Self::Between,
            "null" | "is null" => Self::Null,
            "not null" | "is not null" => Self::NotNull,
            "date=" => Self::Date(Comparison::Eq),
            "date<" => Self::Date(Comparison::Lt),
            "date<=" => Self::Date(Comparison::Le),
            "date>" => Self::Date(Comparison::Gt),
            "date>=" => Self::Date(Comparison::Ge),
            _ => Self::Literal(raw.trim().to_string()),
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compare(cmp) => f.write_str(cmp.as_sql()),
            Self::Like(LikePlacement::Exact) => f.write_str("like"),
            Self::Like(LikePlacement::Contains) => f.write_str("%like%"),
            Self::Like(LikePlacement::Prefix) => f.write_str("like%"),
            Self::Like(LikePlacement::Suffix) => f.write_str("%like"),
            Self::In => f.write_str("in"),
            Self::NotIn => f.write_str("not in"),
            Self::Between => f.write_str("between"),
            Self::Null => f.write_str("null"),
            Self::NotNull => f.write_str("not null"),
            Self::Date(cmp) => write!(f, "date{}", cmp.as_sql()),
            Self::Literal(raw) => f.write_str(raw),
        }
    }
}

/// One filter predicate. `field` is an attribute name before mapping and a
/// column name after.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::parse(operator),
            value: value.into(),
        }
    }

    /// Two-element shorthand: equality.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Compare(Comparison::Eq),
            value: value.into(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Null,
            value: Value::Null,
        }
    }

    pub(crate) fn with_field(&self, field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: self.operator.clone(),
            value: self.value.clone(),
        }
    }
}

/// Normalizes a single flat condition or a list of them.
///
/// Accepted shapes: `[field, value]`, `[field, op, value]`, or a list of
/// either. `null` and `[]` mean "no conditions".
///
/// # Errors
/// - `InvalidConditionShape` for non-list input, list members that are not
///   lists, wrong arity, or a missing/non-string field or operator.
pub fn parse_conditions(input: &Value) -> PersistResult<Vec<Condition>> {
    let items = match input {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(PersistError::InvalidConditionShape(format!(
                "conditions must be a list, got `{other}`"
            )))
        }
    };

    match items.first() {
        None => Ok(Vec::new()),
        Some(first) if !first.is_array() => Ok(vec![parse_single(items)?]),
        Some(_) => items
            .iter()
            .map(|item| match item {
                Value::Array(parts) => parse_single(parts),
                other => Err(PersistError::InvalidConditionShape(format!(
                    "condition entry must be a list, got `{other}`"
                ))),
            })
            .collect(),
    }
}

fn parse_single(parts: &[Value]) -> PersistResult<Condition> {
    let field = match parts.first() {
        Some(Value::String(field)) if !field.is_empty() => field.clone(),
        _ => {
            return Err(PersistError::InvalidConditionShape(
                "condition is missing its field name".to_string(),
            ))
        }
    };

    match parts {
        [_, value] => Ok(Condition::eq(field, value.clone())),
        [_, Value::String(operator), value] => Ok(Condition::new(field, operator, value.clone())),
        [_, other, _] => Err(PersistError::InvalidConditionShape(format!(
            "operator for `{field}` must be a string, got `{other}`"
        ))),
        _ => Err(PersistError::InvalidConditionShape(format!(
            "condition for `{field}` must have 2 or 3 elements, got {}",
            parts.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_conditions, Comparison, Condition, LikePlacement, Operator};
    use crate::error::PersistError;
    use serde_json::json;

    #[test]
    fn operator_parsing_folds_case_and_synonyms() {
        assert_eq!(Operator::parse("NOT_IN"), Operator::NotIn);
        assert_eq!(Operator::parse(" Is Not Null "), Operator::NotNull);
        assert_eq!(Operator::parse("%LIKE%"), Operator::Like(LikePlacement::Contains));
        assert_eq!(Operator::parse("date>="), Operator::Date(Comparison::Ge));
        assert_eq!(Operator::parse("<>"), Operator::Compare(Comparison::Ne));
        assert_eq!(Operator::parse("REGEXP"), Operator::Literal("REGEXP".to_string()));
    }

    #[test]
    fn flat_and_nested_forms_normalize_identically() {
        let flat = parse_conditions(&json!(["age", ">", 18])).unwrap();
        let nested = parse_conditions(&json!([["age", ">", 18]])).unwrap();
        assert_eq!(flat, nested);
        assert_eq!(flat, vec![Condition::new("age", ">", 18)]);
    }

    #[test]
    fn two_element_shorthand_defaults_to_equality() {
        let parsed = parse_conditions(&json!([["name", "ann"], ["age", "<=", 3]])).unwrap();
        assert_eq!(parsed[0].operator, Operator::Compare(Comparison::Eq));
        assert_eq!(parsed[1].operator, Operator::Compare(Comparison::Le));
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        for bad in [
            json!([[null, 1]]),
            json!([["a", "=", 1, 2]]),
            json!([["a", "="], 3]),
            json!("age"),
            json!([["a", 5, 1]]),
        ] {
            let err = parse_conditions(&bad).unwrap_err();
            assert!(matches!(err, PersistError::InvalidConditionShape(_)), "{bad}");
        }
    }

    #[test]
    fn empty_input_yields_no_conditions() {
        assert!(parse_conditions(&json!([])).unwrap().is_empty());
        assert!(parse_conditions(&json!(null)).unwrap().is_empty());
    }

    #[test]
    fn like_placement_builds_patterns() {
        assert_eq!(LikePlacement::Prefix.pattern("ab"), "ab%");
        assert_eq!(LikePlacement::Suffix.pattern("ab"), "%ab");
        assert_eq!(Operator::Date(Comparison::Lt).to_string(), "date<");
    }
}
