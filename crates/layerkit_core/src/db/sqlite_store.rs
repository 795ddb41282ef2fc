//! `BackingStore` over a borrowed rusqlite connection.
//!
//! # Responsibility
//! - Render filters to parameterized SQL and bind JSON-shaped values.
//! - Report failures with the SQLite extended result code.
//!
//! # Invariants
//! - Every value reaches SQLite as a bound parameter; only identifiers,
//!   select-list expressions and operator-shaped literal operators are
//!   spliced into SQL text.
//! - Bounded UPDATE/DELETE go through `rowid`, so `WITHOUT ROWID` tables
//!   only support unbounded writes.

use crate::model::{ColumnMap, Row};
use crate::storage::{BackingStore, Filter, Predicate, SelectQuery, StoreError, StoreResult};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};

static PLAIN_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern must compile")
});

/// Word or symbol operators such as `GLOB`, `IS NOT` or `<>`.
static OPERATOR_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z<>=!~]+( [A-Za-z]+)*$").expect("operator pattern must compile")
});

pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    fn execute(&self, sql: &str, binds: Vec<SqlValue>) -> StoreResult<u64> {
        let changed = self
            .conn
            .execute(sql, params_from_iter(binds))
            .map_err(store_error)?;
        Ok(changed as u64)
    }

    fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        self.conn.execute_batch(sql).map_err(store_error)
    }
}

impl BackingStore for SqliteStore<'_> {
    fn select(&self, query: &SelectQuery) -> StoreResult<Vec<Row>> {
        let projection = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query
                .columns
                .iter()
                .map(|column| quote(column))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {projection} FROM {}", quote(&query.table));
        let mut binds = Vec::new();
        push_where(&mut sql, &mut binds, &query.filter)?;

        if let Some((column, direction)) = &query.order {
            if !column.is_empty() {
                sql.push_str(&format!(" ORDER BY {} {}", quote(column), direction.as_sql()));
            }
        }

        match query.limit {
            Some(limit) => {
                sql.push_str(" LIMIT ?");
                binds.push(SqlValue::Integer(clamp_i64(limit)));
                if query.offset > 0 {
                    sql.push_str(" OFFSET ?");
                    binds.push(SqlValue::Integer(clamp_i64(query.offset)));
                }
            }
            None if query.offset > 0 => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                binds.push(SqlValue::Integer(clamp_i64(query.offset)));
            }
            None => {}
        }

        let mut stmt = self.conn.prepare(&sql).map_err(store_error)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.query(params_from_iter(binds)).map_err(store_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(store_error)? {
            let mut record = Row::new();
            for (index, name) in names.iter().enumerate() {
                let value = row.get_ref(index).map_err(store_error)?;
                record.insert(name.clone(), from_sql(value));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn count(&self, table: &str, filter: &Filter) -> StoreResult<u64> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote(table));
        let mut binds = Vec::new();
        push_where(&mut sql, &mut binds, filter)?;

        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))
            .map_err(store_error)?;
        Ok(count.max(0) as u64)
    }

    fn insert(&self, table: &str, columns: &ColumnMap) -> StoreResult<Option<i64>> {
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote(table))
        } else {
            let names = columns.keys().map(|c| quote(c)).collect::<Vec<_>>();
            let slots = vec!["?"; columns.len()];
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(table),
                names.join(", "),
                slots.join(", ")
            )
        };
        let binds: Vec<SqlValue> = columns.values().map(to_sql).collect();
        self.execute(&sql, binds)?;
        Ok(Some(self.conn.last_insert_rowid()))
    }

    fn update(
        &self,
        table: &str,
        columns: &ColumnMap,
        filter: &Filter,
        limit: Option<u64>,
    ) -> StoreResult<u64> {
        if columns.is_empty() {
            return Ok(0);
        }
        let assignments = columns
            .keys()
            .map(|column| format!("{} = ?", quote(column)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE {} SET {assignments}", quote(table));
        let mut binds: Vec<SqlValue> = columns.values().map(to_sql).collect();
        push_bounded_where(&mut sql, &mut binds, table, filter, limit)?;
        self.execute(&sql, binds)
    }

    fn delete(&self, table: &str, filter: &Filter, limit: Option<u64>) -> StoreResult<u64> {
        let mut sql = format!("DELETE FROM {}", quote(table));
        let mut binds = Vec::new();
        push_bounded_where(&mut sql, &mut binds, table, filter, limit)?;
        self.execute(&sql, binds)
    }

    fn begin(&self) -> StoreResult<()> {
        self.execute_batch("BEGIN;")
    }

    fn commit(&self) -> StoreResult<()> {
        self.execute_batch("COMMIT;")
    }

    fn rollback(&self) -> StoreResult<()> {
        self.execute_batch("ROLLBACK;")
    }
}

fn push_where(sql: &mut String, binds: &mut Vec<SqlValue>, filter: &Filter) -> StoreResult<()> {
    if filter.is_empty() {
        return Ok(());
    }
    sql.push_str(" WHERE ");
    sql.push_str(&render_all(&filter.predicates, binds)?);
    Ok(())
}

/// `WHERE rowid IN (SELECT rowid ... LIMIT n)` when bounded.
fn push_bounded_where(
    sql: &mut String,
    binds: &mut Vec<SqlValue>,
    table: &str,
    filter: &Filter,
    limit: Option<u64>,
) -> StoreResult<()> {
    let Some(limit) = limit else {
        return push_where(sql, binds, filter);
    };
    sql.push_str(&format!(" WHERE rowid IN (SELECT rowid FROM {}", quote(table)));
    push_where(sql, binds, filter)?;
    sql.push_str(" LIMIT ?)");
    binds.push(SqlValue::Integer(clamp_i64(limit)));
    Ok(())
}

fn render_all(predicates: &[Predicate], binds: &mut Vec<SqlValue>) -> StoreResult<String> {
    let rendered = predicates
        .iter()
        .map(|predicate| render(predicate, binds))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(rendered.join(" AND "))
}

fn render(predicate: &Predicate, binds: &mut Vec<SqlValue>) -> StoreResult<String> {
    let sql = match predicate {
        Predicate::Compare { column, op, value } => {
            binds.push(to_sql(value));
            format!("{} {} ?", quote(column), op.as_sql())
        }
        Predicate::Like { column, pattern } => {
            binds.push(SqlValue::Text(pattern.clone()));
            format!("{} LIKE ?", quote(column))
        }
        Predicate::In {
            column,
            values,
            negated,
        } => {
            if values.is_empty() {
                return Ok(if *negated { "1" } else { "0" }.to_string());
            }
            binds.extend(values.iter().map(to_sql));
            let slots = vec!["?"; values.len()].join(", ");
            let keyword = if *negated { "NOT IN" } else { "IN" };
            format!("{} {keyword} ({slots})", quote(column))
        }
        Predicate::Between { column, low, high } => {
            binds.push(to_sql(low));
            binds.push(to_sql(high));
            format!("{} BETWEEN ? AND ?", quote(column))
        }
        Predicate::IsNull { column, negated } => {
            let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
            format!("{} {keyword}", quote(column))
        }
        Predicate::Date { column, op, value } => {
            binds.push(to_sql(value));
            format!("date({}) {} date(?)", quote(column), op.as_sql())
        }
        Predicate::Literal {
            column,
            operator,
            value,
        } => {
            if !OPERATOR_TOKEN.is_match(operator) {
                warn!("event=sql_render module=db status=rejected kind=literal_operator");
                return Err(StoreError::new(
                    None,
                    format!("operator `{operator}` on `{column}` is not a plain SQL operator"),
                ));
            }
            binds.push(to_sql(value));
            format!("{} {operator} ?", quote(column))
        }
        Predicate::AnyOf(groups) => {
            let rendered = groups
                .iter()
                .filter(|group| !group.is_empty())
                .map(|group| Ok(format!("({})", render_all(group, binds)?)))
                .collect::<StoreResult<Vec<String>>>()?;
            if rendered.is_empty() {
                "0".to_string()
            } else {
                format!("({})", rendered.join(" OR "))
            }
        }
    };
    Ok(sql)
}

/// Plain identifiers are quoted; anything else is a caller-provided
/// expression (alias, function call) and is used as written.
fn quote(identifier: &str) -> String {
    if PLAIN_IDENTIFIER.is_match(identifier) {
        format!("\"{identifier}\"")
    } else {
        identifier.to_string()
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        structured => SqlValue::Text(structured.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

fn store_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => StoreError::new(
            Some(failure.extended_code),
            message.clone().unwrap_or_else(|| failure.to_string()),
        ),
        other => {
            warn!("event=sql_exec module=db status=error kind=non_sqlite");
            StoreError::new(None, other.to_string())
        }
    }
}
