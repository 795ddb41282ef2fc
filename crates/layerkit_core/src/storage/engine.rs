//! Column-space reads and writes over a backing store.
//!
//! # Responsibility
//! - Decide insert vs update on `store` (upsert-by-lookup).
//! - Translate condition triples into store predicates.
//! - Apply timestamps, soft-delete scoping, pagination and default order.
//! - Route every native failure through [`ErrorTranslator`].
//!
//! # Invariants
//! - Unconditioned bulk updates are refused (affected count 0, no write).
//! - Soft deletes never touch rows that are already soft-deleted.
//! - Reads never return soft-deleted rows when the schema enables it.
//! - The engine holds no transaction state; it only forwards to the store.

use crate::config::EngineConfig;
use crate::error::{PersistError, PersistResult};
use crate::model::entity::is_empty_key;
use crate::model::{ColumnMap, Row};
use crate::query::{parse_conditions, Comparison, Condition, Direction, OrderBy, Operator};
use crate::query::{LikePlacement, Pagination};
use crate::schema::AttributeSchema;
use crate::storage::backend::{BackingStore, Filter, Predicate, SelectQuery};
use crate::storage::translate::ErrorTranslator;
use log::debug;
use serde_json::Value;
use std::sync::Arc;

pub struct StorageEngine<S: BackingStore> {
    store: S,
    schema: Arc<AttributeSchema>,
    config: EngineConfig,
    translator: ErrorTranslator,
}

impl<S: BackingStore> StorageEngine<S> {
    pub fn new(store: S, schema: Arc<AttributeSchema>, config: EngineConfig) -> Self {
        let translator = ErrorTranslator::new(&schema);
        Self {
            store,
            schema,
            config,
            translator,
        }
    }

    pub fn schema(&self) -> &Arc<AttributeSchema> {
        &self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backing_store(&self) -> &S {
        &self.store
    }

    /// Normalizes raw column-space condition input (flat or list form).
    pub fn normalize_conditions(&self, input: &Value) -> PersistResult<Vec<Condition>> {
        parse_conditions(input)
    }

    /// Translates column-space conditions into store predicates.
    ///
    /// # Errors
    /// - `InvalidConditionShape` when `in`/`not in` lacks a list value or
    ///   `between` lacks exactly two bounds.
    pub fn translate_conditions(&self, conditions: &[Condition]) -> PersistResult<Vec<Predicate>> {
        conditions.iter().map(translate_condition).collect()
    }

    /// Paged, ordered read. Without pagination the first page of
    /// `default_page_size` rows is returned; without ordering rows come
    /// by primary key, descending.
    pub fn get_by_conditions(
        &self,
        columns: &[String],
        conditions: &[Condition],
        pagination: Option<Pagination>,
        order: Option<OrderBy>,
    ) -> PersistResult<Vec<Row>> {
        let pagination =
            pagination.unwrap_or_else(|| Pagination::first(self.config.default_page_size));
        let mut query = self.select_query(columns, self.read_filter(conditions)?);
        query.order = Some(self.order_or_default(order));
        query.limit = Some(pagination.limit());
        query.offset = pagination.offset();
        self.select(&query)
    }

    pub fn count_by_conditions(&self, conditions: &[Condition]) -> PersistResult<u64> {
        let filter = self.read_filter(conditions)?;
        self.store
            .count(self.schema.table(), &filter)
            .map_err(|err| self.translator.translate(err))
    }

    /// Reads one row by the first primary-key column.
    pub fn get_by_id(&self, id: &Value, columns: &[String]) -> PersistResult<Option<Row>> {
        let key_column = self.first_key_column()?;
        self.first_row(columns, vec![compare_eq(&key_column, id)])
    }

    /// Reads one row matching every primary-key column.
    ///
    /// # Errors
    /// - `MissingPrimaryKey` when a key column is absent from `key`.
    pub fn get_by_primary_key(
        &self,
        key: &ColumnMap,
        columns: &[String],
    ) -> PersistResult<Option<Row>> {
        let predicates = self.key_predicates(key)?;
        self.first_row(columns, predicates)
    }

    /// Reads the first row where `column` equals `value`.
    pub fn get_single(
        &self,
        column: &str,
        value: &Value,
        columns: &[String],
    ) -> PersistResult<Option<Row>> {
        self.first_row(columns, vec![compare_eq(column, value)])
    }

    /// Rows where any searched column contains every keyword.
    pub fn search_in_columns(
        &self,
        keywords: &[String],
        searched_columns: &[String],
        columns: &[String],
        pagination: Option<Pagination>,
        order: Option<OrderBy>,
    ) -> PersistResult<Vec<Row>> {
        let tokens: Vec<&str> = keywords
            .iter()
            .map(|keyword| keyword.trim())
            .filter(|keyword| !keyword.is_empty())
            .collect();

        let mut filter = self.read_filter(&[])?;
        if !tokens.is_empty() && !searched_columns.is_empty() {
            let groups = searched_columns
                .iter()
                .map(|column| {
                    tokens
                        .iter()
                        .map(|token| Predicate::Like {
                            column: column.clone(),
                            pattern: LikePlacement::Contains.pattern(token),
                        })
                        .collect()
                })
                .collect();
            filter = filter.and(Predicate::AnyOf(groups));
        }

        let pagination =
            pagination.unwrap_or_else(|| Pagination::first(self.config.default_page_size));
        let mut query = self.select_query(columns, filter);
        query.order = Some(self.order_or_default(order));
        query.limit = Some(pagination.limit());
        query.offset = pagination.offset();
        self.select(&query)
    }

    /// Inserts or updates one row and returns the written column map with
    /// the primary key filled in.
    ///
    /// # Errors
    /// - `MissingPrimaryKey` for a non-generated key without a value.
    /// - `BackingStore` when an insert yields no usable generated key.
    /// - Translated store failures.
    pub fn store(&self, columns: ColumnMap) -> PersistResult<ColumnMap> {
        if self.schema.is_auto_increment() {
            self.store_generated_key(columns)
        } else {
            self.store_by_lookup(columns)
        }
    }

    /// Per-row [`Self::store`].
    ///
    /// # Errors
    /// - `UnsupportedOperation` for composite-key schemas.
    pub fn store_multiple(&self, column_sets: Vec<ColumnMap>) -> PersistResult<Vec<ColumnMap>> {
        if self.schema.is_composite_key() {
            return Err(PersistError::UnsupportedOperation(format!(
                "store_multiple is not available for composite key on `{}`",
                self.schema.table()
            )));
        }
        column_sets
            .into_iter()
            .map(|columns| self.store(columns))
            .collect()
    }

    /// Updates every row matching `conditions`. Returns 0 without writing
    /// when either argument is empty.
    pub fn update(&self, mut columns: ColumnMap, conditions: &[Condition]) -> PersistResult<u64> {
        if columns.is_empty() || conditions.is_empty() {
            debug!(
                "event=update module=storage status=skipped table={} reason=empty_input",
                self.schema.table()
            );
            return Ok(0);
        }
        self.stamp_updated(&mut columns);
        let filter = Filter::new(self.translate_conditions(conditions)?);
        let affected = self.write_update(&columns, &filter, None)?;
        debug!(
            "event=update module=storage status=ok table={} branch=conditions affected={}",
            self.schema.table(),
            affected
        );
        Ok(affected)
    }

    /// Updates the row addressed by the first primary-key column.
    ///
    /// # Errors
    /// - `MissingPrimaryKey` when the key column is absent or null.
    pub fn patch_by_id(&self, mut columns: ColumnMap) -> PersistResult<u64> {
        let key_column = self.first_key_column()?;
        let key_value = match columns.get(&key_column) {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                return Err(PersistError::missing_primary_key(
                    self.schema.table(),
                    &key_column,
                ))
            }
        };
        self.stamp_updated(&mut columns);
        self.update_by_key(&columns, &key_column, &key_value)
    }

    pub fn patch_by_conditions(
        &self,
        columns: ColumnMap,
        conditions: &[Condition],
    ) -> PersistResult<u64> {
        self.update(columns, conditions)
    }

    pub fn delete_by_id(&self, id: &Value, permanent: bool) -> PersistResult<u64> {
        let key_column = self.first_key_column()?;
        self.delete_matching(vec![compare_eq(&key_column, id)], Some(1), permanent)
    }

    /// # Errors
    /// - `MissingPrimaryKey` when a key column is absent from `key`.
    pub fn delete_by_primary_key(&self, key: &ColumnMap, permanent: bool) -> PersistResult<u64> {
        let predicates = self.key_predicates(key)?;
        self.delete_matching(predicates, Some(1), permanent)
    }

    /// Deletes (or soft-deletes) at most `limit` rows matching `conditions`.
    pub fn delete_by_conditions(
        &self,
        conditions: &[Condition],
        limit: Option<u64>,
        permanent: bool,
    ) -> PersistResult<u64> {
        let predicates = self.translate_conditions(conditions)?;
        self.delete_matching(predicates, limit, permanent)
    }

    pub fn begin(&self) -> PersistResult<()> {
        self.store
            .begin()
            .map_err(|err| self.translator.translate(err))
    }

    pub fn commit(&self) -> PersistResult<()> {
        self.store
            .commit()
            .map_err(|err| self.translator.translate(err))
    }

    pub fn rollback(&self) -> PersistResult<()> {
        self.store
            .rollback()
            .map_err(|err| self.translator.translate(err))
    }

    fn store_generated_key(&self, mut columns: ColumnMap) -> PersistResult<ColumnMap> {
        let key_column = self.first_key_column()?;
        let key_value = columns
            .get(&key_column)
            .filter(|value| !is_empty_key(value))
            .cloned();

        let Some(key_value) = key_value else {
            columns.remove(&key_column);
            self.stamp_created(&mut columns);
            self.stamp_updated(&mut columns);
            let id = self.insert_generated(&columns)?;
            columns.insert(key_column, Value::from(id));
            debug!(
                "event=store module=storage status=ok table={} branch=insert",
                self.schema.table()
            );
            return Ok(columns);
        };

        self.stamp_updated(&mut columns);
        let affected = self.update_by_key(&columns, &key_column, &key_value)?;
        if affected > 0 {
            debug!(
                "event=store module=storage status=ok table={} branch=update",
                self.schema.table()
            );
            return Ok(columns);
        }

        self.store
            .insert(self.schema.table(), &columns)
            .map_err(|err| self.translator.translate(err))?;
        debug!(
            "event=store module=storage status=ok table={} branch=fallback_insert",
            self.schema.table()
        );
        Ok(columns)
    }

    fn store_by_lookup(&self, mut columns: ColumnMap) -> PersistResult<ColumnMap> {
        let predicates = self.key_predicates(&columns)?;
        let filter = Filter::new(predicates);
        let table = self.schema.table();

        let existing = self
            .store
            .count(table, &filter)
            .map_err(|err| self.translator.translate(err))?;

        self.stamp_updated(&mut columns);
        if existing > 0 {
            self.write_update(&columns, &filter, Some(1))?;
            debug!(
                "event=store module=storage status=ok table={} branch=update key=lookup",
                table
            );
            return Ok(columns);
        }

        self.stamp_created(&mut columns);
        self.store
            .insert(table, &columns)
            .map_err(|err| self.translator.translate(err))?;
        debug!(
            "event=store module=storage status=ok table={} branch=insert key=lookup",
            table
        );
        Ok(columns)
    }

    /// The key column stays in the SET list so a key-only write still
    /// matches its row.
    fn update_by_key(
        &self,
        columns: &ColumnMap,
        key_column: &str,
        key_value: &Value,
    ) -> PersistResult<u64> {
        let filter = Filter::new(vec![compare_eq(key_column, key_value)]);
        self.write_update(columns, &filter, Some(1))
    }

    fn insert_generated(&self, columns: &ColumnMap) -> PersistResult<i64> {
        let table = self.schema.table();
        let generated = self
            .store
            .insert(table, columns)
            .map_err(|err| self.translator.translate(err))?;
        match generated {
            Some(id) if id > 0 => Ok(id),
            other => Err(PersistError::BackingStore {
                code: None,
                message: format!(
                    "insert into `{table}` returned an invalid generated key: {other:?}"
                ),
            }),
        }
    }

    fn write_update(
        &self,
        columns: &ColumnMap,
        filter: &Filter,
        limit: Option<u64>,
    ) -> PersistResult<u64> {
        self.store
            .update(self.schema.table(), columns, filter, limit)
            .map_err(|err| self.translator.translate(err))
    }

    fn delete_matching(
        &self,
        predicates: Vec<Predicate>,
        limit: Option<u64>,
        permanent: bool,
    ) -> PersistResult<u64> {
        let table = self.schema.table();
        let mut filter = Filter::new(predicates);

        if self.schema.has_soft_delete() && !permanent {
            filter = filter.and(Predicate::IsNull {
                column: self.config.deleted_column.clone(),
                negated: false,
            });
            let mut marker = ColumnMap::new();
            marker.insert(
                self.config.deleted_column.clone(),
                Value::String(self.config.now()),
            );
            let affected = self.write_update(&marker, &filter, limit)?;
            debug!(
                "event=delete module=storage status=ok table={} branch=soft_delete affected={}",
                table, affected
            );
            return Ok(affected);
        }

        let affected = self
            .store
            .delete(table, &filter, limit)
            .map_err(|err| self.translator.translate(err))?;
        debug!(
            "event=delete module=storage status=ok table={} branch=hard_delete affected={}",
            table, affected
        );
        Ok(affected)
    }

    fn select(&self, query: &SelectQuery) -> PersistResult<Vec<Row>> {
        self.store
            .select(query)
            .map_err(|err| self.translator.translate(err))
    }

    fn first_row(&self, columns: &[String], predicates: Vec<Predicate>) -> PersistResult<Option<Row>> {
        let mut filter = self.read_filter(&[])?;
        filter.predicates.extend(predicates);
        let mut query = self.select_query(columns, filter);
        query.limit = Some(1);
        Ok(self.select(&query)?.into_iter().next())
    }

    fn select_query(&self, columns: &[String], filter: Filter) -> SelectQuery {
        let columns = if columns.is_empty() {
            self.schema.all_columns()
        } else {
            columns.to_vec()
        };
        let mut query = SelectQuery::new(self.schema.table(), columns);
        query.filter = filter;
        query
    }

    /// Conditions plus the live-row scope.
    fn read_filter(&self, conditions: &[Condition]) -> PersistResult<Filter> {
        let mut filter = Filter::new(self.translate_conditions(conditions)?);
        if self.schema.has_soft_delete() {
            filter = filter.and(Predicate::IsNull {
                column: self.config.deleted_column.clone(),
                negated: false,
            });
        }
        Ok(filter)
    }

    fn order_or_default(&self, order: Option<OrderBy>) -> (String, Direction) {
        match order {
            Some(order) => (order.column, order.direction),
            None => (
                self.schema
                    .primary_key_columns()
                    .into_iter()
                    .next()
                    .unwrap_or_default(),
                Direction::Desc,
            ),
        }
    }

    fn first_key_column(&self) -> PersistResult<String> {
        self.schema
            .primary_key_columns()
            .into_iter()
            .next()
            .ok_or_else(|| {
                PersistError::UnsupportedOperation(format!(
                    "`{}` declares no primary key",
                    self.schema.table()
                ))
            })
    }

    fn key_predicates(&self, key: &ColumnMap) -> PersistResult<Vec<Predicate>> {
        self.schema
            .primary_key_columns()
            .iter()
            .map(|column| match key.get(column) {
                Some(value) if !value.is_null() => Ok(compare_eq(column, value)),
                _ => Err(PersistError::missing_primary_key(self.schema.table(), column)),
            })
            .collect()
    }

    fn stamp_updated(&self, columns: &mut ColumnMap) {
        if self.schema.has_timestamps() {
            columns.insert(
                self.config.updated_column.clone(),
                Value::String(self.config.now()),
            );
        }
    }

    fn stamp_created(&self, columns: &mut ColumnMap) {
        if self.schema.has_timestamps() {
            columns.insert(
                self.config.created_column.clone(),
                Value::String(self.config.now()),
            );
        }
    }
}

fn compare_eq(column: &str, value: &Value) -> Predicate {
    Predicate::Compare {
        column: column.to_string(),
        op: Comparison::Eq,
        value: value.clone(),
    }
}

fn like_operand(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn translate_condition(condition: &Condition) -> PersistResult<Predicate> {
    let column = condition.field.clone();
    let value = &condition.value;
    let predicate = match &condition.operator {
        Operator::Compare(op) => Predicate::Compare {
            column,
            op: *op,
            value: value.clone(),
        },
        Operator::Like(placement) => Predicate::Like {
            column,
            pattern: placement.pattern(&like_operand(value)),
        },
        Operator::In | Operator::NotIn => {
            let Value::Array(values) = value else {
                return Err(PersistError::InvalidConditionShape(format!(
                    "`{}` on `{column}` requires a list value",
                    condition.operator
                )));
            };
            Predicate::In {
                column,
                values: values.clone(),
                negated: condition.operator == Operator::NotIn,
            }
        }
        Operator::Between => match value {
            Value::Array(bounds) if bounds.len() == 2 => Predicate::Between {
                column,
                low: bounds[0].clone(),
                high: bounds[1].clone(),
            },
            _ => {
                return Err(PersistError::InvalidConditionShape(format!(
                    "`between` on `{column}` requires exactly two bounds"
                )))
            }
        },
        Operator::Null => Predicate::IsNull {
            column,
            negated: false,
        },
        Operator::NotNull => Predicate::IsNull {
            column,
            negated: true,
        },
        Operator::Date(op) => Predicate::Date {
            column,
            op: *op,
            value: value.clone(),
        },
        Operator::Literal(operator) => Predicate::Literal {
            column,
            operator: operator.clone(),
            value: value.clone(),
        },
    };
    Ok(predicate)
}

#[cfg(test)]
mod tests {
    use super::StorageEngine;
    use crate::config::EngineConfig;
    use crate::error::PersistError;
    use crate::model::{ColumnMap, Row};
    use crate::query::{Comparison, Condition, Direction, OrderBy, Pagination};
    use crate::schema::AttributeSchema;
    use crate::storage::backend::{
        BackingStore, Filter, Predicate, SelectQuery, StoreError, StoreResult,
    };
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::sync::Arc;

    #[derive(Default)]
    struct ScriptedStore {
        selects: RefCell<Vec<SelectQuery>>,
        updates: RefCell<Vec<(ColumnMap, Filter, Option<u64>)>>,
        inserts: RefCell<Vec<ColumnMap>>,
        deletes: RefCell<Vec<(Filter, Option<u64>)>>,
        update_affects: u64,
        existing_rows: u64,
        generated_key: Option<i64>,
        fail_insert: Option<StoreError>,
    }

    impl BackingStore for ScriptedStore {
        fn select(&self, query: &SelectQuery) -> StoreResult<Vec<Row>> {
            self.selects.borrow_mut().push(query.clone());
            Ok(vec![Row::from([("id".to_string(), json!(1))])])
        }

        fn count(&self, _table: &str, _filter: &Filter) -> StoreResult<u64> {
            Ok(self.existing_rows)
        }

        fn insert(&self, _table: &str, columns: &ColumnMap) -> StoreResult<Option<i64>> {
            if let Some(err) = &self.fail_insert {
                return Err(err.clone());
            }
            self.inserts.borrow_mut().push(columns.clone());
            Ok(self.generated_key)
        }

        fn update(
            &self,
            _table: &str,
            columns: &ColumnMap,
            filter: &Filter,
            limit: Option<u64>,
        ) -> StoreResult<u64> {
            self.updates
                .borrow_mut()
                .push((columns.clone(), filter.clone(), limit));
            Ok(self.update_affects)
        }

        fn delete(&self, _table: &str, filter: &Filter, limit: Option<u64>) -> StoreResult<u64> {
            self.deletes.borrow_mut().push((filter.clone(), limit));
            Ok(1)
        }

        fn begin(&self) -> StoreResult<()> {
            Ok(())
        }

        fn commit(&self) -> StoreResult<()> {
            Ok(())
        }

        fn rollback(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    fn articles(soft_delete: bool, timestamps: bool) -> Arc<AttributeSchema> {
        Arc::new(
            AttributeSchema::builder("articles")
                .attribute("id", "id")
                .attribute("title", "title")
                .soft_delete(soft_delete)
                .timestamps(timestamps)
                .build()
                .unwrap(),
        )
    }

    fn memberships() -> Arc<AttributeSchema> {
        Arc::new(
            AttributeSchema::builder("memberships")
                .attribute("orgId", "org_id")
                .attribute("userId", "user_id")
                .attribute("role", "role")
                .primary_key(&["orgId", "userId"])
                .build()
                .unwrap(),
        )
    }

    fn engine(store: ScriptedStore, schema: Arc<AttributeSchema>) -> StorageEngine<ScriptedStore> {
        StorageEngine::new(store, schema, EngineConfig::default())
    }

    fn columns(entries: &[(&str, Value)]) -> ColumnMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn default_read_pages_and_orders_by_key_desc() {
        let engine = engine(ScriptedStore::default(), articles(false, false));
        engine
            .get_by_conditions(&[], &[], Some(Pagination::new(2, 10)), None)
            .unwrap();
        let query = engine.backing_store().selects.borrow()[0].clone();
        assert_eq!(query.offset, 10);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.order, Some(("id".to_string(), Direction::Desc)));
        assert_eq!(query.columns, vec!["id".to_string(), "title".to_string()]);
    }

    #[test]
    fn explicit_order_and_default_page_size_are_used() {
        let engine = engine(ScriptedStore::default(), articles(false, false));
        let order = OrderBy {
            column: "title".to_string(),
            direction: Direction::Asc,
        };
        engine
            .get_by_conditions(&[], &[], None, Some(order))
            .unwrap();
        let query = engine.backing_store().selects.borrow()[0].clone();
        assert_eq!(query.limit, Some(20));
        assert_eq!(query.offset, 0);
        assert_eq!(query.order, Some(("title".to_string(), Direction::Asc)));
    }

    #[test]
    fn reads_are_scoped_to_live_rows_with_soft_delete() {
        let engine = engine(ScriptedStore::default(), articles(true, false));
        engine.get_by_id(&json!(3), &[]).unwrap();
        let query = engine.backing_store().selects.borrow()[0].clone();
        assert!(query.filter.predicates.contains(&Predicate::IsNull {
            column: "deleted_at".to_string(),
            negated: false
        }));
        assert_eq!(query.limit, Some(1));
    }

    #[test]
    fn in_and_between_require_list_shapes() {
        let engine = engine(ScriptedStore::default(), articles(false, false));
        let bad_in = engine.translate_conditions(&[Condition::new("id", "in", 3)]);
        assert!(matches!(bad_in, Err(PersistError::InvalidConditionShape(_))));

        let bad_between =
            engine.translate_conditions(&[Condition::new("id", "between", json!([1, 2, 3]))]);
        assert!(matches!(
            bad_between,
            Err(PersistError::InvalidConditionShape(_))
        ));

        let ok = engine
            .translate_conditions(&[
                Condition::new("id", "not_in", json!([1, 2])),
                Condition::new("title", "%like%", "rust"),
                Condition::new("title", "is not null", Value::Null),
                Condition::new("id", "date>=", "2024-01-01"),
                Condition::new("id", "REGEXP", "^a"),
            ])
            .unwrap();
        assert_eq!(
            ok[0],
            Predicate::In {
                column: "id".to_string(),
                values: vec![json!(1), json!(2)],
                negated: true
            }
        );
        assert_eq!(
            ok[1],
            Predicate::Like {
                column: "title".to_string(),
                pattern: "%rust%".to_string()
            }
        );
        assert!(matches!(ok[2], Predicate::IsNull { negated: true, .. }));
        assert!(matches!(
            ok[3],
            Predicate::Date {
                op: Comparison::Ge,
                ..
            }
        ));
        assert!(matches!(ok[4], Predicate::Literal { ref operator, .. } if operator == "REGEXP"));
    }

    #[test]
    fn store_without_key_inserts_and_stamps_both_timestamps() {
        let store = ScriptedStore {
            generated_key: Some(41),
            ..ScriptedStore::default()
        };
        let engine = engine(store, articles(false, true));
        let stored = engine
            .store(columns(&[("title", json!("first"))]))
            .unwrap();
        assert_eq!(stored["id"], json!(41));
        let inserts = engine.backing_store().inserts.borrow();
        assert_eq!(inserts.len(), 1);
        assert!(inserts[0].contains_key("created_at"));
        assert!(inserts[0].contains_key("updated_at"));
        assert!(engine.backing_store().updates.borrow().is_empty());
    }

    #[test]
    fn store_with_matching_key_updates_only() {
        let store = ScriptedStore {
            update_affects: 1,
            ..ScriptedStore::default()
        };
        let engine = engine(store, articles(false, true));
        engine
            .store(columns(&[("id", json!(5)), ("title", json!("x"))]))
            .unwrap();
        let updates = engine.backing_store().updates.borrow();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].0.contains_key("updated_at"));
        assert!(!updates[0].0.contains_key("created_at"));
        assert_eq!(updates[0].2, Some(1));
        assert!(engine.backing_store().inserts.borrow().is_empty());
    }

    #[test]
    fn store_with_unmatched_key_falls_back_to_insert_without_created_stamp() {
        let store = ScriptedStore {
            update_affects: 0,
            generated_key: Some(77),
            ..ScriptedStore::default()
        };
        let engine = engine(store, articles(false, true));
        let stored = engine
            .store(columns(&[("id", json!(77)), ("title", json!("x"))]))
            .unwrap();
        assert_eq!(stored["id"], json!(77));
        let inserts = engine.backing_store().inserts.borrow();
        assert_eq!(inserts.len(), 1);
        assert!(!inserts[0].contains_key("created_at"));
    }

    #[test]
    fn fallback_insert_keeps_the_supplied_key() {
        let store = ScriptedStore {
            update_affects: 0,
            generated_key: Some(3),
            ..ScriptedStore::default()
        };
        let engine = engine(store, articles(false, false));
        let stored = engine
            .store(columns(&[("id", json!("art-9")), ("title", json!("x"))]))
            .unwrap();
        assert_eq!(stored["id"], json!("art-9"));
        assert_eq!(engine.backing_store().inserts.borrow()[0]["id"], json!("art-9"));
    }

    #[test]
    fn non_positive_generated_key_is_rejected() {
        let store = ScriptedStore {
            generated_key: Some(0),
            ..ScriptedStore::default()
        };
        let engine = engine(store, articles(false, false));
        let err = engine.store(columns(&[("title", json!("x"))])).unwrap_err();
        assert!(matches!(err, PersistError::BackingStore { code: None, .. }));
    }

    #[test]
    fn composite_key_store_looks_up_then_branches() {
        let store = ScriptedStore {
            existing_rows: 0,
            ..ScriptedStore::default()
        };
        let engine = engine(store, memberships());
        engine
            .store(columns(&[
                ("org_id", json!(1)),
                ("user_id", json!(2)),
                ("role", json!("admin")),
            ]))
            .unwrap();
        assert_eq!(engine.backing_store().inserts.borrow().len(), 1);

        let missing = engine.store(columns(&[("org_id", json!(1))])).unwrap_err();
        assert!(matches!(missing, PersistError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn composite_key_store_multiple_is_unsupported() {
        let engine = engine(ScriptedStore::default(), memberships());
        let err = engine
            .store_multiple(vec![columns(&[("org_id", json!(1)), ("user_id", json!(2))])])
            .unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedOperation(_)));
    }

    #[test]
    fn update_with_empty_input_issues_no_write() {
        let engine = engine(ScriptedStore::default(), articles(false, false));
        assert_eq!(
            engine
                .update(ColumnMap::new(), &[Condition::eq("id", 1)])
                .unwrap(),
            0
        );
        assert_eq!(
            engine
                .update(columns(&[("title", json!("t"))]), &[])
                .unwrap(),
            0
        );
        assert!(engine.backing_store().updates.borrow().is_empty());
    }

    #[test]
    fn patch_by_id_requires_key() {
        let engine = engine(ScriptedStore::default(), articles(false, false));
        let err = engine
            .patch_by_id(columns(&[("title", json!("t"))]))
            .unwrap_err();
        assert_eq!(
            err,
            PersistError::MissingPrimaryKey {
                table: "articles".to_string(),
                key: "id".to_string()
            }
        );
    }

    #[test]
    fn soft_delete_updates_marker_scoped_to_live_rows() {
        let store = ScriptedStore {
            update_affects: 2,
            ..ScriptedStore::default()
        };
        let engine = engine(store, articles(true, false));
        let affected = engine
            .delete_by_conditions(&[Condition::new("title", "like%", "a")], Some(5), false)
            .unwrap();
        assert_eq!(affected, 2);
        let updates = engine.backing_store().updates.borrow();
        let (marker, filter, limit) = &updates[0];
        assert!(marker.contains_key("deleted_at"));
        assert_eq!(*limit, Some(5));
        assert!(filter.predicates.contains(&Predicate::IsNull {
            column: "deleted_at".to_string(),
            negated: false
        }));
        assert!(engine.backing_store().deletes.borrow().is_empty());
    }

    #[test]
    fn permanent_delete_bypasses_soft_delete() {
        let engine = engine(ScriptedStore::default(), articles(true, false));
        engine.delete_by_id(&json!(3), true).unwrap();
        assert_eq!(engine.backing_store().deletes.borrow().len(), 1);
        assert!(engine.backing_store().updates.borrow().is_empty());
    }

    #[test]
    fn delete_by_primary_key_requires_every_part() {
        let engine = engine(ScriptedStore::default(), memberships());
        let err = engine
            .delete_by_primary_key(&columns(&[("user_id", json!(2))]), true)
            .unwrap_err();
        assert!(matches!(err, PersistError::MissingPrimaryKey { ref key, .. } if key == "org_id"));
    }

    #[test]
    fn keyword_search_ors_columns_and_ands_tokens() {
        let engine = engine(ScriptedStore::default(), articles(false, false));
        engine
            .search_in_columns(
                &["rust".to_string(), " ".to_string(), "db".to_string()],
                &["title".to_string(), "id".to_string()],
                &[],
                None,
                None,
            )
            .unwrap();
        let query = engine.backing_store().selects.borrow()[0].clone();
        let Predicate::AnyOf(groups) = &query.filter.predicates[0] else {
            panic!("expected any-of predicate");
        };
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn store_failures_are_translated() {
        let store = ScriptedStore {
            fail_insert: Some(StoreError::new(Some(1299), "NOT NULL constraint failed")),
            ..ScriptedStore::default()
        };
        let engine = engine(store, articles(false, false));
        let err = engine.store(columns(&[("title", json!("x"))])).unwrap_err();
        assert_eq!(err.native_code(), Some(1299));
    }
}
