//! Attribute-space persistence facade.
//!
//! # Responsibility
//! - Accept attribute-space requests, map them through [`Mapper`], run them
//!   on [`StorageEngine`] and map results back.
//! - Materialize rows as entities through an injected [`EntityFactory`].
//!
//! # Invariants
//! - `*_raw` reads return plain attribute maps; their siblings return
//!   entities built from the same maps.
//! - A fixed context wins over the per-row context resolver.
//! - A successful `store` leaves the entity clean with its key set.

use crate::config::EngineConfig;
use crate::error::{PersistError, PersistResult};
use crate::mapper::Mapper;
use crate::model::{AttributeMap, ColumnMap, Entity, EntityContext, EntityFactory, Row};
use crate::model::SchemaEntityFactory;
use crate::query::{OrderBy, OrderSpec, Pagination};
use crate::schema::AttributeSchema;
use crate::storage::{BackingStore, StorageEngine};
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Computes a construction context from a row's attributes.
pub type ContextResolver = Box<dyn Fn(&AttributeMap) -> Option<EntityContext>>;

pub struct Repository<S: BackingStore, F: EntityFactory = SchemaEntityFactory> {
    mapper: Mapper,
    engine: StorageEngine<S>,
    factory: F,
    context: Option<EntityContext>,
    context_resolver: Option<ContextResolver>,
}

impl<S: BackingStore> Repository<S, SchemaEntityFactory> {
    /// Repository whose entities are built by [`SchemaEntityFactory`].
    pub fn with_schema_factory(store: S, schema: Arc<AttributeSchema>, config: EngineConfig) -> Self {
        let factory = SchemaEntityFactory::new(Arc::clone(&schema));
        Self::new(store, schema, config, factory)
    }
}

impl<S: BackingStore, F: EntityFactory> Repository<S, F> {
    pub fn new(store: S, schema: Arc<AttributeSchema>, config: EngineConfig, factory: F) -> Self {
        Self {
            mapper: Mapper::new(Arc::clone(&schema)),
            engine: StorageEngine::new(store, schema, config),
            factory,
            context: None,
            context_resolver: None,
        }
    }

    /// Fixed context handed to every materialized entity.
    pub fn with_context(mut self, context: EntityContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Per-row context, used only when no fixed context is set.
    pub fn with_context_resolver(
        mut self,
        resolver: impl Fn(&AttributeMap) -> Option<EntityContext> + 'static,
    ) -> Self {
        self.context_resolver = Some(Box::new(resolver));
        self
    }

    pub fn schema(&self) -> &Arc<AttributeSchema> {
        self.mapper.schema()
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn engine(&self) -> &StorageEngine<S> {
        &self.engine
    }

    /// Builds a fresh, empty entity for this repository's schema.
    pub fn new_entity(&self) -> Entity {
        self.factory.create(AttributeMap::new(), self.context.clone())
    }

    pub fn get_by_id_raw(&self, id: &Value, attributes: &[&str]) -> PersistResult<Option<AttributeMap>> {
        let columns = self.mapper.column_names(attributes)?;
        let row = self.engine.get_by_id(id, &columns)?;
        Ok(row.map(|row| self.mapper.demap_row(row)))
    }

    pub fn get_by_id(&self, id: &Value, attributes: &[&str]) -> PersistResult<Option<Entity>> {
        Ok(self.get_by_id_raw(id, attributes)?.map(|attrs| self.materialize(attrs)))
    }

    /// # Errors
    /// - `MissingPrimaryKey` when `key` lacks a key attribute.
    pub fn get_by_primary_key_raw(
        &self,
        key: &AttributeMap,
        attributes: &[&str],
    ) -> PersistResult<Option<AttributeMap>> {
        let key_columns = self.key_columns(key)?;
        let columns = self.mapper.column_names(attributes)?;
        let row = self.engine.get_by_primary_key(&key_columns, &columns)?;
        Ok(row.map(|row| self.mapper.demap_row(row)))
    }

    pub fn get_by_primary_key(
        &self,
        key: &AttributeMap,
        attributes: &[&str],
    ) -> PersistResult<Option<Entity>> {
        Ok(self
            .get_by_primary_key_raw(key, attributes)?
            .map(|attrs| self.materialize(attrs)))
    }

    /// First row whose `attribute` equals `value`.
    pub fn get_single_raw(
        &self,
        attribute: &str,
        value: &Value,
        attributes: &[&str],
    ) -> PersistResult<Option<AttributeMap>> {
        let column = self.schema().column_for_attribute(attribute)?.to_string();
        let columns = self.mapper.column_names(attributes)?;
        let row = self.engine.get_single(&column, value, &columns)?;
        Ok(row.map(|row| self.mapper.demap_row(row)))
    }

    pub fn get_single(
        &self,
        attribute: &str,
        value: &Value,
        attributes: &[&str],
    ) -> PersistResult<Option<Entity>> {
        Ok(self
            .get_single_raw(attribute, value, attributes)?
            .map(|attrs| self.materialize(attrs)))
    }

    pub fn get_first_raw(
        &self,
        conditions: &Value,
        attributes: &[&str],
        order: Option<&OrderSpec>,
    ) -> PersistResult<Option<AttributeMap>> {
        let rows = self.get_raw(conditions, attributes, Some(Pagination::first(1)), order)?;
        Ok(rows.into_iter().next())
    }

    pub fn get_first(
        &self,
        conditions: &Value,
        attributes: &[&str],
        order: Option<&OrderSpec>,
    ) -> PersistResult<Option<Entity>> {
        Ok(self
            .get_first_raw(conditions, attributes, order)?
            .map(|attrs| self.materialize(attrs)))
    }

    /// Attribute-space conditional read.
    ///
    /// # Errors
    /// - `InvalidConditionShape` / `UnknownAttribute` for bad conditions,
    ///   projections or ordering.
    pub fn get_raw(
        &self,
        conditions: &Value,
        attributes: &[&str],
        pagination: Option<Pagination>,
        order: Option<&OrderSpec>,
    ) -> PersistResult<Vec<AttributeMap>> {
        let mapped = self.mapper.map_conditions(conditions)?;
        let columns = self.mapper.column_names(attributes)?;
        let order = self.map_order(order)?;
        let rows = self
            .engine
            .get_by_conditions(&columns, &mapped, pagination, order)?;
        Ok(self.demap_rows(rows))
    }

    pub fn get(
        &self,
        conditions: &Value,
        attributes: &[&str],
        pagination: Option<Pagination>,
        order: Option<&OrderSpec>,
    ) -> PersistResult<Vec<Entity>> {
        Ok(self
            .get_raw(conditions, attributes, pagination, order)?
            .into_iter()
            .map(|attrs| self.materialize(attrs))
            .collect())
    }

    /// [`Self::get_raw`] keyed by the rendered value of `key_attribute`.
    /// Later rows win on duplicate keys.
    pub fn get_keyed_raw(
        &self,
        conditions: &Value,
        attributes: &[&str],
        key_attribute: &str,
        pagination: Option<Pagination>,
        order: Option<&OrderSpec>,
    ) -> PersistResult<BTreeMap<String, AttributeMap>> {
        self.schema().column_for_attribute(key_attribute)?;
        let mut projection = attributes.to_vec();
        if !projection.is_empty() && !projection.contains(&key_attribute) {
            projection.push(key_attribute);
        }

        let rows = self.get_raw(conditions, &projection, pagination, order)?;
        Ok(rows
            .into_iter()
            .map(|attrs| {
                let key = attrs.get(key_attribute).map(key_text).unwrap_or_default();
                (key, attrs)
            })
            .collect())
    }

    pub fn get_keyed(
        &self,
        conditions: &Value,
        attributes: &[&str],
        key_attribute: &str,
        pagination: Option<Pagination>,
        order: Option<&OrderSpec>,
    ) -> PersistResult<BTreeMap<String, Entity>> {
        Ok(self
            .get_keyed_raw(conditions, attributes, key_attribute, pagination, order)?
            .into_iter()
            .map(|(key, attrs)| (key, self.materialize(attrs)))
            .collect())
    }

    pub fn get_count(&self, conditions: &Value) -> PersistResult<u64> {
        let mapped = self.mapper.map_conditions(conditions)?;
        self.engine.count_by_conditions(&mapped)
    }

    /// Rows where any searched attribute contains every keyword. An empty
    /// `searched` list uses the schema's searchable attributes.
    pub fn search_in_attributes_raw(
        &self,
        keywords: &[&str],
        searched: &[&str],
        attributes: &[&str],
        pagination: Option<Pagination>,
        order: Option<&OrderSpec>,
    ) -> PersistResult<Vec<AttributeMap>> {
        let searched_columns = self.mapper.searched_columns(searched)?;
        let columns = self.mapper.column_names(attributes)?;
        let order = self.map_order(order)?;
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
        let rows = self.engine.search_in_columns(
            &keywords,
            &searched_columns,
            &columns,
            pagination,
            order,
        )?;
        Ok(self.demap_rows(rows))
    }

    pub fn search_in_attributes(
        &self,
        keywords: &[&str],
        searched: &[&str],
        attributes: &[&str],
        pagination: Option<Pagination>,
        order: Option<&OrderSpec>,
    ) -> PersistResult<Vec<Entity>> {
        Ok(self
            .search_in_attributes_raw(keywords, searched, attributes, pagination, order)?
            .into_iter()
            .map(|attrs| self.materialize(attrs))
            .collect())
    }

    /// Persists the entity's dirty state, writes the key back and clears
    /// the dirty overlay.
    pub fn store(&self, entity: &mut Entity) -> PersistResult<()> {
        let columns = self.mapper.map_entity(entity, &[], &[])?;
        let stored = self.engine.store(columns)?;
        self.finish_store(entity, &stored)
    }

    /// # Errors
    /// - `UnsupportedOperation` for composite-key schemas.
    pub fn store_multiple(&self, entities: &mut [Entity]) -> PersistResult<()> {
        let column_sets = entities
            .iter()
            .map(|entity| self.mapper.map_entity(entity, &[], &[]))
            .collect::<PersistResult<Vec<ColumnMap>>>()?;
        let stored = self.engine.store_multiple(column_sets)?;
        for (entity, columns) in entities.iter_mut().zip(stored.iter()) {
            self.finish_store(entity, columns)?;
        }
        Ok(())
    }

    /// Writes the dirty attributes (optionally only `selected`) to the row
    /// addressed by the entity's key and clears what was written.
    pub fn patch_by_id(&self, entity: &mut Entity, selected: &[&str]) -> PersistResult<u64> {
        let columns = self.mapper.map_entity(entity, selected, &[])?;
        let affected = self.engine.patch_by_id(columns)?;
        entity.reset_dirty(selected);
        debug!(
            "event=patch module=repo status=ok table={} affected={}",
            self.schema().table(),
            affected
        );
        Ok(affected)
    }

    /// Writes the entity's dirty attributes (optionally only `selected`)
    /// to every row matching `conditions` and clears what was written.
    /// The key is never written.
    pub fn patch_by_conditions(
        &self,
        entity: &mut Entity,
        selected: &[&str],
        conditions: &Value,
    ) -> PersistResult<u64> {
        let key_attributes: Vec<&str> = self
            .schema()
            .primary_key()
            .iter()
            .map(String::as_str)
            .collect();
        let fields = entity.get_dirty(selected, &key_attributes);
        let written: Vec<String> = fields.keys().cloned().collect();
        let columns = self.mapper.attributes_to_columns(&fields);
        let columns = self.mapper.encode_json_columns(columns, &[]);
        let mapped = self.mapper.map_conditions(conditions)?;
        let affected = self.engine.patch_by_conditions(columns, &mapped)?;

        if !written.is_empty() {
            let written: Vec<&str> = written.iter().map(String::as_str).collect();
            entity.reset_dirty(&written);
        }
        Ok(affected)
    }

    pub fn delete_by_id(&self, id: &Value, permanent: bool) -> PersistResult<u64> {
        self.engine.delete_by_id(id, permanent)
    }

    /// Deletes the row addressed by the entity's key attributes.
    pub fn delete(&self, entity: &Entity, permanent: bool) -> PersistResult<u64> {
        let mut key = AttributeMap::new();
        for attribute in self.schema().primary_key() {
            key.insert(attribute.clone(), entity.value(attribute)?);
        }
        self.delete_by_primary_key(&key, permanent)
    }

    /// # Errors
    /// - `MissingPrimaryKey` when `key` lacks a key attribute.
    pub fn delete_by_primary_key(&self, key: &AttributeMap, permanent: bool) -> PersistResult<u64> {
        let key_columns = self.key_columns(key)?;
        self.engine.delete_by_primary_key(&key_columns, permanent)
    }

    pub fn delete_by_conditions(
        &self,
        conditions: &Value,
        limit: Option<u64>,
        permanent: bool,
    ) -> PersistResult<u64> {
        let mapped = self.mapper.map_conditions(conditions)?;
        self.engine.delete_by_conditions(&mapped, limit, permanent)
    }

    pub fn begin(&self) -> PersistResult<()> {
        self.engine.begin()
    }

    pub fn commit(&self) -> PersistResult<()> {
        self.engine.commit()
    }

    pub fn rollback(&self) -> PersistResult<()> {
        self.engine.rollback()
    }

    fn materialize(&self, attributes: AttributeMap) -> Entity {
        let context = match &self.context {
            Some(context) => Some(context.clone()),
            None => self
                .context_resolver
                .as_ref()
                .and_then(|resolve| resolve(&attributes)),
        };
        self.factory.create(attributes, context)
    }

    fn demap_rows(&self, rows: Vec<Row>) -> Vec<AttributeMap> {
        rows.into_iter()
            .map(|row| self.mapper.demap_row(row))
            .collect()
    }

    fn map_order(&self, order: Option<&OrderSpec>) -> PersistResult<Option<OrderBy>> {
        match order {
            Some(spec) => self.mapper.map_order_by(spec),
            None => Ok(None),
        }
    }

    fn key_columns(&self, key: &AttributeMap) -> PersistResult<ColumnMap> {
        let schema = self.schema();
        let mut columns = ColumnMap::new();
        for attribute in schema.primary_key() {
            let value = key
                .get(attribute)
                .filter(|value| !value.is_null())
                .ok_or_else(|| PersistError::missing_primary_key(schema.table(), attribute))?;
            columns.insert(
                schema.column_for_attribute(attribute)?.to_string(),
                value.clone(),
            );
        }
        Ok(columns)
    }

    fn finish_store(&self, entity: &mut Entity, stored: &ColumnMap) -> PersistResult<()> {
        let schema = self.schema();
        let mut key = AttributeMap::new();
        for attribute in schema.primary_key() {
            let column = schema.column_for_attribute(attribute)?;
            if let Some(value) = stored.get(column) {
                key.insert(attribute.clone(), value.clone());
            }
        }
        entity.hydrate(key, &[]);
        entity.reset_dirty(&[]);
        Ok(())
    }
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
