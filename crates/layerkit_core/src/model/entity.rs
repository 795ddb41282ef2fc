//! Dirty-tracking entity.
//!
//! # Responsibility
//! - Hold current attribute values for one record.
//! - Remember the first-divergence baseline of every changed attribute.
//!
//! # Invariants
//! - Only attributes declared by the schema can be read or written.
//! - A recorded baseline is never overwritten by later `set` calls; only
//!   `reset_dirty` or a forced `mark_dirty` replaces it.
//! - `hydrate` never records baselines.

use crate::error::{PersistError, PersistResult};
use crate::model::context::EntityContext;
use crate::model::AttributeMap;
use crate::schema::AttributeSchema;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Value held by an entity attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Plain(Value),
    /// Nested record; demapped through the schema hook before storage.
    Entity(Box<Entity>),
}

impl FieldValue {
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(value) => Some(value),
            Self::Entity(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Plain(Value::Null))
    }

    /// Plain JSON rendering; nested entities become their attribute object.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Plain(value) => value.clone(),
            Self::Entity(nested) => Value::Object(nested.to_attribute_map().into_iter().collect()),
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::Plain(Value::Null)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}

impl From<Entity> for FieldValue {
    fn from(value: Entity) -> Self {
        Self::Entity(Box::new(value))
    }
}

impl PartialEq<Value> for FieldValue {
    fn eq(&self, other: &Value) -> bool {
        matches!(self, Self::Plain(value) if value == other)
    }
}

/// Attribute name -> entity value.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// In-memory record with a dirty overlay.
#[derive(Debug, Clone)]
pub struct Entity {
    schema: Arc<AttributeSchema>,
    values: FieldMap,
    original: FieldMap,
    context: Option<EntityContext>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.schema.table() == other.schema.table() && self.values == other.values
    }
}

impl Entity {
    /// Creates an entity with every declared attribute set to null.
    pub fn new(schema: Arc<AttributeSchema>) -> Self {
        let values = schema
            .attribute_names()
            .map(|name| (name.to_string(), FieldValue::default()))
            .collect();
        Self {
            schema,
            values,
            original: FieldMap::new(),
            context: None,
        }
    }

    /// Creates an entity from freshly loaded data without dirty tracking.
    pub fn from_attributes(schema: Arc<AttributeSchema>, attributes: AttributeMap) -> Self {
        let mut entity = Self::new(schema);
        entity.hydrate(attributes, &[]);
        entity
    }

    pub fn schema(&self) -> &Arc<AttributeSchema> {
        &self.schema
    }

    pub fn context(&self) -> Option<&EntityContext> {
        self.context.as_ref()
    }

    pub fn set_context(&mut self, context: Option<EntityContext>) {
        self.context = context;
    }

    /// Writes one attribute, recording its baseline on the first change.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> PersistResult<()> {
        let value = value.into();
        let current = self
            .values
            .get_mut(name)
            .ok_or_else(|| PersistError::unknown_attribute(self.schema.table(), name))?;

        if *current != value && !self.original.contains_key(name) {
            self.original.insert(name.to_string(), current.clone());
        }
        *current = value;
        Ok(())
    }

    /// Applies [`Self::set`] to every entry not listed in `ignore`.
    pub fn set_many(&mut self, attributes: AttributeMap, ignore: &[&str]) -> PersistResult<()> {
        for (name, value) in attributes {
            if ignore.contains(&name.as_str()) {
                continue;
            }
            self.set(&name, value)?;
        }
        Ok(())
    }

    /// Bulk-assigns loaded data. Undeclared names are skipped and no
    /// baseline is recorded.
    pub fn hydrate(&mut self, attributes: AttributeMap, ignore: &[&str]) {
        for (name, value) in attributes {
            if ignore.contains(&name.as_str()) {
                continue;
            }
            if let Some(slot) = self.values.get_mut(&name) {
                *slot = FieldValue::Plain(value);
            }
        }
    }

    pub fn get(&self, name: &str) -> PersistResult<&FieldValue> {
        self.values
            .get(name)
            .ok_or_else(|| PersistError::unknown_attribute(self.schema.table(), name))
    }

    /// Plain rendering of one attribute.
    pub fn value(&self, name: &str) -> PersistResult<Value> {
        self.get(name).map(FieldValue::to_value)
    }

    /// Whether `name` is a declared attribute.
    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Baseline recorded for `name`, if it is tracked as changed.
    pub fn original(&self, name: &str) -> Option<&FieldValue> {
        self.original.get(name)
    }

    /// Attributes whose current value still differs from their baseline.
    ///
    /// A non-empty `selected` restricts the result to those attributes;
    /// `except` always removes entries.
    pub fn get_dirty(&self, selected: &[&str], except: &[&str]) -> FieldMap {
        self.original
            .iter()
            .filter(|(name, _)| selected.is_empty() || selected.contains(&name.as_str()))
            .filter(|(name, _)| !except.contains(&name.as_str()))
            .filter_map(|(name, baseline)| {
                let current = self.values.get(name)?;
                (current != baseline).then(|| (name.clone(), current.clone()))
            })
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.get_dirty(&[], &[]).is_empty()
    }

    /// Marks attributes as changed.
    ///
    /// With `force`, the baseline is unconditionally replaced by null.
    /// Otherwise an untracked attribute gets the supplied old value (or
    /// null) as its baseline and a tracked one is left alone.
    pub fn mark_dirty(
        &mut self,
        names: &[&str],
        old_values: &AttributeMap,
        force: bool,
    ) -> PersistResult<()> {
        for name in names {
            if !self.has(name) {
                return Err(PersistError::unknown_attribute(self.schema.table(), name));
            }
            if force {
                self.original.insert(name.to_string(), FieldValue::default());
                continue;
            }
            if !self.original.contains_key(*name) {
                let baseline = old_values.get(*name).cloned().unwrap_or(Value::Null);
                self.original
                    .insert(name.to_string(), FieldValue::Plain(baseline));
            }
        }
        Ok(())
    }

    pub fn mark_all_dirty(&mut self, force: bool) {
        let names: Vec<String> = self.values.keys().cloned().collect();
        for name in names {
            if force || !self.original.contains_key(&name) {
                self.original.insert(name, FieldValue::default());
            }
        }
    }

    /// Clears the whole overlay, or only the listed entries.
    pub fn reset_dirty(&mut self, names: &[&str]) {
        if names.is_empty() {
            self.original.clear();
            return;
        }
        for name in names {
            self.original.remove(*name);
        }
    }

    /// Restores `name` to its recorded baseline, keeping it tracked.
    pub fn reset_to_original(&mut self, name: &str) {
        if let Some(baseline) = self.original.get(name) {
            if let Some(slot) = self.values.get_mut(name) {
                *slot = baseline.clone();
            }
        }
    }

    /// Plain snapshot of every attribute.
    pub fn to_attribute_map(&self) -> AttributeMap {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_value()))
            .collect()
    }

    pub fn non_null_attributes(&self) -> AttributeMap {
        self.values
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.clone(), value.to_value()))
            .collect()
    }

    /// Whether every primary-key attribute holds a non-empty value.
    pub fn has_primary_key(&self) -> bool {
        self.schema.primary_key().iter().all(|key| {
            self.values
                .get(key)
                .and_then(FieldValue::as_plain)
                .is_some_and(|value| !is_empty_key(value))
        })
    }
}

/// Null, empty strings and zero do not identify a stored row.
pub(crate) fn is_empty_key(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Number(number) => number.as_f64() == Some(0.0),
        _ => false,
    }
}
