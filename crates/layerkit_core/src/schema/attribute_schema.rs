//! Per-entity-type attribute/column descriptor.
//!
//! # Responsibility
//! - Map application attribute names to storage column names and back.
//! - Carry the behavioral flags the engine consults (keys, timestamps,
//!   soft delete, JSON columns, error translations).
//!
//! # Invariants
//! - Immutable after `AttributeSchemaBuilder::build`.
//! - Every primary-key, mandatory, searchable and defaulted attribute is
//!   declared in the attribute map.
//! - `is_auto_increment()` is false whenever the key has more than one
//!   attribute, regardless of the configured flag.

use crate::error::{PersistError, PersistResult};
use crate::model::{AttributeMap, ColumnMap, Entity, FieldMap, Row};
use crate::schema::error_table::ErrorCodeTable;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};

/// Attribute-list marker meaning "every visible attribute".
pub const WILDCARD: &str = "*";

/// Hook converting a nested entity held in an attribute into a column value.
pub type NestedDemap = fn(attribute: &str, nested: &Entity) -> Value;

/// Hook run after the regular attribute-to-column pass of a write.
pub type RowMap = fn(columns: ColumnMap, attributes: &FieldMap) -> ColumnMap;

/// Hook run after the regular column-to-attribute pass of a read.
pub type RowDemap = fn(attributes: AttributeMap, row: &Row) -> AttributeMap;

pub struct AttributeSchema {
    table: String,
    primary_key: Vec<String>,
    auto_increment: bool,
    attributes: Vec<(String, String)>,
    column_by_attribute: HashMap<String, String>,
    hidden_columns: BTreeSet<String>,
    json_columns: BTreeSet<String>,
    json_force_object_columns: BTreeSet<String>,
    mandatory_attributes: Vec<String>,
    column_aliases: BTreeMap<String, String>,
    searchable_attributes: BTreeSet<String>,
    defaults: AttributeMap,
    has_timestamps: bool,
    has_soft_delete: bool,
    error_table: ErrorCodeTable,
    nested_demap: Option<NestedDemap>,
    row_map: Option<RowMap>,
    row_demap: Option<RowDemap>,
}

impl Debug for AttributeSchema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeSchema")
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("auto_increment", &self.is_auto_increment())
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl AttributeSchema {
    pub fn builder(table: impl Into<String>) -> AttributeSchemaBuilder {
        AttributeSchemaBuilder::new(table)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Primary-key attribute names, in declaration order.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn primary_key_columns(&self) -> Vec<String> {
        self.primary_key
            .iter()
            .filter_map(|attr| self.column_by_attribute.get(attr).cloned())
            .collect()
    }

    pub fn is_composite_key(&self) -> bool {
        self.primary_key.len() > 1
    }

    pub fn is_auto_increment(&self) -> bool {
        !self.is_composite_key() && self.auto_increment
    }

    pub fn has_timestamps(&self) -> bool {
        self.has_timestamps
    }

    pub fn has_soft_delete(&self) -> bool {
        self.has_soft_delete
    }

    pub fn hidden_columns(&self) -> &BTreeSet<String> {
        &self.hidden_columns
    }

    pub fn json_columns(&self) -> &BTreeSet<String> {
        &self.json_columns
    }

    pub fn json_force_object_columns(&self) -> &BTreeSet<String> {
        &self.json_force_object_columns
    }

    pub fn column_aliases(&self) -> &BTreeMap<String, String> {
        &self.column_aliases
    }

    pub fn error_table(&self) -> &ErrorCodeTable {
        &self.error_table
    }

    pub fn defaults(&self) -> &AttributeMap {
        &self.defaults
    }

    pub fn nested_demap(&self) -> Option<NestedDemap> {
        self.nested_demap
    }

    pub fn row_map(&self) -> Option<RowMap> {
        self.row_map
    }

    pub fn row_demap(&self) -> Option<RowDemap> {
        self.row_demap
    }

    /// Declared mandatory attributes with every key attribute unioned in.
    pub fn mandatory_attributes(&self) -> Vec<String> {
        let mut mandatory = self.mandatory_attributes.clone();
        for key in &self.primary_key {
            if !mandatory.contains(key) {
                mandatory.push(key.clone());
            }
        }
        mandatory
    }

    pub fn is_attribute_searchable(&self, attribute: &str) -> bool {
        self.searchable_attributes.contains(attribute)
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.column_by_attribute.contains_key(attribute)
    }

    /// Every declared attribute name, hidden ones included.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(attr, _)| attr.as_str())
    }

    /// `(attribute, column)` pairs in declaration order, hidden ones included.
    pub fn attribute_map(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Every column that is not hidden.
    pub fn all_columns(&self) -> Vec<String> {
        self.visible_pairs().map(|(_, column)| column.clone()).collect()
    }

    pub fn column_for_attribute(&self, attribute: &str) -> PersistResult<&str> {
        self.column_by_attribute
            .get(attribute)
            .map(String::as_str)
            .ok_or_else(|| PersistError::unknown_attribute(&self.table, attribute))
    }

    pub fn attribute_for_column(&self, column: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(_, mapped)| mapped == column)
            .map(|(attr, _)| attr.as_str())
    }

    /// Resolves a projection to `(attribute, column)` pairs.
    ///
    /// An empty request or one containing [`WILDCARD`] selects every
    /// visible attribute. Otherwise the requested attributes plus the
    /// mandatory ones are selected. Aliased columns are substituted last.
    ///
    /// # Errors
    /// - `UnknownAttribute` when a requested name is not declared.
    pub fn columns_for<S: AsRef<str>>(
        &self,
        attribute_names: &[S],
    ) -> PersistResult<Vec<(String, String)>> {
        let select_all = attribute_names.is_empty()
            || attribute_names.iter().any(|name| name.as_ref() == WILDCARD);

        let pairs: Vec<(String, String)> = if select_all {
            self.visible_pairs().cloned().collect()
        } else {
            let mut wanted: Vec<String> = Vec::new();
            for name in attribute_names {
                let name = name.as_ref();
                if !self.has_attribute(name) {
                    return Err(PersistError::unknown_attribute(&self.table, name));
                }
                if !wanted.iter().any(|existing| existing == name) {
                    wanted.push(name.to_string());
                }
            }
            for name in self.mandatory_attributes() {
                if !wanted.contains(&name) {
                    wanted.push(name);
                }
            }
            self.attributes
                .iter()
                .filter(|(attr, _)| wanted.contains(attr))
                .cloned()
                .collect()
        };

        Ok(pairs
            .into_iter()
            .map(|(attr, column)| {
                let column = self.column_aliases.get(&column).cloned().unwrap_or(column);
                (attr, column)
            })
            .collect())
    }

    /// Like [`Self::columns_for`] but returns only column expressions and
    /// always carries every primary-key column.
    pub fn column_names_for<S: AsRef<str>>(
        &self,
        attribute_names: &[S],
    ) -> PersistResult<Vec<String>> {
        let pairs = self.columns_for(attribute_names)?;
        let missing_keys: Vec<String> = self
            .primary_key
            .iter()
            .filter(|key| !pairs.iter().any(|(attr, _)| attr == *key))
            .filter_map(|key| self.column_by_attribute.get(key).cloned())
            .collect();

        let mut columns: Vec<String> = pairs.into_iter().map(|(_, column)| column).collect();
        columns.extend(missing_keys);
        Ok(columns)
    }

    fn visible_pairs(&self) -> impl Iterator<Item = &(String, String)> {
        self.attributes
            .iter()
            .filter(|(_, column)| !self.hidden_columns.contains(column))
    }
}

/// Validating builder for [`AttributeSchema`].
pub struct AttributeSchemaBuilder {
    table: String,
    primary_key: Vec<String>,
    auto_increment: bool,
    attributes: Vec<(String, String)>,
    hidden_columns: BTreeSet<String>,
    json_columns: BTreeSet<String>,
    json_force_object_columns: BTreeSet<String>,
    mandatory_attributes: Vec<String>,
    column_aliases: BTreeMap<String, String>,
    searchable_attributes: BTreeSet<String>,
    defaults: AttributeMap,
    has_timestamps: bool,
    has_soft_delete: bool,
    error_table: ErrorCodeTable,
    nested_demap: Option<NestedDemap>,
    row_map: Option<RowMap>,
    row_demap: Option<RowDemap>,
}

impl AttributeSchemaBuilder {
    fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: vec!["id".to_string()],
            auto_increment: true,
            attributes: Vec::new(),
            hidden_columns: BTreeSet::new(),
            json_columns: BTreeSet::new(),
            json_force_object_columns: BTreeSet::new(),
            mandatory_attributes: Vec::new(),
            column_aliases: BTreeMap::new(),
            searchable_attributes: BTreeSet::new(),
            defaults: AttributeMap::new(),
            has_timestamps: false,
            has_soft_delete: false,
            error_table: ErrorCodeTable::new(),
            nested_demap: None,
            row_map: None,
            row_demap: None,
        }
    }

    /// Declares an attribute; redeclaring replaces its column.
    pub fn attribute(mut self, attribute: impl Into<String>, column: impl Into<String>) -> Self {
        let attribute = attribute.into();
        let column = column.into();
        match self.attributes.iter_mut().find(|(attr, _)| *attr == attribute) {
            Some(existing) => existing.1 = column,
            None => self.attributes.push((attribute, column)),
        }
        self
    }

    pub fn primary_key<S: AsRef<str>>(mut self, attributes: &[S]) -> Self {
        self.primary_key = attributes.iter().map(|a| a.as_ref().to_string()).collect();
        self
    }

    pub fn auto_increment(mut self, enabled: bool) -> Self {
        self.auto_increment = enabled;
        self
    }

    pub fn hidden_column(mut self, column: impl Into<String>) -> Self {
        self.hidden_columns.insert(column.into());
        self
    }

    pub fn json_column(mut self, column: impl Into<String>) -> Self {
        self.json_columns.insert(column.into());
        self
    }

    /// JSON column always encoded with an object shape. Also registers it as
    /// a JSON column.
    pub fn json_object_column(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.json_columns.insert(column.clone());
        self.json_force_object_columns.insert(column);
        self
    }

    pub fn mandatory(mut self, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        if !self.mandatory_attributes.contains(&attribute) {
            self.mandatory_attributes.push(attribute);
        }
        self
    }

    /// Substitutes `expression` for `column` in select lists.
    pub fn column_alias(mut self, column: impl Into<String>, expression: impl Into<String>) -> Self {
        self.column_aliases.insert(column.into(), expression.into());
        self
    }

    pub fn searchable(mut self, attribute: impl Into<String>) -> Self {
        self.searchable_attributes.insert(attribute.into());
        self
    }

    pub fn default_value(mut self, attribute: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(attribute.into(), value);
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.has_timestamps = enabled;
        self
    }

    pub fn soft_delete(mut self, enabled: bool) -> Self {
        self.has_soft_delete = enabled;
        self
    }

    pub fn error_table(mut self, table: ErrorCodeTable) -> Self {
        self.error_table = table;
        self
    }

    pub fn nested_demap(mut self, hook: NestedDemap) -> Self {
        self.nested_demap = Some(hook);
        self
    }

    /// Post-processes every mapped write set.
    pub fn row_map(mut self, hook: RowMap) -> Self {
        self.row_map = Some(hook);
        self
    }

    /// Post-processes every demapped row.
    pub fn row_demap(mut self, hook: RowDemap) -> Self {
        self.row_demap = Some(hook);
        self
    }

    /// Validates cross references and freezes the schema.
    ///
    /// # Errors
    /// - `UnknownAttribute` when a key, mandatory, searchable or defaulted
    ///   attribute is not declared.
    /// - `UnsupportedOperation` when the primary key is empty.
    pub fn build(self) -> PersistResult<AttributeSchema> {
        if self.primary_key.is_empty() {
            return Err(PersistError::UnsupportedOperation(format!(
                "schema `{}` declares no primary key",
                self.table
            )));
        }

        let column_by_attribute: HashMap<String, String> =
            self.attributes.iter().cloned().collect();

        let referenced = self
            .primary_key
            .iter()
            .chain(self.mandatory_attributes.iter())
            .chain(self.searchable_attributes.iter())
            .chain(self.defaults.keys());
        for attribute in referenced {
            if !column_by_attribute.contains_key(attribute) {
                return Err(PersistError::unknown_attribute(&self.table, attribute));
            }
        }

        Ok(AttributeSchema {
            table: self.table,
            primary_key: self.primary_key,
            auto_increment: self.auto_increment,
            attributes: self.attributes,
            column_by_attribute,
            hidden_columns: self.hidden_columns,
            json_columns: self.json_columns,
            json_force_object_columns: self.json_force_object_columns,
            mandatory_attributes: self.mandatory_attributes,
            column_aliases: self.column_aliases,
            searchable_attributes: self.searchable_attributes,
            defaults: self.defaults,
            has_timestamps: self.has_timestamps,
            has_soft_delete: self.has_soft_delete,
            error_table: self.error_table,
            nested_demap: self.nested_demap,
            row_map: self.row_map,
            row_demap: self.row_demap,
        })
    }
}
