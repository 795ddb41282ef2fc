//! Attribute-space <-> column-space translation.
//!
//! # Responsibility
//! - Rename attribute maps, conditions and ordering to storage columns.
//! - Rename stored rows back to attributes.
//! - Encode/decode JSON columns around storage calls.
//!
//! # Invariants
//! - Stateless apart from the shared schema; every call is pure.
//! - Primary-key columns without a source value never reach an INSERT.

mod json_columns;

use crate::error::PersistResult;
use crate::model::{AttributeMap, ColumnMap, Entity, FieldMap, FieldValue, Row};
use crate::query::{parse_conditions, Condition, OrderBy, OrderSpec};
use crate::schema::AttributeSchema;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Mapper {
    schema: Arc<AttributeSchema>,
}

impl Mapper {
    pub fn new(schema: Arc<AttributeSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<AttributeSchema> {
        &self.schema
    }

    /// Renames declared attributes to columns, demapping nested entities.
    ///
    /// Key columns whose attribute is absent (or null) are dropped so an
    /// INSERT never carries an explicit null key. The schema's row map hook,
    /// if any, runs last.
    pub fn attributes_to_columns(&self, attributes: &FieldMap) -> ColumnMap {
        let mut columns = ColumnMap::new();
        for (attribute, column) in self.schema.attribute_map() {
            let Some(value) = attributes.get(attribute) else {
                continue;
            };
            let plain = match value {
                FieldValue::Plain(plain) => plain.clone(),
                FieldValue::Entity(nested) => self.demap_nested(attribute, nested),
            };
            columns.insert(column.clone(), plain);
        }

        for key in self.schema.primary_key() {
            let has_value = attributes.get(key).is_some_and(|value| !value.is_null());
            if !has_value {
                if let Ok(column) = self.schema.column_for_attribute(key) {
                    columns.remove(column);
                }
            }
        }

        match self.schema.row_map() {
            Some(hook) => hook(columns, attributes),
            None => columns,
        }
    }

    /// [`Self::attributes_to_columns`] for plain attribute maps.
    pub fn plain_attributes_to_columns(&self, attributes: &AttributeMap) -> ColumnMap {
        let fields: FieldMap = attributes
            .iter()
            .map(|(name, value)| (name.clone(), FieldValue::Plain(value.clone())))
            .collect();
        self.attributes_to_columns(&fields)
    }

    /// Renames a stored row to attributes. `alias_overrides` maps extra
    /// result aliases onto attributes and wins over the regular pass. The
    /// schema's row demap hook, if any, runs last.
    pub fn columns_to_attributes(
        &self,
        row: &Row,
        alias_overrides: &BTreeMap<String, String>,
    ) -> AttributeMap {
        let mut attributes = AttributeMap::new();
        for (attribute, column) in self.schema.attribute_map() {
            if let Some(value) = row.get(column) {
                attributes.insert(attribute.clone(), value.clone());
            }
        }
        for (alias, attribute) in alias_overrides {
            if let Some(value) = row.get(alias) {
                attributes.insert(attribute.clone(), value.clone());
            }
        }
        match self.schema.row_demap() {
            Some(hook) => hook(attributes, row),
            None => attributes,
        }
    }

    /// Decodes JSON columns and renames a row in one step.
    pub fn demap_row(&self, row: Row) -> AttributeMap {
        let decoded = self.decode_json_columns(row);
        self.columns_to_attributes(&decoded, &BTreeMap::new())
    }

    /// Normalizes loosely shaped conditions and renames their fields.
    ///
    /// # Errors
    /// - `InvalidConditionShape` for malformed input.
    /// - `UnknownAttribute` for undeclared attributes.
    pub fn map_conditions(&self, input: &Value) -> PersistResult<Vec<Condition>> {
        let parsed = parse_conditions(input)?;
        self.map_condition_fields(&parsed)
    }

    /// Renames the fields of already-typed conditions.
    pub fn map_condition_fields(&self, conditions: &[Condition]) -> PersistResult<Vec<Condition>> {
        conditions
            .iter()
            .map(|condition| {
                let column = self.schema.column_for_attribute(&condition.field)?;
                Ok(condition.with_field(column))
            })
            .collect()
    }

    /// Resolves a projection to select-list column expressions.
    pub fn column_names<S: AsRef<str>>(&self, attributes: &[S]) -> PersistResult<Vec<String>> {
        self.schema.column_names_for(attributes)
    }

    /// Columns a keyword search looks into. An empty request falls back to
    /// the schema's searchable attributes.
    pub fn searched_columns<S: AsRef<str>>(&self, attributes: &[S]) -> PersistResult<Vec<String>> {
        if attributes.is_empty() {
            return Ok(self
                .schema
                .attribute_map()
                .iter()
                .filter(|(attr, _)| self.schema.is_attribute_searchable(attr))
                .map(|(_, column)| column.clone())
                .collect());
        }
        attributes
            .iter()
            .map(|attr| {
                self.schema
                    .column_for_attribute(attr.as_ref())
                    .map(str::to_string)
            })
            .collect()
    }

    /// Serializes JSON columns present in `columns`. A non-empty `specific`
    /// overrides the schema's JSON column list. Null values are left alone.
    ///
    /// String values are assumed to be JSON text already and are written as
    /// given, so a string such as `"[1]"` reads back as an array.
    pub fn encode_json_columns(&self, mut columns: ColumnMap, specific: &[&str]) -> ColumnMap {
        let targets: Vec<&str> = if specific.is_empty() {
            self.schema.json_columns().iter().map(String::as_str).collect()
        } else {
            specific.to_vec()
        };

        for column in targets {
            let force_object = self.schema.json_force_object_columns().contains(column);
            if let Some(value) = columns.get_mut(column) {
                if value.is_null() {
                    continue;
                }
                *value = json_columns::encode_value(value, force_object);
            }
        }
        columns
    }

    /// Parses JSON columns on a stored row, leniently.
    pub fn decode_json_columns(&self, mut row: Row) -> Row {
        for column in self.schema.json_columns() {
            if let Some(value) = row.remove(column) {
                row.insert(column.clone(), json_columns::decode_value(value));
            }
        }
        row
    }

    /// Renames an ordering request; `None` when no attribute was given.
    pub fn map_order_by(&self, spec: &OrderSpec) -> PersistResult<Option<OrderBy>> {
        let Some(attribute) = spec.attribute.as_deref() else {
            return Ok(None);
        };
        Ok(Some(OrderBy {
            column: self.schema.column_for_attribute(attribute)?.to_string(),
            direction: spec.direction,
        }))
    }

    /// Column-space write set for an entity: dirty attributes (optionally
    /// restricted to `selected`), the key when set, JSON columns encoded.
    pub fn map_entity(
        &self,
        entity: &Entity,
        selected: &[&str],
        except: &[&str],
    ) -> PersistResult<ColumnMap> {
        let mut fields = entity.get_dirty(selected, except);
        for key in self.schema.primary_key() {
            let value = entity.get(key)?;
            if let FieldValue::Plain(plain) = value {
                if !crate::model::entity::is_empty_key(plain) {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }

        let columns = self.attributes_to_columns(&fields);
        Ok(self.encode_json_columns(columns, &[]))
    }

    fn demap_nested(&self, attribute: &str, nested: &Entity) -> Value {
        match self.schema.nested_demap() {
            Some(hook) => hook(attribute, nested),
            None => Value::Object(nested.to_attribute_map().into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Mapper;
    use crate::error::PersistError;
    use crate::model::{AttributeMap, ColumnMap, Entity, FieldMap, FieldValue, Row};
    use crate::query::{Direction, OrderSpec};
    use crate::schema::AttributeSchema;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn schema() -> Arc<AttributeSchema> {
        Arc::new(
            AttributeSchema::builder("profiles")
                .attribute("id", "id")
                .attribute("userName", "user_name")
                .attribute("settings", "settings")
                .attribute("tags", "tags")
                .attribute("owner", "owner_json")
                .json_object_column("settings")
                .json_column("tags")
                .json_column("owner_json")
                .build()
                .unwrap(),
        )
    }

    fn fields(entries: &[(&str, Value)]) -> FieldMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Plain(v.clone())))
            .collect()
    }

    #[test]
    fn attributes_to_columns_renames_and_drops_absent_key() {
        let mapper = Mapper::new(schema());
        let columns = mapper.attributes_to_columns(&fields(&[
            ("userName", json!("ann")),
            ("unknown", json!(1)),
        ]));
        assert_eq!(columns, BTreeMap::from([("user_name".to_string(), json!("ann"))]));

        let with_null_key =
            mapper.attributes_to_columns(&fields(&[("id", json!(null)), ("userName", json!("b"))]));
        assert!(!with_null_key.contains_key("id"));

        let with_key = mapper.attributes_to_columns(&fields(&[("id", json!(9))]));
        assert_eq!(with_key["id"], json!(9));
    }

    #[test]
    fn nested_entity_is_demapped_to_its_attributes() {
        let mapper = Mapper::new(schema());
        let owner = Entity::from_attributes(
            schema(),
            AttributeMap::from([("userName".to_string(), json!("boss"))]),
        );
        let mut input = FieldMap::new();
        input.insert("owner".to_string(), FieldValue::from(owner));
        let columns = mapper.attributes_to_columns(&input);
        assert_eq!(columns["owner_json"]["userName"], json!("boss"));
    }

    #[test]
    fn nested_demap_hook_overrides_default() {
        fn only_name(_: &str, nested: &Entity) -> Value {
            nested.value("userName").unwrap_or(Value::Null)
        }
        let schema = Arc::new(
            AttributeSchema::builder("profiles")
                .attribute("id", "id")
                .attribute("userName", "user_name")
                .attribute("owner", "owner_name")
                .nested_demap(only_name)
                .build()
                .unwrap(),
        );
        let mapper = Mapper::new(Arc::clone(&schema));
        let owner = Entity::from_attributes(
            schema,
            AttributeMap::from([("userName".to_string(), json!("boss"))]),
        );
        let mut input = FieldMap::new();
        input.insert("owner".to_string(), FieldValue::from(owner));
        assert_eq!(mapper.attributes_to_columns(&input)["owner_name"], json!("boss"));
    }

    #[test]
    fn columns_to_attributes_applies_alias_overrides_last() {
        let mapper = Mapper::new(schema());
        let row = Row::from([
            ("id".to_string(), json!(1)),
            ("user_name".to_string(), json!("ann")),
            ("author_name".to_string(), json!("override")),
        ]);
        let plain = mapper.columns_to_attributes(&row, &BTreeMap::new());
        assert_eq!(plain["userName"], json!("ann"));

        let aliases = BTreeMap::from([("author_name".to_string(), "userName".to_string())]);
        let overridden = mapper.columns_to_attributes(&row, &aliases);
        assert_eq!(overridden["userName"], json!("override"));
        assert_eq!(overridden["id"], json!(1));
    }

    #[test]
    fn row_hooks_run_after_the_regular_passes() {
        fn add_slug(mut columns: ColumnMap, attributes: &FieldMap) -> ColumnMap {
            if let Some(FieldValue::Plain(Value::String(name))) = attributes.get("userName") {
                columns.insert("slug".to_string(), json!(name.to_lowercase()));
            }
            columns
        }
        fn split_name(mut attributes: AttributeMap, row: &Row) -> AttributeMap {
            if let Some(Value::String(full)) = row.get("user_name") {
                let first = full.split(' ').next().unwrap_or_default();
                attributes.insert("userName".to_string(), json!(first));
            }
            attributes
        }
        let mapper = Mapper::new(Arc::new(
            AttributeSchema::builder("profiles")
                .attribute("id", "id")
                .attribute("userName", "user_name")
                .row_map(add_slug)
                .row_demap(split_name)
                .build()
                .unwrap(),
        ));

        let mut input = FieldMap::new();
        input.insert("userName".to_string(), FieldValue::from(json!("Ann Lee")));
        let columns = mapper.attributes_to_columns(&input);
        assert_eq!(columns["user_name"], json!("Ann Lee"));
        assert_eq!(columns["slug"], json!("ann lee"));

        let row = Row::from([("user_name".to_string(), json!("Ann Lee"))]);
        let attributes = mapper.columns_to_attributes(&row, &BTreeMap::new());
        assert_eq!(attributes["userName"], json!("Ann"));
    }

    #[test]
    fn string_values_in_json_columns_are_written_as_given() {
        let mapper = Mapper::new(schema());
        let columns = ColumnMap::from([("tags".to_string(), json!("[1]"))]);
        let encoded = mapper.encode_json_columns(columns, &["tags"]);
        assert_eq!(encoded["tags"], json!("[1]"));
        assert_eq!(mapper.decode_json_columns(encoded)["tags"], json!([1]));
    }

    #[test]
    fn map_conditions_flat_and_nested_are_identical() {
        let mapper = Mapper::new(schema());
        let flat = mapper.map_conditions(&json!(["userName", "like%", "an"])).unwrap();
        let nested = mapper
            .map_conditions(&json!([["userName", "like%", "an"]]))
            .unwrap();
        assert_eq!(flat, nested);
        assert_eq!(flat[0].field, "user_name");
    }

    #[test]
    fn map_conditions_rejects_unknown_attribute() {
        let mapper = Mapper::new(schema());
        let err = mapper.map_conditions(&json!(["age", ">", 18])).unwrap_err();
        assert!(matches!(err, PersistError::UnknownAttribute { .. }));
    }

    #[test]
    fn json_round_trip_on_force_object_column() {
        let mapper = Mapper::new(schema());
        let original = json!({"theme": "dark", "sizes": {"a": 1}});
        let columns = BTreeMap::from([
            ("settings".to_string(), original.clone()),
            ("tags".to_string(), json!(["x", "y"])),
        ]);
        let encoded = mapper.encode_json_columns(columns, &[]);
        assert!(encoded["settings"].is_string());
        assert_eq!(encoded["tags"], json!(r#"["x","y"]"#));

        let decoded = mapper.decode_json_columns(encoded);
        assert_eq!(decoded["settings"], original);
        assert_eq!(decoded["tags"], json!(["x", "y"]));
    }

    #[test]
    fn empty_force_object_column_encodes_as_object() {
        let mapper = Mapper::new(schema());
        let encoded = mapper.encode_json_columns(
            BTreeMap::from([("settings".to_string(), json!([]))]),
            &[],
        );
        assert_eq!(encoded["settings"], json!("{}"));
    }

    #[test]
    fn specific_list_limits_encoding() {
        let mapper = Mapper::new(schema());
        let encoded = mapper.encode_json_columns(
            BTreeMap::from([
                ("settings".to_string(), json!({"a": 1})),
                ("tags".to_string(), json!(["x"])),
            ]),
            &["tags"],
        );
        assert_eq!(encoded["settings"], json!({"a": 1}));
        assert!(encoded["tags"].is_string());
    }

    #[test]
    fn decode_leaves_legacy_text_untouched() {
        let mapper = Mapper::new(schema());
        let row = Row::from([("tags".to_string(), json!("legacy, comma, list"))]);
        let decoded = mapper.decode_json_columns(row);
        assert_eq!(decoded["tags"], json!("legacy, comma, list"));
    }

    #[test]
    fn map_order_by_requires_attribute() {
        let mapper = Mapper::new(schema());
        assert_eq!(mapper.map_order_by(&OrderSpec::default()).unwrap(), None);
        let mapped = mapper
            .map_order_by(&OrderSpec::desc("userName"))
            .unwrap()
            .unwrap();
        assert_eq!(mapped.column, "user_name");
        assert_eq!(mapped.direction, Direction::Desc);
        assert!(mapper.map_order_by(&OrderSpec::asc("nope")).is_err());
    }

    #[test]
    fn map_entity_carries_dirty_fields_and_key() {
        let mapper = Mapper::new(schema());
        let mut entity = Entity::from_attributes(
            schema(),
            AttributeMap::from([
                ("id".to_string(), json!(4)),
                ("userName".to_string(), json!("ann")),
            ]),
        );
        entity.set("tags", json!(["t"])).unwrap();

        let columns = mapper.map_entity(&entity, &[], &[]).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns["id"], json!(4));
        assert_eq!(columns["tags"], json!(r#"["t"]"#));
    }
}
