//! Entity construction context and factories.
//!
//! # Responsibility
//! - Carry caller-supplied data used to resolve attribute defaults.
//! - Turn plain attribute maps into entities.
//!
//! # Invariants
//! - Factories never record dirty baselines; output is a clean entity.

use crate::model::entity::Entity;
use crate::model::AttributeMap;
use crate::schema::AttributeSchema;
use serde_json::Value;
use std::sync::Arc;

/// Immutable key/value bag threaded into entity construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityContext {
    data: AttributeMap,
}

impl EntityContext {
    pub fn new(data: AttributeMap) -> Self {
        Self { data }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns a copy with one entry added or replaced.
    pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
        let mut data = self.data.clone();
        data.insert(key.into(), value);
        Self { data }
    }
}

/// Builds entities from rehydrated attribute maps.
pub trait EntityFactory {
    fn create(&self, attributes: AttributeMap, context: Option<EntityContext>) -> Entity;
}

impl<F> EntityFactory for F
where
    F: Fn(AttributeMap, Option<EntityContext>) -> Entity,
{
    fn create(&self, attributes: AttributeMap, context: Option<EntityContext>) -> Entity {
        self(attributes, context)
    }
}

/// Default factory: attributes missing from the input are resolved from the
/// context first, then from the schema defaults, else left null.
#[derive(Debug, Clone)]
pub struct SchemaEntityFactory {
    schema: Arc<AttributeSchema>,
}

impl SchemaEntityFactory {
    pub fn new(schema: Arc<AttributeSchema>) -> Self {
        Self { schema }
    }
}

impl EntityFactory for SchemaEntityFactory {
    fn create(&self, attributes: AttributeMap, context: Option<EntityContext>) -> Entity {
        let mut resolved = AttributeMap::new();
        for name in self.schema.attribute_names() {
            if attributes.contains_key(name) {
                continue;
            }
            let fallback = context
                .as_ref()
                .and_then(|ctx| ctx.get(name))
                .or_else(|| self.schema.defaults().get(name));
            if let Some(value) = fallback {
                resolved.insert(name.to_string(), value.clone());
            }
        }
        resolved.extend(attributes);

        let mut entity = Entity::from_attributes(Arc::clone(&self.schema), resolved);
        entity.set_context(context);
        entity
    }
}
