//! Flattening nested payloads into per-type entity maps, and rebuilding them.
//!
//! Both directions walk the same [`SchemaNode`] graph: [`normalize`] replaces every entity it
//! meets by its id and collects the record, [`denormalize`] looks ids back up and expands their
//! relations.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{
    error::NormalizeError,
    schema::{SchemaNode, SchemaRegistry},
    store::entities::merge_value,
};

/// Entity records keyed by type name, then by canonical id.
pub type Entities = IndexMap<String, IndexMap<String, Value>>;

/// Output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Payload shape with entities replaced by their ids.
    pub result: Value,
    /// Every entity found in the payload.
    pub entities: Entities,
}

/// Canonical store key of an id: strings as-is, numbers in their decimal form.
pub fn entity_key(id: &Value) -> Option<String> {
    match id {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Flatten `payload` following `schema`.
///
/// Children are normalized before their parent is recorded, so a stored parent only ever holds
/// child ids in its relation fields. An entity met twice is merged field by field, the later
/// occurrence winning.
pub fn normalize(
    payload: &Value,
    schema: &SchemaNode,
    registry: &SchemaRegistry,
) -> Result<Normalized, NormalizeError> {
    let mut entities = Entities::new();
    let result = visit(payload, schema, registry, &mut entities)?;
    Ok(Normalized { result, entities })
}

fn visit(
    value: &Value,
    schema: &SchemaNode,
    registry: &SchemaRegistry,
    entities: &mut Entities,
) -> Result<Value, NormalizeError> {
    match schema {
        SchemaNode::Entity(name) => visit_entity(value, name, registry, entities),
        SchemaNode::Array(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| visit(item, inner, registry, entities))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        },
        SchemaNode::Object(fields) => match value {
            Value::Object(map) => {
                let mut out = map.clone();
                for (field, node) in fields {
                    if let Some(child) = map.get(field) {
                        out.insert(field.clone(), visit(child, node, registry, entities)?);
                    }
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        },
    }
}

fn visit_entity(
    value: &Value,
    name: &str,
    registry: &SchemaRegistry,
    entities: &mut Entities,
) -> Result<Value, NormalizeError> {
    let map = match value {
        Value::Object(map) => map,
        // Already an id, or an absent reference.
        Value::String(_) | Value::Number(_) | Value::Null => return Ok(value.clone()),
        other => {
            return Err(NormalizeError::UnexpectedShape {
                entity: name.into(),
                found: value_kind(other),
            });
        }
    };

    let schema = registry.entity(name)?;
    let id = map
        .get(&schema.id_attribute)
        .filter(|id| !id.is_null())
        .ok_or_else(|| NormalizeError::MissingId {
            entity: name.into(),
            attribute: schema.id_attribute.clone(),
        })?;
    let key = entity_key(id).ok_or_else(|| NormalizeError::InvalidId {
        entity: name.into(),
        id: id.to_string(),
    })?;

    let mut record = map.clone();
    for (field, node) in &schema.relations {
        if let Some(child) = map.get(field) {
            record.insert(field.clone(), visit(child, node, registry, entities)?);
        }
    }

    let slot = entities.entry(name.to_string()).or_default();
    match slot.get_mut(&key) {
        Some(existing) => merge_value(existing, Value::Object(record)),
        None => {
            slot.insert(key, Value::Object(record));
        }
    }

    Ok(id.clone())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Rebuild the nested shape of `input` (an id, an array of ids, or a normalized result).
///
/// Ids with no stored record become `null`. A reference to an entity already being expanded
/// higher up the same path is left as its id.
pub fn denormalize(
    input: &Value,
    schema: &SchemaNode,
    registry: &SchemaRegistry,
    entities: &Entities,
) -> Value {
    Denormalizer {
        registry,
        entities,
        path: Vec::new(),
    }
    .unvisit(input, schema)
}

struct Denormalizer<'a> {
    registry: &'a SchemaRegistry,
    entities: &'a Entities,
    path: Vec<(&'a str, String)>,
}

impl<'a> Denormalizer<'a> {
    fn unvisit(&mut self, input: &Value, schema: &'a SchemaNode) -> Value {
        match schema {
            SchemaNode::Entity(name) => self.unvisit_entity(input, name),
            SchemaNode::Array(inner) => match input {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| self.unvisit(item, inner))
                        .collect(),
                ),
                other => other.clone(),
            },
            SchemaNode::Object(fields) => match input {
                Value::Object(map) => Value::Object(self.unvisit_fields(map, fields)),
                other => other.clone(),
            },
        }
    }

    fn unvisit_entity(&mut self, input: &Value, name: &'a str) -> Value {
        let record = match input {
            Value::Null => return Value::Null,
            // Inline entity that was never normalized: expand its relations in place.
            Value::Object(_) => input,
            id => {
                let Some(key) = entity_key(id) else {
                    return id.clone();
                };
                if self.path.iter().any(|(ty, k)| *ty == name && *k == key) {
                    return id.clone();
                }
                let entities = self.entities;
                let Some(record) = entities.get(name).and_then(|map| map.get(&key)) else {
                    return Value::Null;
                };
                self.path.push((name, key));
                let expanded = self.expand(record, name);
                self.path.pop();
                return expanded;
            }
        };

        self.expand(record, name)
    }

    fn expand(&mut self, record: &Value, name: &'a str) -> Value {
        let registry = self.registry;
        let (Value::Object(map), Ok(schema)) = (record, registry.entity(name)) else {
            return record.clone();
        };
        Value::Object(self.unvisit_fields(map, &schema.relations))
    }

    fn unvisit_fields(
        &mut self,
        map: &Map<String, Value>,
        fields: &'a IndexMap<String, SchemaNode>,
    ) -> Map<String, Value> {
        let mut out = map.clone();
        for (field, node) in fields {
            if let Some(child) = map.get(field) {
                out.insert(field.clone(), self.unvisit(child, node));
            }
        }
        out
    }
}
