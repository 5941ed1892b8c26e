//! The normalized entity store and its non-destructive merge.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::{
    action::{Action, ActionBody},
    normalize::{Entities, entity_key},
    reducers::Reducer,
};

/// Merge `incoming` into `target`.
///
/// Objects merge key by key, recursively; fields missing from `incoming` survive. Anything
/// else (arrays, scalars, null) replaces the target value.
pub fn merge_value(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(fields)) => {
            for (name, value) in fields {
                match existing.get_mut(&name) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        existing.insert(name, value);
                    }
                }
            }
        }
        (target, incoming) => *target = incoming,
    }
}

/// Every entity received so far, by type then canonical id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EntityStore {
    entities: Entities,
}

impl EntityStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge freshly normalized entities; newer fields win, older fields survive.
    pub fn merge(&mut self, incoming: Entities) {
        for (entity_type, records) in incoming {
            let slot = self.entities.entry(entity_type).or_default();
            for (id, record) in records {
                match slot.get_mut(&id) {
                    Some(existing) => merge_value(existing, record),
                    None => {
                        slot.insert(id, record);
                    }
                }
            }
        }
    }

    /// Record of `entity_type` with this id (string or number).
    pub fn get(&self, entity_type: &str, id: &Value) -> Option<&Value> {
        let key = entity_key(id)?;
        self.entities.get(entity_type)?.get(&key)
    }

    /// All records of one type.
    pub fn of_type(&self, entity_type: &str) -> Option<&IndexMap<String, Value>> {
        self.entities.get(entity_type)
    }

    /// Borrow the raw maps, e.g. to denormalize against them.
    pub fn as_entities(&self) -> &Entities {
        &self.entities
    }

    /// Drop one record, returning it.
    pub fn remove(&mut self, entity_type: &str, id: &Value) -> Option<Value> {
        let key = entity_key(id)?;
        self.entities.get_mut(entity_type)?.shift_remove(&key)
    }

    /// Drop every record of one type.
    pub fn clear_type(&mut self, entity_type: &str) {
        self.entities.shift_remove(entity_type);
    }
}

/// Merges the entities carried by SUCCESS actions; every other action is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityStoreReducer;

impl Reducer for EntityStoreReducer {
    type State = EntityStore;

    fn initial_state(&self) -> Self::State {
        EntityStore::new()
    }

    fn reduce(&self, state: &mut Self::State, action: &Action) {
        if let ActionBody::Success {
            entities: Some(entities),
            ..
        } = &action.body
        {
            state.merge(entities.clone());
        }
    }
}
