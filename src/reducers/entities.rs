//! Request-lifecycle state for single resources, keyed or not.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::{Handler, Reducer, SliceConfig, SliceState, key_from_meta};
use crate::action::{Action, ActionType, Lifecycle, RequestTypes};

/// Field used for success payloads that are not objects (e.g. a normalized id).
pub const RESULT_FIELD: &str = "result";

/// `{ loading, loaded, ...success payload fields }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestRecord {
    /// A request for this record is in flight.
    pub loading: bool,
    /// At least one SUCCESS has been reduced into this record.
    pub loaded: bool,
    /// Fields accumulated from success payloads.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl RequestRecord {
    /// Whether the record holds any field, seeded or received.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Stored field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Shallow merge of a success payload over the record.
    fn absorb(&mut self, payload: &Value) {
        match payload {
            Value::Object(fields) => {
                for (name, value) in fields {
                    if name != "loading" && name != "loaded" {
                        self.data.insert(name.clone(), value.clone());
                    }
                }
            }
            Value::Null => {}
            other => {
                self.data.insert(RESULT_FIELD.into(), other.clone());
            }
        }
    }
}

/// Reducer created by [`entities`].
pub struct EntitiesReducer {
    config: SliceConfig<RequestRecord>,
    initial: RequestRecord,
}

/// Create a reducer tracking `{ loading, ...data }` for the `types` lifecycle.
pub fn entities(types: RequestTypes) -> EntitiesReducer {
    EntitiesReducer {
        config: SliceConfig::new(types),
        initial: RequestRecord::default(),
    }
}

impl EntitiesReducer {
    /// Keep one record per [`crate::action::ActionMeta::key`].
    pub fn keyed(self) -> Self {
        self.keyed_by(key_from_meta)
    }

    /// Keep one record per key computed by `key_fn`.
    pub fn keyed_by<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&Action) -> Option<String> + Send + Sync + 'static,
    {
        self.config.key = Some(Arc::new(key_fn));
        self
    }

    /// Start every record from `initial` instead of an empty one.
    pub fn with_initial(mut self, initial: RequestRecord) -> Self {
        self.initial = initial;
        self
    }

    /// Delegate actions of type `ty` to `handler`.
    pub fn on<F>(mut self, ty: impl Into<ActionType>, handler: F) -> Self
    where
        F: Fn(&mut SliceState<RequestRecord>, &Value, &Action) + Send + Sync + 'static,
    {
        let handler: Handler<SliceState<RequestRecord>> = Arc::new(handler);
        self.config.handlers.insert(ty.into(), handler);
        self
    }

    /// Key of the record `action` touches; `None` for unkeyed slices.
    pub fn record_key(&self, action: &Action) -> Option<String> {
        self.config.key_of(action)
    }

    /// Lifecycle triple this reducer follows.
    pub fn types(&self) -> &RequestTypes {
        &self.config.types
    }
}

impl Reducer for EntitiesReducer {
    type State = SliceState<RequestRecord>;

    fn initial_state(&self) -> Self::State {
        self.config.initial_state(self.initial.clone())
    }

    fn reduce(&self, state: &mut Self::State, action: &Action) {
        let Some(phase) = self.config.types.classify(action) else {
            self.config.delegate(state, action);
            return;
        };

        let Some(record) = self
            .config
            .record_mut(state, action, || self.initial.clone())
        else {
            return;
        };

        match phase {
            Lifecycle::Start => record.loading = true,
            Lifecycle::Success(payload) => {
                record.absorb(payload);
                record.loading = false;
                record.loaded = true;
            }
            Lifecycle::Failure(_) => record.loading = false,
        }
    }
}
