//! Generic reducer creators tracking request lifecycles per feature slice.

pub mod entities;
pub mod paginate;

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::action::{Action, ActionType, RequestTypes};

pub use self::entities::{EntitiesReducer, RequestRecord, entities};
pub use self::paginate::{PageRecord, PaginateReducer, paginate};

/// Maps an action to the key of the record it touches.
pub type KeyFn = Arc<dyn Fn(&Action) -> Option<String> + Send + Sync>;

/// Extra handler for a non-lifecycle action: receives the slice, the payload and the action.
pub type Handler<S> = Arc<dyn Fn(&mut S, &Value, &Action) + Send + Sync>;

/// A pure state transition driven by actions.
pub trait Reducer: Send + Sync {
    /// State owned by this reducer.
    type State;

    /// State before any action has been seen.
    fn initial_state(&self) -> Self::State;

    /// Apply `action`. Actions the reducer does not handle leave `state` untouched.
    fn reduce(&self, state: &mut Self::State, action: &Action);
}

/// A slice holding either one record or one record per key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SliceState<R> {
    /// Unkeyed slice.
    Single(R),
    /// Keyed slice; records appear on the first action for their key.
    Keyed(IndexMap<String, R>),
}

impl<R> SliceState<R> {
    /// Record for `key` (ignored by unkeyed slices).
    pub fn get(&self, key: Option<&str>) -> Option<&R> {
        match self {
            SliceState::Single(record) => Some(record),
            SliceState::Keyed(records) => key.and_then(|key| records.get(key)),
        }
    }
}

/// Key the action's metadata carries, as set by the action creators.
pub fn key_from_meta(action: &Action) -> Option<String> {
    action.meta.key.clone()
}

/// Plumbing shared by both reducer creators.
struct SliceConfig<R> {
    types: RequestTypes,
    key: Option<KeyFn>,
    handlers: IndexMap<ActionType, Handler<SliceState<R>>>,
}

impl<R> SliceConfig<R> {
    fn new(types: RequestTypes) -> Self {
        Self {
            types,
            key: None,
            handlers: IndexMap::new(),
        }
    }

    fn initial_state(&self, initial: R) -> SliceState<R> {
        match self.key {
            Some(_) => SliceState::Keyed(IndexMap::new()),
            None => SliceState::Single(initial),
        }
    }

    fn key_of(&self, action: &Action) -> Option<String> {
        self.key.as_ref().and_then(|key_fn| key_fn(action))
    }

    /// Record touched by `action`, created from `initial` on first use.
    fn record_mut<'s>(
        &self,
        state: &'s mut SliceState<R>,
        action: &Action,
        initial: impl FnOnce() -> R,
    ) -> Option<&'s mut R> {
        match state {
            SliceState::Single(record) => Some(record),
            SliceState::Keyed(records) => {
                let Some(key) = self.key_of(action) else {
                    debug!(action = %action.ty, "keyed slice received an action without key");
                    return None;
                };
                Some(records.entry(key).or_insert_with(initial))
            }
        }
    }

    fn delegate(&self, state: &mut SliceState<R>, action: &Action) {
        if let Some(handler) = self.handlers.get(&action.ty) {
            handler(state, action.data(), action);
        }
    }
}
