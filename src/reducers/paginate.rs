//! Paged-list state with "load more" accumulation.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::{Handler, Reducer, SliceConfig, SliceState, key_from_meta};
use crate::action::{Action, ActionMeta, ActionType, Lifecycle, RequestTypes};

const RESERVED_FIELDS: [&str; 6] = ["count", "next", "previous", "results", "loading", "loaded"];

/// State of one paginated list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    /// Total number of items the server reports.
    pub count: u64,
    /// Next page to request, `None` once the list is exhausted.
    pub next: Option<u64>,
    /// Previous-page cursor as reported by the server.
    pub previous: Value,
    /// Items in arrival order (ids when the response was normalized).
    pub results: Vec<Value>,
    /// A page request is in flight.
    pub loading: bool,
    /// At least one page has been received.
    pub loaded: bool,
    /// Any other field of the latest page response.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PageRecord {
    fn default() -> Self {
        Self {
            count: 0,
            next: Some(1),
            previous: Value::Null,
            results: Vec::new(),
            loading: false,
            loaded: false,
            extra: Map::new(),
        }
    }
}

impl PageRecord {
    /// Whether the server reported further pages.
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }

    fn absorb(&mut self, payload: &Value, meta: &ActionMeta) {
        let page = payload.as_object();
        let field = |name: &str| page.and_then(|fields| fields.get(name));

        self.next = next_cursor(self.next, field("next"), meta.page);

        let incoming = field("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if meta.push {
            self.results.extend(incoming);
        } else {
            self.results = incoming;
        }

        if let Some(count) = field("count").and_then(Value::as_u64) {
            self.count = count;
        }
        if let Some(previous) = field("previous") {
            self.previous = previous.clone();
        }
        for (name, value) in page.into_iter().flatten() {
            if !RESERVED_FIELDS.contains(&name.as_str()) {
                self.extra.insert(name.clone(), value.clone());
            }
        }

        self.loading = false;
        self.loaded = true;
    }
}

/// Next page after a successful load.
///
/// An explicit `null` or positive integer from the server wins. Anything else (a cursor URL,
/// a missing field) becomes the requested page plus one, or the current cursor plus one when
/// the action does not say which page it requested.
fn next_cursor(current: Option<u64>, declared: Option<&Value>, page: Option<u32>) -> Option<u64> {
    match declared {
        Some(Value::Null) => None,
        Some(value) if value.as_u64().is_some_and(|next| next > 0) => value.as_u64(),
        _ => Some(match page {
            Some(page) => u64::from(page) + 1,
            None => current.unwrap_or(0) + 1,
        }),
    }
}

/// Reducer created by [`paginate`].
pub struct PaginateReducer {
    config: SliceConfig<PageRecord>,
}

/// Create a reducer tracking a paginated list for the `types` lifecycle.
pub fn paginate(types: RequestTypes) -> PaginateReducer {
    PaginateReducer {
        config: SliceConfig::new(types),
    }
}

impl PaginateReducer {
    /// Keep one list per [`ActionMeta::key`].
    pub fn keyed(self) -> Self {
        self.keyed_by(key_from_meta)
    }

    /// Keep one list per key computed by `key_fn`.
    pub fn keyed_by<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&Action) -> Option<String> + Send + Sync + 'static,
    {
        self.config.key = Some(Arc::new(key_fn));
        self
    }

    /// Delegate actions of type `ty` to `handler`.
    pub fn on<F>(mut self, ty: impl Into<ActionType>, handler: F) -> Self
    where
        F: Fn(&mut SliceState<PageRecord>, &Value, &Action) + Send + Sync + 'static,
    {
        let handler: Handler<SliceState<PageRecord>> = Arc::new(handler);
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

impl Reducer for PaginateReducer {
    type State = SliceState<PageRecord>;

    fn initial_state(&self) -> Self::State {
        self.config.initial_state(PageRecord::default())
    }

    fn reduce(&self, state: &mut Self::State, action: &Action) {
        let Some(phase) = self.config.types.classify(action) else {
            self.config.delegate(state, action);
            return;
        };

        let Some(record) = self.config.record_mut(state, action, PageRecord::default) else {
            return;
        };

        match phase {
            Lifecycle::Start => record.loading = true,
            Lifecycle::Success(payload) => record.absorb(payload, &action.meta),
            Lifecycle::Failure(_) => record.loading = false,
        }
    }
}
