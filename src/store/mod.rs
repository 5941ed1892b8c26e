//! The store: entity maps, feature slices and the dispatch entry point.

pub mod entities;
mod events;
mod middleware;

use std::sync::Arc;

use dashmap::DashMap;
use futures::Stream;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use tracing::trace;

use crate::{
    action::{Action, ActionType, Dispatchable},
    error::DispatchError,
    normalize::denormalize,
    reducers::{
        EntitiesReducer, PageRecord, PaginateReducer, Reducer, RequestRecord, SliceState,
    },
    schema::{SchemaNode, SchemaRegistry},
    transport::Transport,
};

pub use self::entities::{EntityStore, EntityStoreReducer};
pub use self::events::{EventHub, StoreEvent};

/// Store shared across tasks.
pub type SharedStore = Arc<Store>;

const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Which response wins when two requests for the same key overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOrdering {
    /// Responses are applied in completion order; a slow older request can overwrite a newer one.
    #[default]
    LastCompleted,
    /// Responses of requests superseded by a newer dispatch for the same key are dropped.
    LatestDispatched,
}

/// What happened to a dispatched action or API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A plain action was reduced.
    Reduced,
    /// The action creator decided no request was needed.
    Skipped,
    /// The request succeeded and SUCCESS was dispatched.
    Succeeded,
    /// The request failed and FAILURE was dispatched with this message.
    Failed(String),
    /// The response arrived after a newer request for the same key and was dropped.
    Discarded,
}

/// A reducer together with the state it owns.
struct Slice<R: Reducer> {
    reducer: R,
    state: R::State,
}

impl<R: Reducer> Slice<R> {
    fn new(reducer: R) -> Self {
        let state = reducer.initial_state();
        Self { reducer, state }
    }

    fn reduce(&mut self, action: &Action) {
        self.reducer.reduce(&mut self.state, action);
    }
}

struct StoreState {
    entities: Slice<EntityStoreReducer>,
    records: IndexMap<String, Slice<EntitiesReducer>>,
    lists: IndexMap<String, Slice<PaginateReducer>>,
    version: u64,
}

/// Central cache state: normalized entities plus per-feature request slices.
pub struct Store {
    registry: Arc<SchemaRegistry>,
    transport: Arc<dyn Transport>,
    ordering: ResponseOrdering,
    state: RwLock<StoreState>,
    sequences: DashMap<(ActionType, String), u64>,
    events: EventHub,
}

/// Collects the slices of a [`Store`] before it is built.
pub struct StoreBuilder {
    registry: SchemaRegistry,
    transport: Arc<dyn Transport>,
    ordering: ResponseOrdering,
    records: IndexMap<String, Slice<EntitiesReducer>>,
    lists: IndexMap<String, Slice<PaginateReducer>>,
    event_capacity: usize,
}

impl StoreBuilder {
    /// Choose how overlapping responses for the same key are applied.
    pub fn ordering(mut self, ordering: ResponseOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Register a request-lifecycle slice under `name`.
    pub fn entities(mut self, name: impl Into<String>, reducer: EntitiesReducer) -> Self {
        self.records.insert(name.into(), Slice::new(reducer));
        self
    }

    /// Register a paginated-list slice under `name`.
    pub fn paginate(mut self, name: impl Into<String>, reducer: PaginateReducer) -> Self {
        self.lists.insert(name.into(), Slice::new(reducer));
        self
    }

    /// Capacity of the change-notification channel.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Finish construction.
    pub fn build(self) -> SharedStore {
        Arc::new(Store {
            registry: Arc::new(self.registry),
            transport: self.transport,
            ordering: self.ordering,
            state: RwLock::new(StoreState {
                entities: Slice::new(EntityStoreReducer),
                records: self.records,
                lists: self.lists,
                version: 0,
            }),
            sequences: DashMap::new(),
            events: EventHub::new(self.event_capacity),
        })
    }
}

impl Store {
    /// Start building a store over `registry`, fetching through `transport`.
    pub fn builder(registry: SchemaRegistry, transport: Arc<dyn Transport>) -> StoreBuilder {
        StoreBuilder {
            registry,
            transport,
            ordering: ResponseOrdering::default(),
            records: IndexMap::new(),
            lists: IndexMap::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Schemas used to normalize responses.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Ordering policy for overlapping responses.
    pub fn ordering(&self) -> ResponseOrdering {
        self.ordering
    }

    /// Reduce a plain action, or run an API call through the fetch middleware.
    ///
    /// Only configuration errors are returned as `Err`; failed requests resolve to
    /// [`FetchOutcome::Failed`] after FAILURE has been reduced.
    pub async fn dispatch(
        &self,
        dispatchable: impl Into<Dispatchable>,
    ) -> Result<FetchOutcome, DispatchError> {
        match dispatchable.into() {
            Dispatchable::Action(action) => {
                self.reduce(action).await;
                Ok(FetchOutcome::Reduced)
            }
            Dispatchable::Call(call) => self.call_api(call).await,
        }
    }

    /// Run every reducer on `action` and notify subscribers.
    async fn reduce(&self, action: Action) {
        let version = {
            let mut state = self.state.write().await;
            state.entities.reduce(&action);
            for slice in state.records.values_mut() {
                slice.reduce(&action);
            }
            for slice in state.lists.values_mut() {
                slice.reduce(&action);
            }
            state.version += 1;
            state.version
        };

        trace!(action = %action.ty, version, "action reduced");
        self.events.broadcast(StoreEvent {
            action: action.ty,
            version,
        });
    }

    /// Record key the slices following `success` derive for `action`.
    async fn slice_key(&self, success: &ActionType, action: &Action) -> Option<String> {
        let state = self.state.read().await;
        let records = state
            .records
            .values()
            .filter(|slice| slice.reducer.types().success == *success)
            .find_map(|slice| slice.reducer.record_key(action));
        records.or_else(|| {
            state
                .lists
                .values()
                .filter(|slice| slice.reducer.types().success == *success)
                .find_map(|slice| slice.reducer.record_key(action))
        })
    }

    /// Number of actions reduced so far.
    pub async fn version(&self) -> u64 {
        self.state.read().await.version
    }

    /// Stored record of `entity_type` with this id.
    pub async fn entity(&self, entity_type: &str, id: &Value) -> Option<Value> {
        let state = self.state.read().await;
        state.entities.state.get(entity_type, id).cloned()
    }

    /// Snapshot of the whole entity store.
    pub async fn entities(&self) -> EntityStore {
        self.state.read().await.entities.state.clone()
    }

    /// Drop one cached entity, returning it.
    pub async fn remove_entity(&self, entity_type: &str, id: &Value) -> Option<Value> {
        let mut state = self.state.write().await;
        state.entities.state.remove(entity_type, id)
    }

    /// Rebuild the nested shape of `input` against the current entity store.
    pub async fn denormalize(&self, input: &Value, schema: &SchemaNode) -> Value {
        let state = self.state.read().await;
        denormalize(input, schema, &self.registry, state.entities.state.as_entities())
    }

    /// Request-lifecycle record of slice `slice` (and `key` for keyed slices).
    pub async fn record(&self, slice: &str, key: Option<&str>) -> Option<RequestRecord> {
        let state = self.state.read().await;
        state.records.get(slice)?.state.get(key).cloned()
    }

    /// Whole request-lifecycle slice.
    pub async fn record_slice(&self, slice: &str) -> Option<SliceState<RequestRecord>> {
        let state = self.state.read().await;
        state.records.get(slice).map(|slice| slice.state.clone())
    }

    /// Paginated list of slice `slice` (and `key` for keyed slices).
    pub async fn list(&self, slice: &str, key: Option<&str>) -> Option<PageRecord> {
        let state = self.state.read().await;
        state.lists.get(slice)?.state.get(key).cloned()
    }

    /// Results of a paginated list expanded through `item_schema`.
    pub async fn list_denormalized(
        &self,
        slice: &str,
        key: Option<&str>,
        item_schema: &SchemaNode,
    ) -> Option<Vec<Value>> {
        let state = self.state.read().await;
        let list = state.lists.get(slice)?.state.get(key)?;
        let entities = state.entities.state.as_entities();
        Some(
            list.results
                .iter()
                .map(|item| denormalize(item, item_schema, &self.registry, entities))
                .collect(),
        )
    }

    /// Register a subscriber notified after every reduced action.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Change notifications as a stream.
    pub fn changes(&self) -> impl Stream<Item = StoreEvent> + Send + use<> {
        self.events.stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        action::{ActionMeta, RequestTypes},
        normalize::Entities,
        reducers::{entities, paginate},
        transport::memory::MemoryTransport,
    };
    use serde_json::json;
    use tokio_stream::StreamExt;

    fn store() -> SharedStore {
        Store::builder(SchemaRegistry::game_database(), Arc::new(MemoryTransport::new()))
            .entities("game", entities(RequestTypes::with_prefix("GAME")).keyed())
            .paginate("games", paginate(RequestTypes::with_prefix("GAMES")))
            .build()
    }

    fn game_entities() -> Entities {
        let mut entities = Entities::new();
        entities
            .entry("games".into())
            .or_default()
            .insert("7".into(), json!({"id": 7, "name": "Hollow Knight", "platforms": [4]}));
        entities
            .entry("platforms".into())
            .or_default()
            .insert("4".into(), json!({"id": 4, "name": "PC"}));
        entities
    }

    #[tokio::test]
    async fn success_with_entities_feeds_store_and_slices() {
        let store = store();
        let types = RequestTypes::with_prefix("GAMES");

        store
            .dispatch(Action::success(
                types.success,
                ActionMeta::new().with_page(1),
                json!({"count": 1, "results": [7]}),
                Some(game_entities()),
            ))
            .await
            .unwrap();

        assert_eq!(
            store.entity("games", &json!(7)).await.unwrap()["name"],
            json!("Hollow Knight")
        );
        assert_eq!(store.list("games", None).await.unwrap().results, vec![json!(7)]);

        let expanded = store
            .list_denormalized("games", None, &SchemaNode::entity("games"))
            .await
            .unwrap();
        assert_eq!(expanded[0]["platforms"][0]["name"], json!("PC"));
    }

    #[tokio::test]
    async fn every_reduced_action_is_broadcast() {
        let store = store();
        let mut changes = Box::pin(store.changes());

        store
            .dispatch(Action::custom("PING", Value::Null))
            .await
            .unwrap();

        let event = changes.next().await.unwrap();
        assert_eq!(event.action, ActionType::from("PING"));
        assert_eq!(event.version, 1);
        assert_eq!(store.version().await, 1);
    }

    #[tokio::test]
    async fn unknown_slices_read_as_none() {
        let store = store();
        assert!(store.record("reviews", Some("1")).await.is_none());
        assert!(store.list("reviews", None).await.is_none());
        assert!(store.record("game", Some("1")).await.is_none());
    }

    #[tokio::test]
    async fn entities_can_be_removed() {
        let store = store();
        store
            .dispatch(Action::success(
                "ANY".into(),
                ActionMeta::new(),
                Value::Null,
                Some(game_entities()),
            ))
            .await
            .unwrap();

        assert!(store.remove_entity("games", &json!("7")).await.is_some());
        assert!(store.entity("games", &json!(7)).await.is_none());
        assert!(store.entity("platforms", &json!(4)).await.is_some());
    }
}
