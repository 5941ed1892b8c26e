//! Fetch middleware: turns an API call into START, a transport call, then SUCCESS or FAILURE.

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{FetchOutcome, ResponseOrdering, Store};
use crate::{
    action::{Action, ActionType, ApiCall, CallApi},
    error::{DispatchError, failure_message},
    normalize::{Entities, normalize},
    transport::TransportRequest,
};

/// Sequence number handed to a request when responses are ordered by dispatch.
struct Ticket {
    key: (ActionType, String),
    seq: u64,
}

impl Store {
    pub(super) async fn call_api(&self, call: ApiCall) -> Result<FetchOutcome, DispatchError> {
        let ApiCall { call, mut meta } = call;
        if cfg!(debug_assertions) {
            call.types.validate()?;
        }

        let CallApi {
            types,
            endpoint,
            schema,
            data,
            method,
            parse,
        } = call;
        let endpoint = endpoint.resolve(&meta);
        let request_id = Uuid::new_v4();
        meta.request_id = Some(request_id);

        let start = Action::start(types.start.clone(), meta.clone());
        let ticket = self.issue_ticket(&types.success, &start).await;
        debug!(action = %types.start, %endpoint, %request_id, "request started");
        self.reduce(start).await;

        let response = self
            .transport
            .fetch(TransportRequest {
                endpoint: endpoint.clone(),
                method,
                data,
                parse,
            })
            .await;

        if let Some(ticket) = ticket {
            if !self.is_current(&ticket) {
                debug!(
                    action = %types.success,
                    %endpoint,
                    %request_id,
                    seq = ticket.seq,
                    "discarding response superseded by a newer request"
                );
                return Ok(FetchOutcome::Discarded);
            }
        }

        let shaped: Result<(Value, Option<Entities>), String> = match response {
            Ok(body) => match &schema {
                Some(schema) => normalize(&body, schema, &self.registry)
                    .map(|normalized| (normalized.result, Some(normalized.entities)))
                    .map_err(|err| err.to_string()),
                None => Ok((body, None)),
            },
            Err(err) => Err(failure_message(&err)),
        };

        match shaped {
            Ok((data, entities)) => {
                debug!(action = %types.success, %endpoint, %request_id, "request succeeded");
                self.reduce(Action::success(types.success, meta, data, entities))
                    .await;
                Ok(FetchOutcome::Succeeded)
            }
            Err(message) => {
                warn!(
                    action = %types.failure,
                    %endpoint,
                    %request_id,
                    error = %message,
                    "request failed"
                );
                self.reduce(Action::failure(types.failure, meta, message.clone()))
                    .await;
                Ok(FetchOutcome::Failed(message))
            }
        }
    }

    /// Sequence number of a request, keyed like the records its SUCCESS lands in.
    ///
    /// The key comes from the key function of the slices following `success`, falling back to
    /// [`crate::action::ActionMeta::key`] when none of them is keyed.
    async fn issue_ticket(&self, success: &ActionType, start: &Action) -> Option<Ticket> {
        match self.ordering {
            ResponseOrdering::LastCompleted => None,
            ResponseOrdering::LatestDispatched => {
                let record_key = self
                    .slice_key(success, start)
                    .await
                    .or_else(|| start.meta.key.clone())
                    .unwrap_or_default();
                let key = (success.clone(), record_key);
                let seq = {
                    let mut latest = self.sequences.entry(key.clone()).or_insert(0);
                    *latest += 1;
                    *latest
                };
                Some(Ticket { key, seq })
            }
        }
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        self.sequences
            .get(&ticket.key)
            .is_some_and(|latest| *latest == ticket.seq)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        action::{ActionMeta, Endpoint, RequestTypes},
        error::DEFAULT_FAILURE_MESSAGE,
        reducers::{entities, paginate},
        schema::{GAME_LIST, SchemaNode, SchemaRegistry},
        store::SharedStore,
        transport::{TransportError, memory::MemoryTransport},
    };

    fn game_types() -> RequestTypes {
        RequestTypes::with_prefix("GAME")
    }

    fn store(transport: &MemoryTransport, ordering: ResponseOrdering) -> SharedStore {
        Store::builder(SchemaRegistry::game_database(), Arc::new(transport.clone()))
            .ordering(ordering)
            .entities("game", entities(game_types()).keyed())
            .paginate("games", paginate(RequestTypes::with_prefix("GAMES")))
            .build()
    }

    fn fetch_game(id: u32) -> ApiCall {
        ApiCall::new(
            CallApi::new(game_types(), Endpoint::template("/api/games/{key}")),
            ActionMeta::new().with_key(id.to_string()),
        )
    }

    #[tokio::test]
    async fn success_dispatches_start_then_success() {
        let transport = MemoryTransport::new();
        transport.respond("/api/games/1", json!({"id": 1, "name": "Quake"}));
        let store = store(&transport, ResponseOrdering::default());
        let mut events = store.subscribe();

        let outcome = store.dispatch(fetch_game(1)).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Succeeded);
        assert_eq!(events.recv().await.unwrap().action, game_types().start);
        assert_eq!(events.recv().await.unwrap().action, game_types().success);

        let record = store.record("game", Some("1")).await.unwrap();
        assert!(!record.loading);
        assert_eq!(record.get("name"), Some(&json!("Quake")));
        assert_eq!(transport.calls().await[0].endpoint, "/api/games/1");
    }

    #[tokio::test]
    async fn start_is_reduced_before_the_transport_resolves() {
        let transport = MemoryTransport::new();
        let release = transport.gate("/api/games/3");
        let store = store(&transport, ResponseOrdering::default());

        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.dispatch(fetch_game(3)).await }
        });

        let mut events = store.subscribe();
        while store.record("game", Some("3")).await.is_none() {
            events.recv().await.unwrap();
        }
        assert!(store.record("game", Some("3")).await.unwrap().loading);

        release.send(Ok(json!({"id": 3}))).unwrap();
        assert_eq!(pending.await.unwrap().unwrap(), FetchOutcome::Succeeded);
        assert!(!store.record("game", Some("3")).await.unwrap().loading);
    }

    #[tokio::test]
    async fn failure_keeps_previous_data() {
        let transport = MemoryTransport::new();
        transport.respond("/api/games/2", json!({"id": 2, "name": "Braid"}));
        transport.fail("/api/games/2", TransportError::new("Server unavailable"));
        let store = store(&transport, ResponseOrdering::default());

        store.dispatch(fetch_game(2)).await.unwrap();
        let outcome = store.dispatch(fetch_game(2)).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Failed("Server unavailable".into()));
        let record = store.record("game", Some("2")).await.unwrap();
        assert!(!record.loading);
        assert_eq!(record.get("name"), Some(&json!("Braid")));
    }

    #[tokio::test]
    async fn failure_without_message_uses_default() {
        let transport = MemoryTransport::new();
        transport.fail("/api/games/9", TransportError::new(""));
        let store = store(&transport, ResponseOrdering::default());

        let outcome = store.dispatch(fetch_game(9)).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Failed(DEFAULT_FAILURE_MESSAGE.into()));
    }

    #[tokio::test]
    async fn schema_normalizes_into_entity_store() {
        let transport = MemoryTransport::new();
        transport.respond(
            "/api/games",
            json!({
                "count": 2,
                "next": null,
                "results": [
                    {"id": 1, "name": "Limbo", "platforms": [{"id": 4, "name": "PC"}]},
                    {"id": 2, "name": "Inside", "platforms": [{"id": 4, "name": "PC"}]}
                ]
            }),
        );
        let store = store(&transport, ResponseOrdering::default());
        let registry = SchemaRegistry::game_database();
        let games = registry.composite(GAME_LIST).unwrap().clone();
        let schema = SchemaNode::object([("results", games)]);

        let call =
            CallApi::new(RequestTypes::with_prefix("GAMES"), "/api/games").with_schema(schema);
        store
            .dispatch(ApiCall::new(call, ActionMeta::new().with_page(1)))
            .await
            .unwrap();

        let list = store.list("games", None).await.unwrap();
        assert_eq!(list.results, vec![json!(1), json!(2)]);
        assert_eq!(list.next, None);
        assert_eq!(
            store.entity("platforms", &json!(4)).await,
            Some(json!({"id": 4, "name": "PC"}))
        );
        assert_eq!(
            store.entity("games", &json!(2)).await.unwrap()["platforms"],
            json!([4])
        );
    }

    #[tokio::test]
    async fn normalization_failure_becomes_failure_action() {
        let transport = MemoryTransport::new();
        transport.respond("/api/games/5", json!({"name": "no id"}));
        let store = store(&transport, ResponseOrdering::default());

        let call = CallApi::new(game_types(), Endpoint::template("/api/games/{key}"))
            .with_schema(SchemaNode::entity("games"));
        let outcome = store
            .dispatch(ApiCall::new(call, ActionMeta::new().with_key("5")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FetchOutcome::Failed("`games` entity is missing its `id` attribute".into())
        );
        assert!(!store.record("game", Some("5")).await.unwrap().loading);
    }

    #[tokio::test]
    async fn schema_not_matching_the_payload_becomes_failure() {
        let transport = MemoryTransport::new();
        transport.respond("/api/games/6", json!([{"id": 6}]));
        let store = store(&transport, ResponseOrdering::default());

        let call = CallApi::new(game_types(), Endpoint::template("/api/games/{key}"))
            .with_schema(SchemaNode::entity("games"));
        let outcome = store
            .dispatch(ApiCall::new(call, ActionMeta::new().with_key("6")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FetchOutcome::Failed("expected a `games` entity or id, found an array".into())
        );
        assert!(store.entities().await.as_entities().is_empty());
    }

    #[tokio::test]
    async fn invalid_types_fail_fast_without_calling_transport() {
        let transport = MemoryTransport::new();
        let store = store(&transport, ResponseOrdering::default());

        let call = CallApi::new(RequestTypes::new("SAME", "SAME", "FAILED"), "/api/games/1");
        let err = store
            .dispatch(ApiCall::new(call, ActionMeta::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::InvalidTypes(_)));
        assert!(transport.calls().await.is_empty());
        assert_eq!(store.version().await, 0);
    }

    #[tokio::test]
    async fn extra_metadata_reaches_every_lifecycle_action() {
        let transport = MemoryTransport::new();
        transport.respond("/api/games/4?ordering=-rating", json!({"id": 4}));
        let store = Store::builder(SchemaRegistry::game_database(), Arc::new(transport.clone()))
            .entities(
                "game",
                entities(game_types()).keyed_by(|action| {
                    action.meta.extra.get("slug").and_then(Value::as_str).map(str::to_owned)
                }),
            )
            .build();

        let call = CallApi::new(
            game_types(),
            Endpoint::template("/api/games/{key}?ordering={ordering}"),
        );
        let meta = ActionMeta::new()
            .with_key("4")
            .with_extra("ordering", "-rating")
            .with_extra("slug", "doom");
        store.dispatch(ApiCall::new(call, meta)).await.unwrap();

        let record = store.record("game", Some("doom")).await.unwrap();
        assert_eq!(record.get("id"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn last_completed_response_wins_by_default() {
        let transport = MemoryTransport::new();
        let first = transport.gate("/api/games/42");
        let second = transport.gate("/api/games/42");
        let store = store(&transport, ResponseOrdering::LastCompleted);

        let slow = tokio::spawn({
            let store = store.clone();
            async move { store.dispatch(fetch_game(42)).await }
        });
        wait_for_calls(&transport, 1).await;
        let fast = tokio::spawn({
            let store = store.clone();
            async move { store.dispatch(fetch_game(42)).await }
        });
        wait_for_calls(&transport, 2).await;

        second.send(Ok(json!({"id": 42, "name": "second"}))).unwrap();
        assert_eq!(fast.await.unwrap().unwrap(), FetchOutcome::Succeeded);
        first.send(Ok(json!({"id": 42, "name": "first"}))).unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), FetchOutcome::Succeeded);

        let record = store.record("game", Some("42")).await.unwrap();
        assert_eq!(record.get("name"), Some(&json!("first")));
    }

    #[tokio::test]
    async fn latest_dispatched_discards_stale_response() {
        let transport = MemoryTransport::new();
        let first = transport.gate("/api/games/42");
        let second = transport.gate("/api/games/42");
        let store = store(&transport, ResponseOrdering::LatestDispatched);

        let slow = tokio::spawn({
            let store = store.clone();
            async move { store.dispatch(fetch_game(42)).await }
        });
        wait_for_calls(&transport, 1).await;
        let fast = tokio::spawn({
            let store = store.clone();
            async move { store.dispatch(fetch_game(42)).await }
        });
        wait_for_calls(&transport, 2).await;

        second.send(Ok(json!({"id": 42, "name": "second"}))).unwrap();
        assert_eq!(fast.await.unwrap().unwrap(), FetchOutcome::Succeeded);
        first.send(Ok(json!({"id": 42, "name": "first"}))).unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), FetchOutcome::Discarded);

        let record = store.record("game", Some("42")).await.unwrap();
        assert_eq!(record.get("name"), Some(&json!("second")));
        assert!(!record.loading);
    }

    #[tokio::test]
    async fn latest_dispatched_follows_custom_slice_keys() {
        let transport = MemoryTransport::new();
        let by_id = transport.gate("/api/games/1");
        let by_slug = transport.gate("/api/games/doom");
        let store = Store::builder(SchemaRegistry::game_database(), Arc::new(transport.clone()))
            .ordering(ResponseOrdering::LatestDispatched)
            .entities(
                "game",
                entities(game_types()).keyed_by(|action| {
                    action.meta.extra.get("slug").and_then(Value::as_str).map(str::to_owned)
                }),
            )
            .build();
        let fetch = |path: &str, key: &str| {
            let call = CallApi::new(game_types(), path);
            let meta = ActionMeta::new().with_key(key).with_extra("slug", "doom");
            let store = store.clone();
            async move { store.dispatch(ApiCall::new(call, meta)).await }
        };

        let slow = tokio::spawn(fetch("/api/games/1", "1"));
        wait_for_calls(&transport, 1).await;
        let fast = tokio::spawn(fetch("/api/games/doom", "doom"));
        wait_for_calls(&transport, 2).await;

        by_slug.send(Ok(json!({"id": 1, "name": "DOOM"}))).unwrap();
        assert_eq!(fast.await.unwrap().unwrap(), FetchOutcome::Succeeded);
        by_id.send(Ok(json!({"id": 1, "name": "Doom (1993)"}))).unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), FetchOutcome::Discarded);

        let record = store.record("game", Some("doom")).await.unwrap();
        assert_eq!(record.get("name"), Some(&json!("DOOM")));
    }

    async fn wait_for_calls(transport: &MemoryTransport, count: usize) {
        while transport.calls().await.len() < count {
            tokio::task::yield_now().await;
        }
    }
}
