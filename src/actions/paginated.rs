//! Fetch-page action creator with page bookkeeping.

use tracing::debug;

use crate::{
    action::{ActionMeta, ApiCall, CallApi, Endpoint, RequestTypes},
    error::DispatchError,
    schema::SchemaNode,
    store::{FetchOutcome, Store},
};

/// Fetch-page action creator built by [`paginated_action`].
#[derive(Debug, Clone)]
pub struct PaginatedAction {
    endpoint: Endpoint,
    slice: String,
    page_size: u32,
    types: RequestTypes,
    schema: Option<SchemaNode>,
    reload: bool,
}

/// Fetch pages of `page_size` items into the `paginate` slice registered as `slice`.
pub fn paginated_action(
    endpoint: impl Into<Endpoint>,
    slice: impl Into<String>,
    page_size: u32,
    types: RequestTypes,
) -> PaginatedAction {
    PaginatedAction {
        endpoint: endpoint.into(),
        slice: slice.into(),
        page_size,
        types,
        schema: None,
        reload: true,
    }
}

impl PaginatedAction {
    /// Normalize the `results` of every page through `item_schema`.
    pub fn schema(mut self, item_schema: SchemaNode) -> Self {
        self.schema = Some(item_schema);
        self
    }

    /// Whether asking for the first page of an already loaded list refetches it.
    pub fn reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    /// Fetch `page` of the list, keyed by `id` when the slice is keyed.
    pub async fn fetch(
        &self,
        store: &Store,
        page: u32,
        id: Option<&str>,
    ) -> Result<FetchOutcome, DispatchError> {
        if let Some(list) = store.list(&self.slice, id).await {
            if list.loading {
                debug!(slice = %self.slice, page, "page already loading; skipping");
                return Ok(FetchOutcome::Skipped);
            }
            if !self.reload && page <= 1 && list.loaded {
                debug!(slice = %self.slice, "list already loaded; skipping");
                return Ok(FetchOutcome::Skipped);
            }
        }

        let mut meta = ActionMeta::new().with_page(page);
        if let Some(id) = id {
            meta = meta.with_key(id);
        }
        let endpoint = with_page_query(&self.endpoint.resolve(&meta), page, self.page_size);

        let mut call = CallApi::new(self.types.clone(), endpoint);
        call.schema = self
            .schema
            .clone()
            .map(|item| SchemaNode::object([("results", SchemaNode::array_of(item))]));
        store.dispatch(ApiCall::new(call, meta)).await
    }
}

/// Append `page` and `page_size` query parameters to `path`.
fn with_page_query(path: &str, page: u32, page_size: u32) -> String {
    let separator = if !path.contains('?') {
        "?"
    } else if path.ends_with(['?', '&']) {
        ""
    } else {
        "&"
    };
    format!("{path}{separator}page={page}&page_size={page_size}")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        reducers::paginate,
        schema::{GAMES, SchemaRegistry},
        store::SharedStore,
        transport::memory::MemoryTransport,
    };
    use serde_json::{Value, json};

    fn types() -> RequestTypes {
        RequestTypes::with_prefix("GAMES")
    }

    fn store(transport: &MemoryTransport) -> SharedStore {
        Store::builder(SchemaRegistry::game_database(), Arc::new(transport.clone()))
            .paginate("games", paginate(types()))
            .paginate(
                "collection_games",
                paginate(RequestTypes::with_prefix("COLLECTION_GAMES")).keyed(),
            )
            .build()
    }

    fn page_of(ids: std::ops::RangeInclusive<u32>) -> Vec<Value> {
        ids.map(|id| json!({"id": id, "name": format!("Game {id}")}))
            .collect()
    }

    #[test]
    fn page_query_is_appended() {
        assert_eq!(with_page_query("/api/games", 1, 20), "/api/games?page=1&page_size=20");
        assert_eq!(
            with_page_query("/api/games?ordering=-rating", 2, 20),
            "/api/games?ordering=-rating&page=2&page_size=20"
        );
        assert_eq!(with_page_query("/api/games?", 3, 10), "/api/games?page=3&page_size=10");
    }

    #[tokio::test]
    async fn first_two_pages_accumulate() {
        let transport = MemoryTransport::new();
        transport.respond(
            "/api/games?page=1&page_size=20",
            json!({"count": 57, "next": 2, "previous": null, "results": page_of(1..=20)}),
        );
        transport.respond(
            "/api/games?page=2&page_size=20",
            json!({"count": 57, "next": 3, "previous": 1, "results": page_of(21..=40)}),
        );
        let store = store(&transport);
        let games = paginated_action("/api/games", "games", 20, types());

        assert_eq!(games.fetch(&store, 1, None).await.unwrap(), FetchOutcome::Succeeded);
        let first = store.list("games", None).await.unwrap();
        assert_eq!(first.results, page_of(1..=20));
        assert_eq!(first.count, 57);
        assert_eq!(first.next, Some(2));
        assert_eq!(first.previous, Value::Null);
        assert!(first.loaded && !first.loading);

        assert_eq!(games.fetch(&store, 2, None).await.unwrap(), FetchOutcome::Succeeded);
        let second = store.list("games", None).await.unwrap();
        assert_eq!(second.results, page_of(1..=40));
        assert_eq!(second.next, Some(3));
    }

    #[tokio::test]
    async fn schema_normalizes_results_into_ids() {
        let transport = MemoryTransport::new();
        transport.respond(
            "/api/games?page=1&page_size=2",
            json!({
                "count": 2,
                "next": null,
                "results": [
                    {"id": 1, "name": "Game 1", "platforms": [{"id": 4, "name": "PC"}]},
                    {"id": 2, "name": "Game 2"}
                ]
            }),
        );
        let store = store(&transport);

        paginated_action("/api/games", "games", 2, types())
            .schema(SchemaNode::entity(GAMES))
            .fetch(&store, 1, None)
            .await
            .unwrap();

        let list = store.list("games", None).await.unwrap();
        assert_eq!(list.results, vec![json!(1), json!(2)]);
        assert!(!list.has_more());
        assert_eq!(
            store.entity(GAMES, &json!(1)).await.unwrap()["platforms"],
            json!([4])
        );
        assert_eq!(
            store.entity("platforms", &json!(4)).await,
            Some(json!({"id": 4, "name": "PC"}))
        );
        let names = store
            .list_denormalized("games", None, &SchemaNode::entity(GAMES))
            .await
            .unwrap();
        assert_eq!(names[1]["name"], json!("Game 2"));
    }

    #[tokio::test]
    async fn loaded_first_page_is_skipped_without_reload() {
        let transport = MemoryTransport::new();
        transport.respond(
            "/api/games?page=1&page_size=20",
            json!({"count": 1, "results": page_of(1..=1)}),
        );
        let store = store(&transport);
        let games = paginated_action("/api/games", "games", 20, types()).reload(false);

        games.fetch(&store, 1, None).await.unwrap();
        assert_eq!(games.fetch(&store, 1, None).await.unwrap(), FetchOutcome::Skipped);
        assert_eq!(transport.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn keyed_lists_use_the_id_in_endpoint_and_slice() {
        let transport = MemoryTransport::new();
        transport.respond(
            "/api/collections/best-rpg/games?page=1&page_size=5",
            json!({"count": 1, "results": page_of(7..=7)}),
        );
        let store = store(&transport);

        paginated_action(
            Endpoint::template("/api/collections/{key}/games"),
            "collection_games",
            5,
            RequestTypes::with_prefix("COLLECTION_GAMES"),
        )
        .fetch(&store, 1, Some("best-rpg"))
        .await
        .unwrap();

        let list = store.list("collection_games", Some("best-rpg")).await.unwrap();
        assert_eq!(list.results.len(), 1);
        assert!(store.list("collection_games", Some("other")).await.is_none());
    }

    #[tokio::test]
    async fn page_is_skipped_while_loading() {
        let transport = MemoryTransport::new();
        let release = transport.gate("/api/games?page=2&page_size=20");
        let store = store(&transport);
        let games = paginated_action("/api/games", "games", 20, types());

        let pending = tokio::spawn({
            let store = store.clone();
            let games = games.clone();
            async move { games.fetch(&store, 2, None).await }
        });
        while transport.calls().await.is_empty() {
            tokio::task::yield_now().await;
        }

        assert_eq!(games.fetch(&store, 3, None).await.unwrap(), FetchOutcome::Skipped);
        release.send(Ok(json!({"results": []}))).unwrap();
        assert_eq!(pending.await.unwrap().unwrap(), FetchOutcome::Succeeded);
    }
}
