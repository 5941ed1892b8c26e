//! Entity cache demo entrypoint: loads the first pages of games and one game in detail.

use std::{env, sync::Arc};

use anyhow::Context;
use entity_cache::{
    CacheConfig, Endpoint, FetchOutcome, RequestTypes, SchemaNode, SchemaRegistry, Store,
    entity_action,
    normalize::entity_key,
    paginated_action,
    reducers::{entities, paginate},
    schema::GAMES,
    transport::http::HttpTransport,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const GAMES_SLICE: &str = "games";
const GAME_SLICE: &str = "game";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = CacheConfig::load();
    let registry = SchemaRegistry::game_database();
    registry.validate().context("validating schema registry")?;

    let transport = HttpTransport::new(config.http()).context("building HTTP transport")?;
    let list_types = RequestTypes::with_prefix("GAMES");
    let detail_types = RequestTypes::with_prefix("GAME");

    let store = Store::builder(registry, Arc::new(transport))
        .ordering(config.response_ordering)
        .paginate(GAMES_SLICE, paginate(list_types.clone()))
        .entities(GAME_SLICE, entities(detail_types.clone()).keyed())
        .build();

    let pages = env::var("PAGES")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(2);

    let games = paginated_action("/api/games", GAMES_SLICE, config.page_size, list_types)
        .schema(SchemaNode::entity(GAMES));
    for page in 1..=pages {
        match games.fetch(&store, page, None).await? {
            FetchOutcome::Failed(message) => {
                warn!(page, error = %message, "stopping after failed page");
                break;
            }
            outcome => info!(page, ?outcome, "page fetched"),
        }
        let exhausted = store
            .list(GAMES_SLICE, None)
            .await
            .is_some_and(|list| !list.has_more());
        if exhausted {
            break;
        }
    }

    let titles = store
        .list_denormalized(GAMES_SLICE, None, &SchemaNode::entity(GAMES))
        .await
        .unwrap_or_default();
    for game in &titles {
        info!(id = %game["id"], name = %game["name"], "game");
    }

    let first = titles.first().and_then(|game| game.get("id"));
    if let Some((first, id)) = first.and_then(|id| Some((id, entity_key(id)?))) {
        let detail = entity_action(
            Endpoint::template("/api/games/{key}"),
            GAME_SLICE,
            detail_types,
        )
        .schema(SchemaNode::entity(GAMES));
        let outcome = detail.fetch(&store, &id).await?;
        let game = store.denormalize(first, &SchemaNode::entity(GAMES)).await;
        info!(
            %id,
            ?outcome,
            name = %game["name"],
            developers = game["developers"].as_array().map_or(0, Vec::len),
            "game detail"
        );
    }

    let entities = store.entities().await;
    for entity_type in [GAMES, "platforms", "genres", "persons"] {
        let count = entities.of_type(entity_type).map_or(0, |records| records.len());
        info!(entity_type, count, "cached entities");
    }

    Ok(())
}

/// Configure tracing subscribers so cache logs are visible by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,entity_cache=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
