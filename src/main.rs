use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tarsas::bgg::BggClient;
use tarsas::config::Config;
use tarsas::db;
use tarsas::middlewares::auth::auth_middleware;
use tarsas::routes::auth::{auth_routes, profile_routes};
use tarsas::routes::games::{game_routes, public_game_routes};
use tarsas::translate::Translator;
use tarsas::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    let database = db::connect(&config).await?;
    db::ensure_indexes(&database).await?;

    let bgg = BggClient::new(
        config.bgg_base_url.clone(),
        Duration::from_secs(config.cache_ttl_secs),
        config.cache_capacity,
    )?;
    let translator = Translator::new(
        config.translate_base_url.clone(),
        config.translate_api_key.clone(),
    )?;
    if !translator.is_enabled() {
        info!("translation backend not configured, games stay untranslated");
    }

    let state = AppState {
        db: Arc::new(database),
        bgg: Arc::new(bgg),
        translator: Arc::new(translator),
    };

    let protected = Router::new()
        .merge(game_routes())
        .merge(profile_routes())
        .layer(axum::middleware::from_fn(auth_middleware));

    let api_router = Router::new()
        .merge(public_game_routes())
        .merge(auth_routes())
        .merge(protected);

    let app = Router::new()
        .nest("/api", api_router)
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
