use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::bgg::SearchResult;
use crate::error::ApiError;
use crate::middlewares::auth::UserId;
use crate::models::{Game, GameView};
use crate::routes::auth::find_user;
use crate::store::{self, GamePatch, ListQuery, RemovalOutcome};

async fn search_games(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let results = state.bgg.search_with_thumbnails(&query).await?;
    Ok(Json(results))
}

async fn game_details(
    State(state): State<AppState>,
    Path(bgg_id): Path<String>,
) -> Result<Json<GameView>, ApiError> {
    let game = fetch_enriched_details(&state, &bgg_id).await?;
    Ok(Json(game.into_view()))
}

/// Cache-first detail lookup with best-effort Hungarian enrichment; the
/// enriched snapshot replaces the cached one so later hits keep it.
async fn fetch_enriched_details(state: &AppState, bgg_id: &str) -> Result<Game, ApiError> {
    let mut game = state.bgg.details(bgg_id).await?;
    if state.translator.is_enabled() && game.title_hu.is_none() {
        state.translator.enrich_game(&mut game).await;
        state.bgg.update_cached(bgg_id, &game);
    }
    Ok(game)
}

#[derive(Deserialize)]
struct ImportRequest {
    bgg_id: String,
    #[serde(default)]
    note: Option<String>,
}

async fn import_game(
    State(state): State<AppState>,
    user_id: UserId,
    Json(req): Json<ImportRequest>,
) -> Result<Response, ApiError> {
    if req.bgg_id.trim().is_empty() {
        return Err(ApiError::invalid_input("bgg_id is required"));
    }

    let user = find_user(&state, &user_id).await?;
    let caller = user_id.object_id()?;

    let details = fetch_enriched_details(&state, req.bgg_id.trim()).await?;
    let game = store::import_game(&state.db, details, &caller, &user.name, req.note).await?;

    Ok((StatusCode::CREATED, Json(game.into_view())).into_response())
}

async fn list_games(
    State(state): State<AppState>,
    user_id: UserId,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<GameView>>, ApiError> {
    let caller = user_id.object_id()?;
    let games = store::list_games(&state.db, &query, &caller).await?;
    Ok(Json(games.into_iter().map(Game::into_view).collect()))
}

async fn update_game(
    State(state): State<AppState>,
    _user_id: UserId,
    Path(game_id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<GameView>, ApiError> {
    // Validate the patch at the boundary: unknown or mistyped fields are a
    // client error, not something to silently drop.
    let patch: GamePatch = serde_json::from_value(body)
        .map_err(|e| ApiError::invalid_input(format!("invalid update: {e}")))?;
    let game = store::update_game(&state.db, &game_id, patch).await?;
    Ok(Json(game.into_view()))
}

async fn remove_game(
    State(state): State<AppState>,
    user_id: UserId,
    Path(game_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = user_id.object_id()?;
    let outcome = store::remove_ownership(&state.db, &game_id, &caller).await?;
    let message = match outcome {
        RemovalOutcome::GameDeleted => "game removed from the collection",
        RemovalOutcome::OwnerRemoved => "your ownership was removed",
    };
    Ok(Json(json!({ "message": message })))
}

#[derive(Deserialize)]
struct BorrowRequest {
    borrower_name: String,
    return_date: String,
}

async fn borrow_game(
    State(state): State<AppState>,
    _user_id: UserId,
    Path(game_id): Path<String>,
    Json(req): Json<BorrowRequest>,
) -> Result<Json<GameView>, ApiError> {
    if req.borrower_name.trim().is_empty() {
        return Err(ApiError::invalid_input("borrower_name is required"));
    }
    let return_date = NaiveDate::parse_from_str(req.return_date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::invalid_input("invalid return date, expected YYYY-MM-DD"))?;

    let game =
        store::borrow_game(&state.db, &game_id, req.borrower_name.trim(), return_date).await?;
    Ok(Json(game.into_view()))
}

async fn return_game(
    State(state): State<AppState>,
    _user_id: UserId,
    Path(game_id): Path<String>,
) -> Result<Json<GameView>, ApiError> {
    let game = store::return_game(&state.db, &game_id).await?;
    Ok(Json(game.into_view()))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "cache_size": state.bgg.cache().len(),
    }))
}

/// Routes that work without a session: catalog search/details and liveness.
pub fn public_game_routes() -> Router<AppState> {
    Router::new()
        .route("/games/search/:query", get(search_games))
        .route("/games/details/:bgg_id", get(game_details))
        .route("/health", get(health))
}

/// Collection routes, mounted behind the auth middleware.
pub fn game_routes() -> Router<AppState> {
    Router::new()
        .route("/games", axum::routing::post(import_game).get(list_games))
        .route("/games/:id", put(update_game).delete(remove_game))
        .route("/games/:id/borrow", put(borrow_game))
        .route("/games/:id/return", put(return_game))
}
