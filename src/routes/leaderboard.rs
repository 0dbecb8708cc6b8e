use axum::{
    extract::State,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tracing::info;

use crate::{
    config::ApiKeys,
    error::AppError,
    middleware::auth::require_api_key,
    models::leaderboard::{InsertRequest, LeaderboardEntryResponse, UpdateRequest},
    routes::{method_not_allowed, JsonBody},
    services::leaderboard_service::LeaderboardService,
};

#[utoipa::path(
    post,
    path = "/leaderboardInsert",
    request_body = InsertRequest,
    responses(
        (status = 200, description = "Entry created or incremented, ranks recalculated", body = String),
        (status = 400, description = "Invalid JSON data or empty name"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 405, description = "Invalid request method"),
        (status = 500, description = "Store failure")
    ),
    security(("api_key" = []))
)]
pub async fn insert_entry(
    State(leaderboard_service): State<Arc<LeaderboardService>>,
    JsonBody(req): JsonBody<InsertRequest>,
) -> Result<&'static str, AppError> {
    info!("Inserting data into leaderboard...");
    let name = req.validated_name()?;

    leaderboard_service.insert_or_increment(name).await?;

    Ok("Data processed and ranks updated successfully")
}

#[utoipa::path(
    put,
    path = "/leaderboardUpdate",
    request_body = UpdateRequest,
    responses(
        (status = 200, description = "Document updated", body = String),
        (status = 400, description = "Invalid JSON data, empty filter or update, or bad field"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "No documents matched the filter"),
        (status = 405, description = "Invalid request method"),
        (status = 500, description = "Store failure")
    ),
    security(("api_key" = []))
)]
pub async fn update_entry(
    State(leaderboard_service): State<Arc<LeaderboardService>>,
    JsonBody(req): JsonBody<UpdateRequest>,
) -> Result<&'static str, AppError> {
    let (filter, update) = req.into_documents()?;

    leaderboard_service.update_entry(filter, update).await?;

    Ok("Document updated successfully!")
}

#[utoipa::path(
    get,
    path = "/leaderboardRead",
    responses(
        (status = 200, description = "All entries sorted by rank", body = [LeaderboardEntryResponse]),
        (status = 401, description = "Missing or invalid API key"),
        (status = 405, description = "Invalid request method"),
        (status = 500, description = "Store failure")
    ),
    security(("api_key" = []))
)]
pub async fn read_leaderboard(
    State(leaderboard_service): State<Arc<LeaderboardService>>,
) -> Result<Json<Vec<LeaderboardEntryResponse>>, AppError> {
    let leaderboard = leaderboard_service.get_leaderboard().await?;

    Ok(Json(leaderboard.into_iter().map(Into::into).collect()))
}

pub fn leaderboard_routes(
    leaderboard_service: Arc<LeaderboardService>,
    api_keys: Arc<ApiKeys>,
) -> Router {
    Router::new()
        .route("/leaderboardInsert", post(insert_entry).fallback(method_not_allowed))
        .route("/leaderboardUpdate", put(update_entry).fallback(method_not_allowed))
        .route("/leaderboardRead", get(read_leaderboard).fallback(method_not_allowed))
        .layer(middleware::from_fn_with_state(api_keys, require_api_key))
        .with_state(leaderboard_service)
}
