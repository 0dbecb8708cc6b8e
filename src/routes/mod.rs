use axum::{
    extract::{FromRequest, Request},
    http::{header::{CONTENT_TYPE, HOST}, HeaderName, HeaderValue, Method, StatusCode},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::{
    config::ApiKeys,
    error::AppError,
    middleware::auth::API_KEY_HEADER,
    services::{leaderboard_service::LeaderboardService, print_service::PrintGateway},
};

pub mod leaderboard;
pub mod print;

/// `Json` whose rejections become 400 [`AppError::Validation`] responses.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Request logged")
    )
)]
pub async fn root(req: Request) -> StatusCode {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown-host");
    info!("Received request: http://{}{}", host, req.uri().path());
    StatusCode::OK
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
pub async fn health_check() -> &'static str {
    "OK"
}

pub fn init_routes(
    leaderboard_service: Arc<LeaderboardService>,
    print_gateway: Option<Arc<PrintGateway>>,
    api_keys: Arc<ApiKeys>,
) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(leaderboard::leaderboard_routes(leaderboard_service, api_keys.clone()))
        .merge(print::print_routes(print_gateway, api_keys))
}

pub fn cors_layer(frontend_origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list([frontend_origin]))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
        .allow_credentials(true)
}
