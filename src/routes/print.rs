use axum::{extract::State, middleware, routing::any, Router};
use std::sync::Arc;
use tracing::info;

use crate::{
    config::ApiKeys,
    error::AppError,
    middleware::auth::require_api_key,
    models::print::PrintRequest,
    routes::JsonBody,
    services::print_service::PrintGateway,
};

#[utoipa::path(
    post,
    path = "/sendPrint",
    request_body = PrintRequest,
    responses(
        (status = 200, description = "Print job initiated", body = String),
        (status = 400, description = "Invalid JSON data or empty message"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = []))
)]
pub async fn send_print(
    State(print_gateway): State<Option<Arc<PrintGateway>>>,
    JsonBody(req): JsonBody<PrintRequest>,
) -> Result<&'static str, AppError> {
    let message = req.validated_message()?;
    info!("Print job initiated: {message}");

    match &print_gateway {
        Some(gateway) => gateway.dispatch(
            "leaderboard-message".to_string(),
            "text/plain",
            message.as_bytes().to_vec(),
        ),
        None => info!("Printing is not configured, message only logged"),
    }

    Ok("Print job initiated successfully")
}

pub fn print_routes(print_gateway: Option<Arc<PrintGateway>>, api_keys: Arc<ApiKeys>) -> Router {
    Router::new()
        // any verb is accepted here, unlike the leaderboard routes
        .route("/sendPrint", any(send_print))
        .layer(middleware::from_fn_with_state(api_keys, require_api_key))
        .with_state(print_gateway)
}
