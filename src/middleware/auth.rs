use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::{config::ApiKeys, error::AppError};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Middleware compatible with `middleware::from_fn_with_state`.
/// Rejects the request with 401 unless `X-API-Key` holds one of the
/// configured keys; nothing behind it runs for rejected requests.
pub async fn require_api_key(
    State(keys): State<Arc<ApiKeys>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if keys.contains(key) => Ok(next.run(req).await),
        Some(_) => {
            warn!("Rejected request to {} with an invalid API key", req.uri().path());
            Err(AppError::Unauthorized)
        }
        None => {
            warn!("Rejected request to {} without an API key", req.uri().path());
            Err(AppError::Unauthorized)
        }
    }
}
