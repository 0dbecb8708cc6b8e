use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use crate::services::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid request method")]
    MethodNotAllowed,

    #[error("no documents matched the filter")]
    NotFound,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        AppError::Validation("Invalid JSON data".into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if let AppError::Store(e) = &self {
            error!("{e}");
            return (status, "Internal server error").into_response();
        }

        (status, self.to_string()).into_response()
    }
}
