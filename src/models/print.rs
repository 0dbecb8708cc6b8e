use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::AppError;

#[derive(Deserialize, ToSchema)]
pub struct PrintRequest {
    pub message: String,
}

impl PrintRequest {
    pub fn validated_message(&self) -> Result<&str, AppError> {
        if self.message.trim().is_empty() {
            return Err(AppError::Validation("Message cannot be empty".into()));
        }
        Ok(&self.message)
    }
}
