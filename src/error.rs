use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;
use crate::store::StoreError;

pub const USERNAME_REQUIRED: &str = "Username is required";
pub const INTERNAL_SERVER_ERROR: &str = "Internal server error";

/// Everything a verdict request can end in besides a verdict
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Username is required")]
    BadRequest,

    #[error("Failed to generate response from Gemini API")]
    GenerationFailed,

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest => StatusCode::BAD_REQUEST,
            AppError::GenerationFailed | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::BadRequest => ErrorResponse {
                error: USERNAME_REQUIRED.to_string(),
                message: None,
            },
            AppError::GenerationFailed | AppError::Internal(_) => {
                tracing::error!("Error in /api/user endpoint: {}", self);
                ErrorResponse {
                    error: INTERNAL_SERVER_ERROR.to_string(),
                    message: Some(self.to_string()),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}
