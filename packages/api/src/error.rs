//! API errors and their HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use book_core::{BookId, ValidationError};
use db::DbError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("token required")]
    TokenRequired,

    #[error("invalid token")]
    InvalidToken,

    #[error("book not found: {0}")]
    BookNotFound(BookId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("server is shutting down")]
    ShuttingDown,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::TokenRequired | ApiError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            ApiError::BookNotFound(_) | ApiError::Database(DbError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "book not found".to_string())
            }
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, e.message.clone()),
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            ApiError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
