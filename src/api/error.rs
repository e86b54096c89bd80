use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Not materialized yet; clients poll again.
    #[error("order_not_found")]
    OrderNotFound,

    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid address format")]
    InvalidAddress,

    #[error("Invalid transaction hash format")]
    InvalidTxHash,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::OrderNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Store(e) => {
                error!("Store error while serving request: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string())
            }
            ApiError::InvalidAddress => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::InvalidTxHash => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::InvalidParameter(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidAddress(_) => ApiError::InvalidAddress,
            ValidationError::InvalidTxHash(_) => ApiError::InvalidTxHash,
            ValidationError::MissingParameter(param) => {
                ApiError::BadRequest(format!("Missing parameter: {}", param))
            }
            ValidationError::InvalidParameter(msg) => ApiError::InvalidParameter(msg),
        }
    }
}
