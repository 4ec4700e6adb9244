//! Error types for the webhook delivery subsystem.
//!
//! Delivery failures (transport errors, non-2xx responses) are never
//! surfaced through this type. They are recorded on the delivery record
//! and drive the retry policy instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors returned synchronously to callers of the registry, store and service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid webhook: {0}")]
    InvalidWebhook(String),

    #[error("Webhook not found: {0}")]
    WebhookNotFound(String),

    #[error("Delivery not found: {0}")]
    DeliveryNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// JSON error body returned by the management API.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::InvalidWebhook(_) => (StatusCode::BAD_REQUEST, "invalid_webhook"),
            Error::WebhookNotFound(_) => (StatusCode::NOT_FOUND, "webhook_not_found"),
            Error::DeliveryNotFound(_) => (StatusCode::NOT_FOUND, "delivery_not_found"),
            Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error"),
            Error::HttpClient(_) => (StatusCode::INTERNAL_SERVER_ERROR, "http_client_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}
