//! Error types for the Alto Viewer server

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::proxy::{ErrorCode, ProxyError};

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Invalid JSON body: {0}")]
    Json(#[from] JsonRejection),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            AppError::Proxy(e) => {
                let status = match e {
                    ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => match e.code() {
                        ErrorCode::Validation => StatusCode::FORBIDDEN,
                        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
                        ErrorCode::Transfer => StatusCode::BAD_GATEWAY,
                    },
                };
                let error_type = match e.code() {
                    ErrorCode::Validation => "validation_error",
                    ErrorCode::InvalidRequest => "invalid_request",
                    ErrorCode::Transfer => "transfer_error",
                };
                tracing::warn!("Proxy error: {}", e);
                (status, error_type, e.to_string(), None)
            }
            AppError::Json(rejection) => (
                rejection.status(),
                "bad_request",
                "Request body is not a valid tool call".to_string(),
                Some(rejection.body_text()),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}
