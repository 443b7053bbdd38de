// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid PKCE verifier length {0}: must be between 43 and 128")]
    InvalidLength(usize),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("No valid access token: {0}")]
    TokenUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Error message the provider client uses for rejected credentials.
    pub const PROVIDER_TOKEN_ERROR: &'static str = "Token expired or invalid";

    /// Error message the provider client uses for HTTP 429.
    pub const PROVIDER_RATE_LIMIT: &'static str = "Rate limit exceeded";

    /// Whether this error means the user's provider credentials are unusable.
    pub fn is_token_error(&self) -> bool {
        match self {
            AppError::TokenUnavailable(_) => true,
            AppError::UpstreamUnavailable(msg) => {
                msg.contains(Self::PROVIDER_TOKEN_ERROR) || msg.contains("invalid_grant")
            }
            _ => false,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidLength(_) | AppError::InvalidInput(_) => {
                tracing::error!(error = %self, "PKCE misuse");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::UpstreamUnavailable(msg) => {
                (StatusCode::BAD_GATEWAY, "provider_error", Some(msg.clone()))
            }
            AppError::TokenUnavailable(_) => (StatusCode::CONFLICT, "provider_not_connected", None),
            AppError::Persistence(msg) => {
                tracing::error!(error = %msg, "Persistence error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
