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

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("ESI error: {0}")]
    EsiApi(String),

    #[error("Refresh token revoked: {0}")]
    TokenRevoked(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message used when ESI rejects a request because the error budget is spent.
    pub const ESI_ERROR_LIMITED: &'static str = "ESI error limit reached";

    /// Message used when ESI rejects the access token (401).
    pub const ESI_TOKEN_ERROR: &'static str = "ESI token invalid or expired";

    /// Message used when ESI denies access to a resource (403).
    pub const ESI_FORBIDDEN: &'static str = "ESI access forbidden";

    /// True if this is an ESI authorization failure (expired/invalid token, missing scope).
    pub fn is_esi_token_error(&self) -> bool {
        match self {
            AppError::EsiApi(msg) => msg == Self::ESI_TOKEN_ERROR || msg == Self::ESI_FORBIDDEN,
            AppError::TokenRevoked(_) | AppError::InvalidToken => true,
            _ => false,
        }
    }

    /// True if ESI refused access to the resource itself (403).
    pub fn is_forbidden(&self) -> bool {
        matches!(self, AppError::EsiApi(msg) if msg == Self::ESI_FORBIDDEN)
    }

    /// True if ESI throttled us (420 error limit or 429).
    pub fn is_error_limited(&self) -> bool {
        matches!(self, AppError::EsiApi(msg) if msg == Self::ESI_ERROR_LIMITED)
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
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::EsiApi(msg) => (StatusCode::BAD_GATEWAY, "esi_error", Some(msg.clone())),
            AppError::TokenRevoked(_) => (StatusCode::UNAUTHORIZED, "token_revoked", None),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Cache(msg) => {
                tracing::error!(error = %msg, "Cache error");
                (StatusCode::INTERNAL_SERVER_ERROR, "cache_error", None)
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
