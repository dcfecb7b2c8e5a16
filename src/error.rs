// Error handling module
// Defines error types and HTTP response conversion

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One field-level validation error as reported by the resume API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
    pub msg: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub location: String,
}

/// Normalized error body returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, FieldError>>,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: None,
        }
    }

    /// Interpret an upstream error body
    ///
    /// Uses the upstream `message` when the body is a JSON error payload, the
    /// raw text otherwise, and the status reason for an empty body.
    pub fn from_upstream(status: u16, body: &str) -> Self {
        if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
            return payload;
        }

        let text = body.trim();
        if !text.is_empty() {
            return Self::new(text);
        }

        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Upstream request failed");
        Self::new(reason)
    }
}

/// API errors that can occur during request processing
#[derive(Error, Debug)]
pub enum ApiError {
    /// No session cookie on the request
    #[error("Missing credential: no access token cookie")]
    MissingCredential,

    /// Token failed to decode or verify
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Non-2xx answer from the resume API
    #[error("Upstream error: {status} - {}", .payload.message)]
    Upstream { status: u16, payload: ErrorPayload },

    /// Upstream body did not match the expected contract
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (transport failures included)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Status code this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCredential | ApiError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ApiError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Validation(_) | ApiError::Config(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let payload = match self {
            ApiError::MissingCredential => ErrorPayload::new("Unauthorized"),
            ApiError::InvalidToken(msg) => {
                tracing::debug!("Rejected token: {}", msg);
                ErrorPayload::new("Invalid or expired token")
            }
            ApiError::Upstream { payload, .. } => payload,
            ApiError::Validation(msg) => {
                tracing::error!("Upstream contract violation: {}", msg);
                ErrorPayload::new("Internal server error")
            }
            ApiError::Config(msg) => ErrorPayload::new(msg),
            ApiError::Internal(err) => {
                // Log internal errors
                tracing::error!("Internal error: {:?}", err);
                ErrorPayload::new("Internal server error")
            }
        };

        (status, Json(payload)).into_response()
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
