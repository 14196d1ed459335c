//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.

use crate::errors::GameError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (NOT_FOUND, VALIDATION, ALREADY_FULL, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    Validation(String),
    NotFound(String),
    AlreadyFull(String),
    AlreadySettled(String),
    PaymentProvider(String),
    DuplicateCallback(String),
    Internal(String),
}

impl ApiError {
    pub fn validation(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Validation(message),
            request_id,
        }
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn internal(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Internal(message),
            request_id,
        }
    }

    /// Wrap a game error, keeping the taxonomy intact across the wire.
    pub fn from_game(request_id: String, err: GameError) -> Self {
        let kind = match err {
            GameError::Validation(msg) => ApiErrorKind::Validation(msg),
            GameError::NotFound { kind, id } => {
                ApiErrorKind::NotFound(format!("{kind} {id} not found"))
            }
            GameError::AlreadyFull(id) => {
                ApiErrorKind::AlreadyFull(format!("session {id} is already full"))
            }
            GameError::AlreadySettled(id) => {
                ApiErrorKind::AlreadySettled(format!("{id} is already settled"))
            }
            GameError::PaymentProvider(msg) => ApiErrorKind::PaymentProvider(msg),
            GameError::DuplicateCallback(hash) => {
                ApiErrorKind::DuplicateCallback(format!("callback for {hash} already processed"))
            }
        };
        Self { kind, request_id }
    }

    fn status_code_message(&self) -> (StatusCode, &'static str, &str) {
        match &self.kind {
            ApiErrorKind::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION", msg),
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiErrorKind::AlreadyFull(msg) => (StatusCode::CONFLICT, "ALREADY_FULL", msg),
            ApiErrorKind::AlreadySettled(msg) => (StatusCode::CONFLICT, "ALREADY_SETTLED", msg),
            ApiErrorKind::PaymentProvider(msg) => {
                (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER", msg)
            }
            // Duplicates are acknowledged, not failed: the provider retries
            // until it sees success.
            ApiErrorKind::DuplicateCallback(msg) => (StatusCode::OK, "DUPLICATE_CALLBACK", msg),
            ApiErrorKind::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (_, code, message) = self.status_code_message();
        write!(f, "[{}] {}: {}", self.request_id, code, message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.status_code_message();
        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        });
        (status, body).into_response()
    }
}
