//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::audit::AuditLogError;
use crate::domain::DomainError;
use crate::repository::RepositoryError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // Server errors (5xx)
    #[error("Audit log error: {0}")]
    Audit(#[from] AuditLogError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// Status, machine readable code and optional details for this error
    fn classify(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            // 422 Unprocessable Entity
            AppError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", Some(msg.clone()))
            }

            // 401 Unauthorized
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", None),

            // 403 Forbidden
            AppError::PermissionDenied => (StatusCode::FORBIDDEN, "permission_denied", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => match domain_err {
                DomainError::CardNotFound(id) => {
                    (StatusCode::NOT_FOUND, "card_not_found", Some(id.clone()))
                }
                DomainError::UserNotFound(id) => {
                    (StatusCode::NOT_FOUND, "user_not_found", Some(id.clone()))
                }
                DomainError::Unauthorized(msg) => {
                    (StatusCode::FORBIDDEN, "unauthorized", Some(msg.clone()))
                }
                DomainError::CardNotActive { .. } => {
                    (StatusCode::BAD_REQUEST, "card_not_active", Some(domain_err.to_string()))
                }
                DomainError::InvalidStatusTransition { .. } => (
                    StatusCode::BAD_REQUEST,
                    "invalid_status_transition",
                    Some(domain_err.to_string()),
                ),
                DomainError::ChannelDisabled(_) => {
                    (StatusCode::BAD_REQUEST, "channel_disabled", Some(domain_err.to_string()))
                }
                DomainError::LimitExceeded { .. } => {
                    (StatusCode::BAD_REQUEST, "limit_exceeded", Some(domain_err.to_string()))
                }
                DomainError::BusinessRuleViolation(msg) => {
                    (StatusCode::BAD_REQUEST, "business_rule_violation", Some(msg.clone()))
                }
                DomainError::Validation(msg) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", Some(msg.clone()))
                }
            },

            AppError::Repository(repo_err) => match repo_err {
                RepositoryError::NotFound { kind, id } => {
                    let code = match *kind {
                        "Card" => "card_not_found",
                        "User" => "user_not_found",
                        _ => "not_found",
                    };
                    (StatusCode::NOT_FOUND, code, Some(id.to_string()))
                }
                RepositoryError::VersionConflict { .. } => {
                    (StatusCode::CONFLICT, "version_conflict", Some(repo_err.to_string()))
                }
                RepositoryError::AlreadyExists { key, .. } => {
                    (StatusCode::CONFLICT, "already_exists", Some(key.clone()))
                }
                RepositoryError::Database(e) => {
                    tracing::error!("Database error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
                }
                RepositoryError::Corrupt { .. } => {
                    tracing::error!("Corrupt row: {}", repo_err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
                }
            },

            // 500 Internal Server Error
            AppError::Audit(e) => {
                tracing::error!("Audit log error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "audit_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = self.classify();

        // Server-side failures are logged above; don't leak them to clients
        let error = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
