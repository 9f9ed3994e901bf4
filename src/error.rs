//! Error handling module
//!
//! Provides unified error types and handling for the entire application.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::connector::ConnectorError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Connector unavailable: {0}")]
    ConnectorUnavailable(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Invalid audit event: {0}")]
    InvalidEvent(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ConnectorError> for GovernanceError {
    fn from(err: ConnectorError) -> Self {
        GovernanceError::ConnectorUnavailable(err.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for GovernanceError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            GovernanceError::DuplicateIdentifier(msg) => (
                StatusCode::CONFLICT,
                "DUPLICATE_IDENTIFIER",
                msg.clone(),
                None,
            ),
            GovernanceError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                None,
            ),
            GovernanceError::InvalidTransition(msg) => (
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                msg.clone(),
                None,
            ),
            GovernanceError::ConnectorUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CONNECTOR_UNAVAILABLE",
                msg.clone(),
                None,
            ),
            GovernanceError::Evaluation(msg) => {
                error!("Evaluation error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "EVALUATION_ERROR",
                    "A policy evaluation error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            GovernanceError::InvalidEvent(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_EVENT",
                msg.clone(),
                None,
            ),
            GovernanceError::Persistence(msg) => {
                error!("Persistence error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSISTENCE_ERROR",
                    "A storage backend error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            GovernanceError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            GovernanceError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "A configuration error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, GovernanceError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> GovernanceError {
    GovernanceError::Validation(msg.into())
}

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> GovernanceError {
    GovernanceError::NotFound(msg.into())
}

/// Helper function to create a duplicate identifier error
pub fn duplicate_error(msg: impl Into<String>) -> GovernanceError {
    GovernanceError::DuplicateIdentifier(msg.into())
}
