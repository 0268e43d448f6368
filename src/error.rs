//! Error types for a3s-beacon

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::types::AlertId;

/// Errors that can occur in the alert engine
#[derive(Debug, Error)]
pub enum BeaconError {
    /// Missing or malformed request field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown alert id
    #[error("Alert not found: {0}")]
    NotFound(AlertId),

    /// Cancel requested for an alert that is already cancelled
    #[error("Alert {0} is already cancelled")]
    AlreadyCancelled(AlertId),

    /// Operation not legal in the alert's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Transaction, query or commit failure
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Schema migration failure
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Notification sink failure
    #[error("Notification error: {0}")]
    Notification(String),

    /// Payload sealing failure
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML config parse failure
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server bind/serve failure
    #[error("Server error: {0}")]
    Server(String),

    /// Request exceeded the server's time limit
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Coarse error classes surfaced to API callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    InvalidState,
    StorageFailure,
    Internal,
}

impl BeaconError {
    /// Classify the error for status mapping
    pub fn kind(&self) -> ErrorKind {
        match self {
            BeaconError::InvalidInput(_) => ErrorKind::InvalidInput,
            BeaconError::NotFound(_) => ErrorKind::NotFound,
            BeaconError::AlreadyCancelled(_) | BeaconError::InvalidState(_) => {
                ErrorKind::InvalidState
            }
            BeaconError::Storage(_) | BeaconError::Migration(_) => ErrorKind::StorageFailure,
            _ => ErrorKind::Internal,
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::StorageFailure | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients
    ///
    /// Storage and internal details stay in the server log.
    pub fn public_message(&self) -> String {
        match self {
            BeaconError::InvalidInput(reason) => reason.clone(),
            BeaconError::NotFound(_) => "Alert not found".to_string(),
            BeaconError::AlreadyCancelled(_) => "Alert is already cancelled".to_string(),
            BeaconError::InvalidState(reason) => reason.clone(),
            BeaconError::Timeout(_) => "Request timed out".to_string(),
            _ => match self.kind() {
                ErrorKind::StorageFailure => "Failed to persist the request".to_string(),
                _ => "Internal server error".to_string(),
            },
        }
    }
}

/// Result type alias for beacon operations
pub type Result<T> = std::result::Result<T, BeaconError>;

impl IntoResponse for BeaconError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        failure_response(status, &self.public_message())
    }
}

/// Failure envelope `{success: false, message, data: null}`
pub(crate) fn failure_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({
        "success": false,
        "message": message,
        "data": null,
    });
    (status, axum::Json(body)).into_response()
}
