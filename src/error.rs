/// Unified error types for the Roomwatch console engine
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the console engine
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// Target user, room, admin or email does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Target already has the requested state (e.g., existing admin)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transient backend failure
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    /// Caller lacks the capability required for the action
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Cascading deletion interrupted mid-way; already-deleted documents stay deleted
    #[error("Room deletion interrupted in {collection} after {deleted} documents: {reason}")]
    PartialCascade {
        collection: String,
        deleted: usize,
        reason: String,
    },

    /// Missing or invalid credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// SQLite backend errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Document (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsoleError {
    /// Whether the error comes from the backing store rather than the request
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            ConsoleError::StoreUnavailable(_) | ConsoleError::Database(_)
        )
    }
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Convert ConsoleError to HTTP response
impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ConsoleError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            ConsoleError::Unauthorized(_) => {
                (StatusCode::FORBIDDEN, "Forbidden", self.to_string())
            }
            ConsoleError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            ConsoleError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            ConsoleError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            ConsoleError::StoreUnavailable(_) | ConsoleError::Database(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "StoreUnavailable",
                "Document store unavailable".to_string(),
            ),
            ConsoleError::PartialCascade { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PartialCascade",
                self.to_string(),
            ),
            ConsoleError::Serialization(_) | ConsoleError::Internal(_) | ConsoleError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for console operations
pub type ConsoleResult<T> = Result<T, ConsoleError>;
