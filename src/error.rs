//! Error types for forgefed
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Coarse classification of failures crossing the federation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fetch or network failure talking to a remote instance
    Transport,
    /// Document could not be decoded into the object graph
    MalformedObject,
    /// Signature invalid, or keyId not bound to the acting actor
    AuthenticationFailed,
    /// Referenced owner, repository, ticket or user is not known locally
    UnknownEntity,
    /// Activity or object type not handled
    UnsupportedType,
    /// Natural key already taken by a different entity
    Conflict,
    /// Bad request input
    Invalid,
    Internal,
}

/// Application-wide error type
///
/// Materializer and dispatcher errors are surfaced verbatim up to the
/// request boundary, where `IntoResponse` picks the status code.
#[derive(Debug, Error)]
pub enum AppError {
    /// Network failure while fetching or delivering (500)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote answered with a non-200 status (500)
    #[error("Fetching {url} failed with status {status}")]
    FetchFailed { url: String, status: u16 },

    /// Body exceeded the configured maximum size (413)
    #[error("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Schema or deserialization failure (500)
    #[error("Malformed object: {0}")]
    MalformedObject(String),

    /// Request carries no usable Signature header (401)
    #[error("Missing HTTP signature")]
    MissingSignature,

    /// Public key document does not match the requested keyId (403)
    #[error("Public key mismatch: {0}")]
    KeyMismatch(String),

    /// Signature verification failed (403)
    #[error("Request signature verification failed")]
    InvalidSignature,

    /// Activity actor is not the owner of the signing key (403)
    #[error("Actor does not match HTTP signature keyId: {0}")]
    ActorKeyMismatch(String),

    /// No local user for an actor IRI (404)
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// Repository owner is not known locally (404)
    #[error("Unknown repository owner: {0}")]
    UnknownOwner(String),

    /// Repository is not known locally (404)
    #[error("Unknown repository: {0}")]
    UnknownRepository(String),

    /// Ticket is not known locally (404)
    #[error("Unknown ticket #{index} in {owner}/{repo}")]
    UnknownTicket {
        owner: String,
        repo: String,
        index: i64,
    },

    /// Activity or object type not handled (500)
    #[error("Unsupported ActivityStreams type: {0}")]
    UnsupportedType(String),

    /// Remote actor document carries no public key (500)
    #[error("Person public key not found: {0}")]
    MissingPublicKey(String),

    /// Local signing key missing or unreadable (500)
    #[error("Signing key unavailable for {0}")]
    MissingSigningKey(String),

    /// Remote ticket index collides with a different local issue (409)
    #[error("Issue index {index} already used in repository {repo_id}")]
    IndexTaken { repo_id: String, index: i64 },

    /// Natural key conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Destination refused by the outbound host guard (403)
    #[error("Access denied")]
    Forbidden,

    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not implemented (501)
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Map the variant onto the federation error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Transport(_)
            | AppError::FetchFailed { .. }
            | AppError::PayloadTooLarge { .. }
            | AppError::Forbidden => ErrorKind::Transport,
            AppError::MalformedObject(_) => ErrorKind::MalformedObject,
            AppError::MissingSignature
            | AppError::KeyMismatch(_)
            | AppError::InvalidSignature
            | AppError::ActorKeyMismatch(_) => ErrorKind::AuthenticationFailed,
            AppError::UnknownUser(_)
            | AppError::UnknownOwner(_)
            | AppError::UnknownRepository(_)
            | AppError::UnknownTicket { .. }
            | AppError::NotFound => ErrorKind::UnknownEntity,
            AppError::UnsupportedType(_) => ErrorKind::UnsupportedType,
            AppError::IndexTaken { .. } | AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Validation(_) => ErrorKind::Invalid,
            AppError::MissingPublicKey(_)
            | AppError::MissingSigningKey(_)
            | AppError::NotImplemented(_)
            | AppError::Database(_)
            | AppError::Config(_)
            | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Transport(_) => (StatusCode::INTERNAL_SERVER_ERROR, "transport"),
            AppError::FetchFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "fetch_failed"),
            AppError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            AppError::MalformedObject(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "malformed_object")
            }
            AppError::MissingSignature => (StatusCode::UNAUTHORIZED, "missing_signature"),
            AppError::KeyMismatch(_) => (StatusCode::FORBIDDEN, "key_mismatch"),
            AppError::InvalidSignature => (StatusCode::FORBIDDEN, "invalid_signature"),
            AppError::ActorKeyMismatch(_) => (StatusCode::FORBIDDEN, "actor_key_mismatch"),
            AppError::UnknownUser(_)
            | AppError::UnknownOwner(_)
            | AppError::UnknownRepository(_)
            | AppError::UnknownTicket { .. } => (StatusCode::NOT_FOUND, "unknown_entity"),
            AppError::UnsupportedType(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "unsupported_type")
            }
            AppError::MissingPublicKey(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "missing_public_key")
            }
            AppError::MissingSigningKey(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "missing_signing_key")
            }
            AppError::IndexTaken { .. } => (StatusCode::CONFLICT, "index_taken"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::NotImplemented(_) => (StatusCode::NOT_IMPLEMENTED, "not_implemented"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_type) = self.status_and_type();
        let error_message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
        } else {
            tracing::debug!(error = %self, error_type, "Request rejected");
        }

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[error_type, "unknown"])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
