//! Error types for the Banagochi client core.
//!
//! # Design
//! Failures are split by layer. `TransportError` is what a transport reports
//! about the wire, `ClientError` is what the HTTP client surfaces after the
//! retry loop, `ServiceError` adds envelope-level outcomes for the resource
//! services. Storage and configuration get their own enums because they fail
//! for unrelated reasons.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Failure reported by a `Transport` before any response was received.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The connection broke or the body could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// The request could not be constructed (bad URL, header or mime type).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }
}

/// Errors returned by `HttpClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The attempt did not complete before the deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// The final response was not 2xx. `body` holds the parsed JSON error
    /// body, or an empty object when it did not parse.
    #[error("HTTP {status} {status_text}")]
    Http {
        status: u16,
        status_text: String,
        body: Value,
    },

    /// The base URL cannot carry a resource path.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }

    /// The `message` field of a JSON error body, when the server sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Http { body, .. } => body.get("message").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Errors from a durable `Storage` backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The key cannot be stored by this backend.
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors returned by the resource services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The server answered with `success: false`.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The envelope was successful but lacked the expected field.
    #[error("response is missing `{0}`")]
    MissingData(&'static str),

    #[error("no active session")]
    NotAuthenticated,
}

impl ServiceError {
    /// Best human-readable message for the UI layer.
    pub fn message(&self) -> String {
        match self {
            ServiceError::Client(err) => err
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
            ServiceError::Rejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Invalid client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}
