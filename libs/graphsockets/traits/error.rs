use crate::protocol::state::ProtocolError;
use crate::traits::validator::ValidationErrors;
use thiserror::Error;

/// Main error type for graphsockets
#[derive(Error, Debug)]
pub enum GraphSocketError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Server rejected `connection_init`, sent an unexpected frame, or the ack timed out
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Connection-wide failure (keep-alive expiry, socket failure, unscoped decode failure)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection closed before the operation could be performed
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Frame illegal for a subscription's current state
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Query failed client-side validation
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// Non-2xx response on the request/response path
    #[error("Request failed with status {status}: {body}")]
    Request {
        status: u16,
        body: serde_json::Value,
    },

    /// Schema could not be built from an introspection result
    #[error("Introspection failed: {0}")]
    Introspection(String),

    /// No mutually supported sub-protocol
    #[error("Unsupported sub-protocol: {0}")]
    UnsupportedProtocol(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

/// Result type for graphsockets operations
pub type Result<T> = std::result::Result<T, GraphSocketError>;
