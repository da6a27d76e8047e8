//! MTS SDK error types.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by the token provider, the connection pool and the protocol engine.
///
/// The type is `Clone` so a single transport failure can be delivered to the
/// waiting request and reported through the unhandled-error hook.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MtsError {
    /// The engine or pool is not started, or has already been shut down.
    #[error("Not connected")]
    NotConnected,
    /// Too many requests are in flight.
    #[error("Send buffer full")]
    SendBufferFull,
    /// The encoded envelope exceeds the maximum message size.
    #[error("Message too big: {size} bytes exceeds maximum of {max}")]
    MessageTooBig { size: usize, max: usize },
    /// The authorization server rejected the request or could not be reached.
    #[error("Auth token failure: {0}")]
    AuthTokenFailure(String),
    /// Socket open, write or close failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// No matching response arrived within the retry budget.
    #[error("Protocol timeout")]
    Timeout,
    /// A response could not be attributed or had an unexpected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// The request could not be built or enqueued.
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for MtsError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

impl From<reqwest::Error> for MtsError {
    fn from(error: reqwest::Error) -> Self {
        Self::AuthTokenFailure(error.to_string())
    }
}

impl From<tungstenite::Error> for MtsError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Connection(error.to_string())
    }
}

/// Result type alias for MTS SDK operations.
pub type MtsResult<T> = Result<T, MtsError>;

/// Whether the error was raised before the request reached the outbound queue.
#[must_use]
pub fn is_rejected_before_send(error: &MtsError) -> bool {
    matches!(
        error,
        MtsError::NotConnected
            | MtsError::SendBufferFull
            | MtsError::MessageTooBig { .. }
            | MtsError::SendFailed(_)
    )
}
