use thiserror::Error;

/// Errors from the REST persistence collaborator.
///
/// Every variant is a failure of a durable write or read: callers roll back
/// the matching optimistic mutation and show `user_message()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No credential available, or the server rejected it (401/403).
    /// Carries the server's `{error}` text when it sent one.
    #[error("not authenticated")]
    Unauthorized(Option<String>),

    #[error("not found")]
    NotFound,

    /// Any other non-2xx status. `message` comes from the `{error}` body when present.
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized(Some(message)) => message.clone(),
            ApiError::Unauthorized(None) => {
                "You are signed out. Sign in again and retry.".to_string()
            }
            ApiError::NotFound => "That item no longer exists.".to_string(),
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Network(_) => "Could not reach the server. Retry or reload.".to_string(),
            ApiError::Decode(_) => "The server sent an unexpected response.".to_string(),
        }
    }
}

/// Errors from the push channel.
///
/// Only handshake errors ever reach a caller; mid-session errors are logged
/// by the connection driver and answered with reconnection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// The handshake was rejected as unauthorized (401/403).
    #[error("push handshake rejected: unauthorized")]
    Unauthorized,

    #[error("push handshake failed: {0}")]
    Handshake(String),

    #[error("push transport error: {0}")]
    Transport(String),

    /// A frame could not be encoded or decoded. The link stays usable.
    #[error("malformed push frame: {0}")]
    Frame(String),

    #[error("push connection closed")]
    Closed,
}

impl PushError {
    /// Whether reconnecting with a fresh credential could possibly help.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PushError::Unauthorized)
    }
}
