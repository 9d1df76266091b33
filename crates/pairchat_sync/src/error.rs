//! Error types for conversation sync.

use pairchat_protocol::{ErrorBody, ErrorKind};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected the input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The addressee does not exist.
    #[error("receiver not found: {0}")]
    ReceiverNotFound(String),

    /// Missing or invalid credential.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Not a participant of the conversation.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The server could not reach its store.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Any other server-side failure.
    #[error("server error ({status}): {message}")]
    ServerError {
        /// HTTP status.
        status: u16,
        /// Error message.
        message: String,
    },

    /// No conversation has been opened yet.
    #[error("conversation is not open")]
    NotOpen,

    /// The conversation was closed.
    #[error("conversation closed")]
    Closed,

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Maps a non-2xx response to an error.
    pub fn from_error_body(status: u16, body: ErrorBody) -> Self {
        match body.kind {
            ErrorKind::InvalidInput => SyncError::InvalidInput(body.message),
            ErrorKind::ReceiverNotFound => SyncError::ReceiverNotFound(body.message),
            ErrorKind::Unauthenticated => SyncError::AuthenticationFailed(body.message),
            ErrorKind::Unauthorized => SyncError::Unauthorized(body.message),
            ErrorKind::StorageUnavailable => SyncError::StorageUnavailable(body.message),
            ErrorKind::NotFound | ErrorKind::MethodNotAllowed | ErrorKind::Internal => {
                SyncError::ServerError {
                    status,
                    message: body.message,
                }
            }
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::NotConnected => true,
            SyncError::StorageUnavailable(_) => true,
            SyncError::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns a short message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncError::InvalidInput(_) => "The message could not be sent. Check its content.",
            SyncError::ReceiverNotFound(_) => "That user does not exist.",
            SyncError::AuthenticationFailed(_) => "Your session has expired. Please sign in again.",
            SyncError::Unauthorized(_) => "You are not part of this conversation.",
            SyncError::StorageUnavailable(_) => "The server is having trouble. Try again shortly.",
            SyncError::Transport { .. } | SyncError::NotConnected | SyncError::Timeout => {
                "Network error. Check your connection and try again."
            }
            SyncError::Protocol(_) | SyncError::ServerError { .. } => {
                "Something went wrong on the server."
            }
            SyncError::NotOpen | SyncError::Closed => "Open a conversation first.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::StorageUnavailable("down".into()).is_retryable());
        assert!(!SyncError::AuthenticationFailed("expired".into()).is_retryable());
        assert!(!SyncError::InvalidInput("empty".into()).is_retryable());
    }

    #[test]
    fn error_body_mapping() {
        let err = SyncError::from_error_body(404, ErrorBody::new(ErrorKind::ReceiverNotFound, "ghost"));
        assert_eq!(err, SyncError::ReceiverNotFound("ghost".into()));

        let err = SyncError::from_error_body(500, ErrorBody::new(ErrorKind::Internal, "boom"));
        assert!(err.is_retryable());

        let err = SyncError::from_error_body(405, ErrorBody::new(ErrorKind::MethodNotAllowed, "GET"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn user_messages_are_distinct_per_send_failure() {
        let messages = [
            SyncError::InvalidInput(String::new()).user_message(),
            SyncError::ReceiverNotFound(String::new()).user_message(),
            SyncError::AuthenticationFailed(String::new()).user_message(),
            SyncError::StorageUnavailable(String::new()).user_message(),
            SyncError::transport_retryable("").user_message(),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConnected;
        assert_eq!(err.to_string(), "not connected to server");

        let err = SyncError::ServerError {
            status: 503,
            message: "busy".into(),
        };
        assert!(err.to_string().contains("503"));
    }
}
