//! Error types for the chat server.

use pairchat_protocol::{CodecError, ErrorBody, ErrorKind, Method, UserId};
use pairchat_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Client-correctable input problem (empty content, self-send, bad body).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The addressee is not a known participant.
    #[error("receiver not found: {0}")]
    ReceiverNotFound(UserId),

    /// Missing or invalid bearer credential.
    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    /// The caller is not a participant of the requested conversation.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The store could not be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Unknown route.
    #[error("no route for {0}")]
    NotFound(String),

    /// Known route, wrong method.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        /// Method used.
        method: Method,
        /// Path requested.
        path: String,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns the wire category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServerError::ReceiverNotFound(_) => ErrorKind::ReceiverNotFound,
            ServerError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            ServerError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServerError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            ServerError::NotFound(_) => ErrorKind::NotFound,
            ServerError::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            ServerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Converts to the wire error body.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.kind(), self.to_string())
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidRecord(message) => ServerError::InvalidInput(message),
            other => ServerError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<CodecError> for ServerError {
    fn from(err: CodecError) -> Self {
        ServerError::InvalidInput(err.to_string())
    }
}
