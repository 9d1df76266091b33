//! Request and response bodies exchanged between client and server.

use crate::error::{CodecError, CodecResult};
use crate::ids::{MessageId, UserId};
use crate::message::{ConversationSummary, Message};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A body that travels over the wire as CBOR.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Encodes to CBOR.
    fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(bytes)
    }

    /// Decodes from CBOR.
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
    }
}

/// Whether a delta fetch seeds a conversation or continues from a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchMode {
    /// No cursor: return the most recent window.
    Initial,
    /// Cursor present: return only messages after it.
    Incremental,
}

impl FetchMode {
    /// Derives the mode from a client cursor.
    pub fn for_cursor(cursor: Option<MessageId>) -> Self {
        if cursor.is_some() {
            FetchMode::Incremental
        } else {
            FetchMode::Initial
        }
    }
}

/// Send one message to `receiver_id` as the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Addressee.
    pub receiver_id: UserId,
    /// Message text; trimmed by the server.
    pub content: String,
}

impl SendRequest {
    /// Creates a new send request.
    pub fn new(receiver_id: UserId, content: impl Into<String>) -> Self {
        Self {
            receiver_id,
            content: content.into(),
        }
    }
}

impl WireMessage for SendRequest {}

/// The stored message, including its assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    /// The stored message.
    pub message: Message,
}

impl WireMessage for SendResponse {}

/// Fetch messages between `user_id` and `other_user_id` created after `cursor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRequest {
    /// The requesting participant.
    pub user_id: UserId,
    /// The other participant.
    pub other_user_id: UserId,
    /// Id of the last merged message, or `None` for an initial load.
    pub cursor: Option<MessageId>,
    /// Page size; the server applies its default and maximum.
    pub limit: Option<u32>,
}

impl DeltaRequest {
    /// Creates a delta request with the server's default page size.
    pub fn new(user_id: UserId, other_user_id: UserId, cursor: Option<MessageId>) -> Self {
        Self {
            user_id,
            other_user_id,
            cursor,
            limit: None,
        }
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the fetch mode implied by the cursor.
    pub fn mode(&self) -> FetchMode {
        FetchMode::for_cursor(self.cursor)
    }
}

impl WireMessage for DeltaRequest {}

/// Messages found by a delta fetch, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaResponse {
    /// New messages in creation order.
    pub messages: Vec<Message>,
    /// True only for incremental fetches that found at least one message.
    pub has_more: bool,
    /// True when the page was full and further messages follow the last one.
    pub truncated: bool,
    /// Mode the server answered in.
    pub mode: FetchMode,
    /// Highest id sent by the requester that the other participant has read.
    pub peer_read_through: Option<MessageId>,
}

impl DeltaResponse {
    /// Builds a response, deriving `has_more` from the mode and result.
    pub fn new(messages: Vec<Message>, mode: FetchMode, truncated: bool) -> Self {
        let has_more = mode == FetchMode::Incremental && !messages.is_empty();
        Self {
            messages,
            has_more,
            truncated,
            mode,
            peer_read_through: None,
        }
    }

    /// Sets the read-receipt watermark.
    pub fn with_peer_read_through(mut self, read_through: Option<MessageId>) -> Self {
        self.peer_read_through = read_through;
        self
    }

    /// Returns the id of the newest message in the page.
    pub fn last_id(&self) -> Option<MessageId> {
        self.messages.last().map(|m| m.id)
    }
}

impl WireMessage for DeltaResponse {}

/// Fetch the beginning of a conversation, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// The other participant.
    pub other_user_id: UserId,
    /// Page size; the server applies its default and maximum.
    pub limit: Option<u32>,
}

impl WireMessage for HistoryRequest {}

/// Conversation history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Messages in creation order.
    pub messages: Vec<Message>,
}

impl WireMessage for HistoryResponse {}

/// List the authenticated user's conversations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationsRequest {}

impl WireMessage for ConversationsRequest {}

/// Conversation summaries, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationsResponse {
    /// Summaries ordered by `last_message_at` descending.
    pub conversations: Vec<ConversationSummary>,
}

impl WireMessage for ConversationsResponse {}

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or client-correctable input.
    InvalidInput,
    /// The addressee does not exist.
    ReceiverNotFound,
    /// Missing or invalid bearer credential.
    Unauthenticated,
    /// Authenticated, but not a participant.
    Unauthorized,
    /// The message store could not be reached.
    StorageUnavailable,
    /// Unknown route.
    NotFound,
    /// Route exists but not for this method.
    MethodNotAllowed,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// HTTP status used for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Unauthorized => 403,
            ErrorKind::ReceiverNotFound | ErrorKind::NotFound => 404,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::StorageUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl WireMessage for ErrorBody {}
