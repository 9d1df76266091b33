//! # Pairchat Protocol
//!
//! Wire types and CBOR codecs for two-party message synchronization.
//!
//! This crate provides:
//! - Identifiers (`UserId`, `MessageId`, `Timestamp`)
//! - The `Message` record and the derived `ConversationKey`
//! - Request/response bodies (send, delta, history, conversations)
//! - A minimal HTTP request/response model shared by server and client
//! - CBOR encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Cursor semantics
//!
//! A client cursor is an `Option<MessageId>`. `None` asks the server for an
//! initial window; `Some(id)` asks only for messages with a greater id.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod http;
mod ids;
mod message;
mod messages;

pub use error::{CodecError, CodecResult};
pub use http::{
    HttpRequest, HttpResponse, Method, CONVERSATIONS_ROUTE, DELTA_ROUTE, HISTORY_ROUTE, SEND_ROUTE,
};
pub use ids::{MessageId, Timestamp, UserId};
pub use message::{ConversationKey, ConversationSummary, Message};
pub use messages::{
    ConversationsRequest, ConversationsResponse, DeltaRequest, DeltaResponse, ErrorBody,
    ErrorKind, FetchMode, HistoryRequest, HistoryResponse, SendRequest, SendResponse, WireMessage,
};

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default number of messages returned by a delta or history fetch.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
