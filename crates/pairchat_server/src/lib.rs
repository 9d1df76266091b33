//! # Pairchat Server
//!
//! Delta fetch and send endpoints for two-party chat.
//!
//! This crate provides:
//! - Request handlers (send, delta, history, conversations)
//! - A transport-neutral router over [`pairchat_protocol::HttpRequest`]
//! - Authentication (HMAC-SHA256 bearer tokens)
//!
//! # Architecture
//!
//! The server is stateless between requests. All state lives behind the
//! store traits of `pairchat_store`:
//! - [`pairchat_store::MessageStore`] assigns ids and answers pair queries
//! - [`pairchat_store::ConversationSummaryStore`] tracks the last message
//! - [`pairchat_store::ParticipantDirectory`] resolves receivers
//!
//! # Authentication
//!
//! Every route requires a bearer token. A server without a secret rejects
//! every request:
//!
//! ```rust
//! use pairchat_protocol::UserId;
//! use pairchat_server::{AuthConfig, TokenValidator};
//!
//! let validator = TokenValidator::new(AuthConfig::new(b"my-secure-secret".to_vec()));
//! let alice = UserId::new("alice").unwrap();
//! let token = validator.create_token(&alice).unwrap();
//! assert_eq!(validator.validate_token(&token).unwrap(), alice);
//! ```
//!
//! # Protocol
//!
//! 1. Client opens a conversation with a delta fetch without a cursor
//! 2. Client polls with the id of the last merged message
//! 3. Sends return the stored message so the sender merges it immediately

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::{AuthConfig, TokenValidator};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::ChatServer;
