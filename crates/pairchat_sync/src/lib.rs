//! # Pairchat Sync
//!
//! Client-side synchronization for two-party chat over polling.
//!
//! This crate provides:
//! - The local log and its merge step (duplicate suppression, order preservation)
//! - The per-conversation state machine (idle → loading → polling ⇄ merging → closed)
//! - A tokio poller with cancellation and failure backoff
//! - HTTP transport abstraction plus an in-process loopback
//!
//! ## Architecture
//!
//! The client never asks for full history after the first load:
//! 1. Open: one delta fetch without a cursor seeds the log
//! 2. Poll: fetch messages after the cursor, merge, advance the cursor
//! 3. Send: the stored message is merged at once, or after one catch-up fetch
//!    when other messages were stored since the cursor
//!
//! ## Key Invariants
//!
//! - Every id appears in the local log at most once
//! - Log ids strictly increase
//! - The cursor equals the id of the last logged message
//! - No error shrinks the log or moves the cursor back
//! - Results that arrive after a close or reopen are dropped

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod http;
mod poller;
mod reconciler;
mod session;
mod transport;

pub use client::ChatClient;
pub use config::{BackoffConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use poller::{Poller, PollerHandle};
pub use reconciler::{merge, LocalLog, Merged};
pub use session::{ConversationSnapshot, ConversationSync, PollReport, SyncState, SyncStats};
pub use transport::{ChatRequest, ChatTransport, MockTransport};
