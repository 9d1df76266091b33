//! # Pairchat Store
//!
//! Store traits and in-memory implementations for pairchat.
//!
//! The sync core consumes storage only through the narrow traits in this
//! crate. Initialization and teardown belong to the store; callers receive an
//! explicitly passed handle (usually an `Arc<dyn MessageStore>`).
//!
//! ## Design Principles
//!
//! - The message collection is append-only with strictly increasing ids
//! - `append` is the only operation that needs mutual exclusion
//! - Storage failures surface as [`StoreError`], never as empty results
//! - Implementations must be `Send + Sync` for concurrent request handling
//!
//! ## Available Implementations
//!
//! - [`InMemoryMessageStore`] - Message log
//! - [`InMemorySummaryStore`] - Conversation summaries
//! - [`InMemoryDirectory`] - Known participants
//!
//! ## Example
//!
//! ```rust
//! use pairchat_protocol::UserId;
//! use pairchat_store::{InMemoryMessageStore, MessageStore};
//!
//! let store = InMemoryMessageStore::new();
//! let alice = UserId::new("alice").unwrap();
//! let bob = UserId::new("bob").unwrap();
//!
//! let message = store.append(&alice, &bob, "hello").unwrap();
//! let page = store.query_after(&bob, &alice, None, 50).unwrap();
//! assert_eq!(page[0].id, message.id);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;
mod memory;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryDirectory, InMemoryMessageStore, InMemorySummaryStore};
pub use store::{ConversationSummaryStore, MessageStore, ParticipantDirectory};
