//! Store trait definitions.

use crate::error::StoreResult;
use pairchat_protocol::{ConversationSummary, Message, MessageId, Timestamp, UserId};

/// Append-only collection of messages.
///
/// # Invariants
///
/// - `append` assigns ids that are strictly greater than every id assigned
///   before it, even under concurrent callers
/// - `created_at` never decreases as ids increase
/// - Query results for a pair are ordered by `created_at` ascending, ties
///   broken by `id` ascending
/// - An empty result means "no matching messages", never "the store failed"
///
/// # Implementors
///
/// - [`super::InMemoryMessageStore`]
pub trait MessageStore: Send + Sync {
    /// Appends a message and returns it with its assigned `id` and `created_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `sender` and `receiver` are the same participant
    /// - The store cannot be reached
    fn append(&self, sender: &UserId, receiver: &UserId, content: &str) -> StoreResult<Message>;

    /// Returns up to `limit` messages between `a` and `b` with an id greater
    /// than `after`, oldest first. With `after == None` the window starts at
    /// the beginning of the conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn query_after(
        &self,
        a: &UserId,
        b: &UserId,
        after: Option<MessageId>,
        limit: usize,
    ) -> StoreResult<Vec<Message>>;

    /// Returns the newest `limit` messages between `a` and `b`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn query_latest(&self, a: &UserId, b: &UserId, limit: usize) -> StoreResult<Vec<Message>>;

    /// Marks every unread message from `sender` to `reader` as read at `at`.
    ///
    /// Returns the number of messages that changed. Already-read messages are
    /// skipped, so repeating the call is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn mark_read(&self, reader: &UserId, sender: &UserId, at: Timestamp) -> StoreResult<usize>;

    /// Returns the highest id sent by `sender` to `reader` that `reader` has read.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn read_through(&self, sender: &UserId, reader: &UserId) -> StoreResult<Option<MessageId>>;

    /// Returns the total number of stored messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn len(&self) -> StoreResult<usize>;

    /// Returns true if no messages are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Per-conversation summary records ("last message" pointers).
pub trait ConversationSummaryStore: Send + Sync {
    /// Inserts or advances the summary for `summary.participants`.
    ///
    /// Idempotent on an identical `last_message_id`; a summary never moves
    /// back to an older message. Returns true if the record changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn upsert(&self, summary: ConversationSummary) -> StoreResult<bool>;

    /// Returns every conversation `user` takes part in, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn list_for(&self, user: &UserId) -> StoreResult<Vec<ConversationSummary>>;
}

/// Resolves participant identifiers.
pub trait ParticipantDirectory: Send + Sync {
    /// Returns true if `user` is a known participant.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be reached.
    fn contains(&self, user: &UserId) -> StoreResult<bool>;
}
