//! Local log and the merge step.
//!
//! The merge decides what to append, never what to remove. Read flags are
//! tracked outside the log (see [`crate::ConversationSync`]).

use pairchat_protocol::{Message, MessageId};

/// Ordered, append-only view of one conversation.
///
/// Ids are strictly increasing from front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalLog {
    messages: Vec<Message>,
}

impl LocalLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in display order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Id of the newest message.
    pub fn last_id(&self) -> Option<MessageId> {
        self.messages.last().map(|m| m.id)
    }

    /// Returns true if a message with `id` is present.
    pub fn contains(&self, id: MessageId) -> bool {
        self.position(id).is_some()
    }

    /// Looks up a message by id.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.position(id).map(|i| &self.messages[i])
    }

    /// Iterates over the messages in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.binary_search_by_key(&id, |m| m.id).ok()
    }
}

impl<'a> IntoIterator for &'a LocalLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// Outcome of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    /// The log with surviving candidates appended.
    pub log: LocalLog,
    /// Id of the last appended candidate, or the previous cursor.
    pub cursor: Option<MessageId>,
    /// Number of candidates appended.
    pub appended: usize,
    /// Number of candidates dropped as duplicates or replays.
    pub dropped: usize,
}

/// Merges fetched `candidates` into `log`.
///
/// A candidate survives only if its id is greater than the current tail.
/// Anything at or below the tail is either already present or a replay of
/// an older window. Survivors keep their fetch order; the log is never
/// re-sorted and existing entries are never touched.
pub fn merge(
    mut log: LocalLog,
    cursor: Option<MessageId>,
    candidates: impl IntoIterator<Item = Message>,
) -> Merged {
    let mut tail = log.last_id();
    let mut appended = 0;
    let mut dropped = 0;

    for candidate in candidates {
        if tail.map_or(true, |t| candidate.id > t) {
            tail = Some(candidate.id);
            log.messages.push(candidate);
            appended += 1;
        } else {
            dropped += 1;
        }
    }

    let cursor = if appended > 0 { log.last_id() } else { cursor };
    Merged {
        log,
        cursor,
        appended,
        dropped,
    }
}
