//! Message records and derived conversation types.

use crate::error::CodecError;
use crate::ids::{MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A single text message between two participants.
///
/// `id` and `created_at` are assigned by the store. `is_read`/`read_at` are the
/// only mutable fields and are never touched by the client-side merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier.
    pub id: MessageId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Addressee of the message.
    pub receiver_id: UserId,
    /// Trimmed, non-empty text.
    pub content: String,
    /// Creation time; non-decreasing with `id`.
    pub created_at: Timestamp,
    /// Whether the receiver has observed the message.
    pub is_read: bool,
    /// When the receiver observed the message.
    pub read_at: Option<Timestamp>,
}

impl Message {
    /// Returns true if this message belongs to the conversation between `a` and `b`.
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (self.sender_id == *a && self.receiver_id == *b)
            || (self.sender_id == *b && self.receiver_id == *a)
    }

    /// Returns the conversation this message belongs to.
    pub fn conversation(&self) -> Result<ConversationKey, CodecError> {
        ConversationKey::new(self.sender_id.clone(), self.receiver_id.clone())
    }
}

/// The unordered pair `{A, B}` identifying a conversation.
///
/// Stored normalized (lexicographically smaller id first) so that `{A, B}` and
/// `{B, A}` compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawConversationKey")]
pub struct ConversationKey {
    first: UserId,
    second: UserId,
}

#[derive(Deserialize)]
struct RawConversationKey {
    first: UserId,
    second: UserId,
}

impl TryFrom<RawConversationKey> for ConversationKey {
    type Error = CodecError;

    fn try_from(raw: RawConversationKey) -> Result<Self, Self::Error> {
        Self::new(raw.first, raw.second)
    }
}

impl ConversationKey {
    /// Creates a key for the pair. Fails if both participants are the same.
    pub fn new(a: UserId, b: UserId) -> Result<Self, CodecError> {
        if a == b {
            return Err(CodecError::invalid_value(
                "a conversation needs two distinct participants",
            ));
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { first, second })
    }

    /// Returns both participants in normalized order.
    pub fn participants(&self) -> (&UserId, &UserId) {
        (&self.first, &self.second)
    }

    /// Returns true if `user` is one of the participants.
    pub fn contains(&self, user: &UserId) -> bool {
        self.first == *user || self.second == *user
    }

    /// Returns the participant that is not `user`, if `user` participates.
    pub fn peer_of(&self, user: &UserId) -> Option<&UserId> {
        if self.first == *user {
            Some(&self.second)
        } else if self.second == *user {
            Some(&self.first)
        } else {
            None
        }
    }
}

/// Derived per-conversation record used for ordering conversation lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// The conversation.
    pub participants: ConversationKey,
    /// Most recent message in the conversation.
    pub last_message_id: MessageId,
    /// Creation time of the most recent message.
    pub last_message_at: Timestamp,
}
