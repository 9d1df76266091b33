//! Property-based test generators using proptest.
//!
//! Provides strategies for message histories and for the fetch results a
//! client may see for them, including overlapping and replayed windows.

use pairchat_protocol::{Message, MessageId, Timestamp, UserId};
use proptest::prelude::*;

/// Strategy for generating valid user ids.
pub fn user_id_strategy() -> impl Strategy<Value = UserId> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}")
        .expect("Invalid regex")
        .prop_map(|s| UserId::new(s).expect("regex yields non-empty ids"))
}

/// Strategy for message content, including blank and padded strings.
pub fn content_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => prop::string::string_regex("[a-zA-Z0-9 ,.!?]{1,64}").expect("Invalid regex"),
        1 => Just(String::new()),
        1 => prop::string::string_regex("[ \t\n]{1,8}").expect("Invalid regex"),
    ]
}

/// Builds a conversation between `alice` and `bob` with ids `1..=count`.
///
/// `from_alice[i]` picks the sender of message `i + 1`; missing entries
/// default to Bob.
pub fn conversation(count: u64, from_alice: &[bool]) -> Vec<Message> {
    let alice = UserId::new("alice").expect("valid id");
    let bob = UserId::new("bob").expect("valid id");

    (1..=count)
        .map(|id| {
            let alice_sends = from_alice.get(id as usize - 1).copied().unwrap_or(false);
            let (sender, receiver) = if alice_sends {
                (alice.clone(), bob.clone())
            } else {
                (bob.clone(), alice.clone())
            };
            Message {
                id: MessageId::new(id),
                sender_id: sender,
                receiver_id: receiver,
                content: format!("m{}", id),
                created_at: Timestamp::from_millis(1_000 + id),
                is_read: false,
                read_at: None,
            }
        })
        .collect()
}

/// Strategy for a server-side history of 0..`max` messages.
pub fn history_strategy(max: u64) -> impl Strategy<Value = Vec<Message>> {
    (0..=max).prop_flat_map(|count| {
        prop::collection::vec(any::<bool>(), count as usize)
            .prop_map(move |senders| conversation(count, &senders))
    })
}

/// A window of a history as a client could receive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Index of the first message in the history.
    pub start: usize,
    /// Number of messages.
    pub len: usize,
}

impl Window {
    /// Cuts this window out of `history`, clamped to its bounds.
    pub fn slice(&self, history: &[Message]) -> Vec<Message> {
        let start = self.start.min(history.len());
        let end = (start + self.len).min(history.len());
        history[start..end].to_vec()
    }
}

/// Strategy for a history plus a sequence of arbitrary windows over it.
///
/// Windows overlap, repeat and go backwards, the way retried or reordered
/// responses would.
pub fn windows_strategy(
    max_history: u64,
    max_windows: usize,
) -> impl Strategy<Value = (Vec<Message>, Vec<Window>)> {
    history_strategy(max_history).prop_flat_map(move |history| {
        let bound = history.len().max(1);
        let windows = prop::collection::vec(
            (0..bound, 0..=bound).prop_map(|(start, len)| Window { start, len }),
            0..=max_windows,
        );
        (Just(history), windows)
    })
}

/// An action in a two-party session.
#[derive(Debug, Clone)]
pub enum ChatOp {
    /// One side sends a message.
    Send {
        /// True if Alice sends, false for Bob.
        alice: bool,
        /// Message body.
        content: String,
    },
    /// One side polls once.
    Poll {
        /// True if Alice polls, false for Bob.
        alice: bool,
    },
    /// One side reopens its conversation.
    Reopen {
        /// True if Alice reopens, false for Bob.
        alice: bool,
    },
}

/// Strategy for a single chat action.
pub fn chat_op_strategy() -> impl Strategy<Value = ChatOp> {
    prop_oneof![
        3 => (any::<bool>(), prop::string::string_regex("[a-z][a-z ]{0,19}").expect("Invalid regex"))
            .prop_map(|(alice, content)| ChatOp::Send { alice, content }),
        3 => any::<bool>().prop_map(|alice| ChatOp::Poll { alice }),
        1 => any::<bool>().prop_map(|alice| ChatOp::Reopen { alice }),
    ]
}

/// Strategy for a sequence of chat actions.
pub fn chat_ops_strategy(max_ops: usize) -> impl Strategy<Value = Vec<ChatOp>> {
    prop::collection::vec(chat_op_strategy(), 0..max_ops)
}
