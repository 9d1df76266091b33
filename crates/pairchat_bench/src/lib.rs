//! Benchmark utilities.

use pairchat_protocol::{Message, MessageId, Timestamp, UserId};
use pairchat_store::{InMemoryMessageStore, MessageStore};
use rand::Rng;

/// Shorthand for a user id known to be valid.
pub fn user(id: &str) -> UserId {
    UserId::new(id).expect("bench user ids are non-empty")
}

/// Generate random printable content of the specified length.
pub fn random_content(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// Generate `count` messages with ids starting at `first`, random senders.
pub fn generate_messages(first: u64, count: usize, content_len: usize) -> Vec<Message> {
    let mut rng = rand::thread_rng();
    let alice = user("alice");
    let bob = user("bob");

    (0..count as u64)
        .map(|i| {
            let (sender, receiver) = if rng.gen::<bool>() {
                (alice.clone(), bob.clone())
            } else {
                (bob.clone(), alice.clone())
            };
            Message {
                id: MessageId::new(first + i),
                sender_id: sender,
                receiver_id: receiver,
                content: random_content(content_len),
                created_at: Timestamp::from_millis(first + i),
                is_read: false,
                read_at: None,
            }
        })
        .collect()
}

/// Create a store holding `count` alice/bob messages, each followed by
/// `noise` messages between carol and alice.
pub fn populated_store(count: usize, noise: usize) -> InMemoryMessageStore {
    let store = InMemoryMessageStore::new();
    let alice = user("alice");
    let bob = user("bob");
    let carol = user("carol");

    for i in 0..count {
        let (sender, receiver) = if i % 2 == 0 { (&alice, &bob) } else { (&bob, &alice) };
        store
            .append(sender, receiver, "ping")
            .expect("in-memory store is open");
        for _ in 0..noise {
            store
                .append(&carol, &alice, "noise")
                .expect("in-memory store is open");
        }
    }

    store
}
