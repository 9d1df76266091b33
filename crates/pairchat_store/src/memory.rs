//! In-memory store implementations.

use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::store::{ConversationSummaryStore, MessageStore, ParticipantDirectory};
use pairchat_protocol::{
    ConversationKey, ConversationSummary, Message, MessageId, Timestamp, UserId,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// An in-memory message store.
///
/// Messages live in one vector in id order; a per-conversation index of
/// positions makes pair queries proportional to the conversation size.
///
/// # Thread Safety
///
/// `append` takes the write lock for the whole id assignment, so concurrent
/// senders always observe strictly increasing ids.
///
/// # Example
///
/// ```rust
/// use pairchat_protocol::UserId;
/// use pairchat_store::{InMemoryMessageStore, MessageStore};
///
/// let store = InMemoryMessageStore::new();
/// let a = UserId::new("a").unwrap();
/// let b = UserId::new("b").unwrap();
/// let first = store.append(&a, &b, "one").unwrap();
/// let second = store.append(&b, &a, "two").unwrap();
/// assert!(second.id > first.id);
/// ```
pub struct InMemoryMessageStore {
    log: RwLock<MessageLog>,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

#[derive(Default)]
struct MessageLog {
    messages: Vec<Message>,
    by_conversation: HashMap<ConversationKey, Vec<usize>>,
    last_id: u64,
    last_created_at: Timestamp,
}

impl MessageLog {
    fn positions(&self, a: &UserId, b: &UserId) -> &[usize] {
        ConversationKey::new(a.clone(), b.clone())
            .ok()
            .and_then(|key| self.by_conversation.get(&key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl InMemoryMessageStore {
    /// Creates an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store with a custom clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            log: RwLock::new(MessageLog::default()),
            clock,
            closed: AtomicBool::new(false),
        }
    }

    /// Closes the handle. Every later call fails with [`StoreError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        debug!("message store closed");
    }

    /// Returns true if the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn append(&self, sender: &UserId, receiver: &UserId, content: &str) -> StoreResult<Message> {
        self.ensure_open()?;
        let key = ConversationKey::new(sender.clone(), receiver.clone())
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;

        let mut log = self.log.write();
        log.last_id += 1;
        // Clamp so created_at never runs backwards relative to id order.
        let created_at = self.clock.now().max(log.last_created_at);
        log.last_created_at = created_at;

        let message = Message {
            id: MessageId::new(log.last_id),
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
            content: content.to_string(),
            created_at,
            is_read: false,
            read_at: None,
        };

        let position = log.messages.len();
        log.messages.push(message.clone());
        log.by_conversation.entry(key).or_default().push(position);

        Ok(message)
    }

    fn query_after(
        &self,
        a: &UserId,
        b: &UserId,
        after: Option<MessageId>,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        self.ensure_open()?;
        let log = self.log.read();
        let positions = log.positions(a, b);

        // Positions are in id order, so the first id past the cursor is found
        // by binary search.
        let start = match after {
            Some(cursor) => positions.partition_point(|&p| log.messages[p].id <= cursor),
            None => 0,
        };

        Ok(positions[start..]
            .iter()
            .take(limit)
            .map(|&p| log.messages[p].clone())
            .collect())
    }

    fn query_latest(&self, a: &UserId, b: &UserId, limit: usize) -> StoreResult<Vec<Message>> {
        self.ensure_open()?;
        let log = self.log.read();
        let positions = log.positions(a, b);
        let start = positions.len().saturating_sub(limit);

        Ok(positions[start..]
            .iter()
            .map(|&p| log.messages[p].clone())
            .collect())
    }

    fn mark_read(&self, reader: &UserId, sender: &UserId, at: Timestamp) -> StoreResult<usize> {
        self.ensure_open()?;
        let mut log = self.log.write();
        let positions = log.positions(reader, sender).to_vec();

        let mut changed = 0;
        for p in positions {
            let message = &mut log.messages[p];
            if message.sender_id == *sender && message.receiver_id == *reader && !message.is_read
            {
                message.is_read = true;
                message.read_at = Some(at);
                changed += 1;
            }
        }

        Ok(changed)
    }

    fn read_through(&self, sender: &UserId, reader: &UserId) -> StoreResult<Option<MessageId>> {
        self.ensure_open()?;
        let log = self.log.read();

        Ok(log
            .positions(sender, reader)
            .iter()
            .rev()
            .map(|&p| &log.messages[p])
            .find(|m| m.sender_id == *sender && m.is_read)
            .map(|m| m.id))
    }

    fn len(&self) -> StoreResult<usize> {
        self.ensure_open()?;
        Ok(self.log.read().messages.len())
    }
}

/// In-memory conversation summaries.
#[derive(Debug, Default)]
pub struct InMemorySummaryStore {
    summaries: RwLock<HashMap<ConversationKey, ConversationSummary>>,
}

impl InMemorySummaryStore {
    /// Creates an empty summary store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the summary for a conversation, if one exists.
    pub fn get(&self, key: &ConversationKey) -> Option<ConversationSummary> {
        self.summaries.read().get(key).cloned()
    }
}

impl ConversationSummaryStore for InMemorySummaryStore {
    fn upsert(&self, summary: ConversationSummary) -> StoreResult<bool> {
        let mut summaries = self.summaries.write();
        match summaries.get(&summary.participants) {
            Some(existing) if existing.last_message_id >= summary.last_message_id => Ok(false),
            _ => {
                summaries.insert(summary.participants.clone(), summary);
                Ok(true)
            }
        }
    }

    fn list_for(&self, user: &UserId) -> StoreResult<Vec<ConversationSummary>> {
        let mut list: Vec<ConversationSummary> = self
            .summaries
            .read()
            .values()
            .filter(|s| s.participants.contains(user))
            .cloned()
            .collect();

        list.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then(b.last_message_id.cmp(&a.last_message_id))
        });
        Ok(list)
    }
}

/// In-memory set of known participants.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashSet<UserId>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory containing `users`.
    pub fn with_users(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().collect()),
        }
    }

    /// Registers a participant. Returns false if it was already known.
    pub fn register(&self, user: UserId) -> bool {
        self.users.write().insert(user)
    }
}

impl ParticipantDirectory for InMemoryDirectory {
    fn contains(&self, user: &UserId) -> StoreResult<bool> {
        Ok(self.users.read().contains(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn ids(messages: &[Message]) -> Vec<u64> {
        messages.iter().map(|m| m.id.get()).collect()
    }

    fn seeded(count: usize) -> InMemoryMessageStore {
        let store = InMemoryMessageStore::new();
        for i in 0..count {
            let (from, to) = if i % 2 == 0 { ("a", "b") } else { ("b", "a") };
            store.append(&user(from), &user(to), &format!("m{}", i + 1)).unwrap();
        }
        store
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let store = seeded(3);
        let all = store.query_after(&user("a"), &user("b"), None, 10).unwrap();
        assert_eq!(ids(&all), vec![1, 2, 3]);
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn append_rejects_self_message() {
        let store = InMemoryMessageStore::new();
        let result = store.append(&user("a"), &user("a"), "hi");
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn created_at_never_decreases() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let store = InMemoryMessageStore::with_clock(clock.clone());

        let first = store.append(&user("a"), &user("b"), "one").unwrap();
        clock.set(Timestamp::from_millis(500));
        let second = store.append(&user("a"), &user("b"), "two").unwrap();

        assert!(second.id > first.id);
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn query_after_cursor() {
        let store = seeded(5);
        let page = store
            .query_after(&user("a"), &user("b"), Some(MessageId::new(3)), 10)
            .unwrap();
        assert_eq!(ids(&page), vec![4, 5]);

        let empty = store
            .query_after(&user("a"), &user("b"), Some(MessageId::new(5)), 10)
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn query_after_respects_limit() {
        let store = seeded(5);
        let page = store.query_after(&user("b"), &user("a"), None, 2).unwrap();
        assert_eq!(ids(&page), vec![1, 2]);
    }

    #[test]
    fn query_latest_returns_tail_oldest_first() {
        let store = seeded(5);
        let page = store.query_latest(&user("a"), &user("b"), 3).unwrap();
        assert_eq!(ids(&page), vec![3, 4, 5]);

        let all = store.query_latest(&user("a"), &user("b"), 50).unwrap();
        assert_eq!(ids(&all), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn conversations_are_isolated() {
        let store = seeded(2);
        store.append(&user("a"), &user("c"), "other").unwrap();

        let ab = store.query_after(&user("a"), &user("b"), None, 10).unwrap();
        let ac = store.query_after(&user("c"), &user("a"), None, 10).unwrap();
        assert_eq!(ids(&ab), vec![1, 2]);
        assert_eq!(ids(&ac), vec![3]);
        assert!(store
            .query_after(&user("b"), &user("c"), None, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn mark_read_is_idempotent() {
        let store = seeded(4);
        let at = Timestamp::from_millis(42);

        // b sent messages 2 and 4 to a
        assert_eq!(store.mark_read(&user("a"), &user("b"), at).unwrap(), 2);
        assert_eq!(store.mark_read(&user("a"), &user("b"), at).unwrap(), 0);

        let all = store.query_after(&user("a"), &user("b"), None, 10).unwrap();
        let read: Vec<u64> = all.iter().filter(|m| m.is_read).map(|m| m.id.get()).collect();
        assert_eq!(read, vec![2, 4]);
        assert!(all.iter().filter(|m| m.is_read).all(|m| m.read_at == Some(at)));
    }

    #[test]
    fn read_through_watermark() {
        let store = seeded(4);
        assert_eq!(store.read_through(&user("a"), &user("b")).unwrap(), None);

        store
            .mark_read(&user("b"), &user("a"), Timestamp::from_millis(1))
            .unwrap();
        assert_eq!(
            store.read_through(&user("a"), &user("b")).unwrap(),
            Some(MessageId::new(3))
        );
    }

    #[test]
    fn closed_store_is_unavailable() {
        let store = seeded(1);
        store.close();

        assert!(store.is_closed());
        assert!(matches!(
            store.append(&user("a"), &user("b"), "late"),
            Err(StoreError::Closed)
        ));
        assert!(store
            .query_after(&user("a"), &user("b"), None, 10)
            .unwrap_err()
            .is_unavailable());
    }

    #[test]
    fn concurrent_appends_get_unique_ids() {
        let store = Arc::new(InMemoryMessageStore::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .append(&user("a"), &user("b"), &format!("{}-{}", t, i))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let all = store.query_after(&user("a"), &user("b"), None, 1_000).unwrap();
        assert_eq!(all.len(), 200);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn summary_upsert_never_regresses() {
        let summaries = InMemorySummaryStore::new();
        let key = ConversationKey::new(user("a"), user("b")).unwrap();
        let summary = |id: u64, at: u64| ConversationSummary {
            participants: key.clone(),
            last_message_id: MessageId::new(id),
            last_message_at: Timestamp::from_millis(at),
        };

        assert!(summaries.upsert(summary(2, 20)).unwrap());
        assert!(!summaries.upsert(summary(2, 20)).unwrap());
        assert!(!summaries.upsert(summary(1, 10)).unwrap());
        assert_eq!(summaries.get(&key).unwrap().last_message_id, MessageId::new(2));
    }

    #[test]
    fn summaries_listed_most_recent_first() {
        let summaries = InMemorySummaryStore::new();
        for (peer, id, at) in [("b", 1, 10), ("c", 2, 30), ("d", 3, 20)] {
            summaries
                .upsert(ConversationSummary {
                    participants: ConversationKey::new(user("a"), user(peer)).unwrap(),
                    last_message_id: MessageId::new(id),
                    last_message_at: Timestamp::from_millis(at),
                })
                .unwrap();
        }

        let peers: Vec<String> = summaries
            .list_for(&user("a"))
            .unwrap()
            .iter()
            .filter_map(|s| s.participants.peer_of(&user("a")).map(|p| p.to_string()))
            .collect();
        assert_eq!(peers, vec!["c", "d", "b"]);
        assert_eq!(summaries.list_for(&user("b")).unwrap().len(), 1);
    }

    #[test]
    fn directory_membership() {
        let directory = InMemoryDirectory::with_users([user("a")]);
        assert!(directory.contains(&user("a")).unwrap());
        assert!(!directory.contains(&user("b")).unwrap());
        assert!(directory.register(user("b")));
        assert!(!directory.register(user("b")));
        assert!(directory.contains(&user("b")).unwrap());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cursor_pages_cover_history(total in 0usize..40, page in 1usize..8) {
                let store = seeded(total);
                let mut cursor = None;
                let mut seen = Vec::new();
                loop {
                    let batch = store.query_after(&user("a"), &user("b"), cursor, page).unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    cursor = batch.last().map(|m| m.id);
                    seen.extend(ids(&batch));
                }
                let expected: Vec<u64> = (1..=total as u64).collect();
                prop_assert_eq!(seen, expected);
            }
        }
    }
}
