//! Per-conversation sync state machine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::reconciler::{merge, LocalLog};
use crate::transport::ChatTransport;
use pairchat_protocol::{DeltaRequest, DeltaResponse, Message, MessageId, SendRequest, UserId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The state of one open conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Created but not opened.
    Idle,
    /// Waiting for the initial window.
    Loading,
    /// Seeded; polling for new messages.
    Polling,
    /// Applying a fetched delta.
    Merging,
    /// Closed; no further fetches.
    Closed,
}

impl SyncState {
    /// Returns true while a fetch result is being applied or awaited for the seed.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Loading | SyncState::Merging)
    }

    /// Returns true if a poll may be issued in this state.
    pub fn can_poll(&self) -> bool {
        matches!(self, SyncState::Loading | SyncState::Polling)
    }

    /// Returns true once the conversation is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, SyncState::Closed)
    }
}

/// Statistics about polling and sending.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Polls that completed successfully.
    pub polls_completed: u64,
    /// Polls that failed.
    pub poll_failures: u64,
    /// Failures since the last successful poll.
    pub consecutive_failures: u32,
    /// Messages appended from fetches.
    pub messages_received: u64,
    /// Messages sent by this client.
    pub messages_sent: u64,
    /// Fetch results dropped because the conversation moved on.
    pub stale_discarded: u64,
    /// Last successful poll.
    pub last_poll_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one [`ConversationSync::poll_once`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Delta requests issued (more than one when pages were truncated).
    pub fetches: u32,
    /// Messages appended to the log.
    pub appended: usize,
    /// True if a result arrived after the conversation was closed or reopened.
    pub discarded: bool,
}

/// Point-in-time view of a conversation for a UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    /// The other participant.
    pub peer: UserId,
    /// Current state.
    pub state: SyncState,
    /// Messages in order, with read flags from the receipt table applied.
    pub messages: Vec<Message>,
    /// Id of the last merged message.
    pub cursor: Option<MessageId>,
    /// False after a failed poll until the next success.
    pub connected: bool,
    /// True while polls are rejected for the credential or the conversation.
    /// Polling continues, but the user has to act before it can succeed.
    pub auth_failed: bool,
    /// Highest id this user sent that the peer has read.
    pub peer_read_through: Option<MessageId>,
}

#[derive(Debug)]
struct Inner {
    state: SyncState,
    log: LocalLog,
    cursor: Option<MessageId>,
    generation: u64,
    /// Read flag per message, kept apart from the append-only log.
    receipts: BTreeMap<MessageId, bool>,
    peer_read_through: Option<MessageId>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: SyncState::Idle,
            log: LocalLog::new(),
            cursor: None,
            generation: 0,
            receipts: BTreeMap::new(),
            peer_read_through: None,
        }
    }

    fn reset(&mut self) {
        self.log = LocalLog::new();
        self.cursor = None;
        self.receipts.clear();
        self.peer_read_through = None;
    }

    fn merge(&mut self, candidates: Vec<Message>) -> usize {
        let log = std::mem::take(&mut self.log);
        let merged = merge(log, self.cursor, candidates);
        self.log = merged.log;
        self.cursor = merged.cursor;

        let start = self.log.len() - merged.appended;
        for message in &self.log.messages()[start..] {
            self.receipts.entry(message.id).or_insert(message.is_read);
        }
        merged.appended
    }

    /// A successful fetch marks everything addressed to `user` as read.
    fn mark_incoming_read(&mut self, user: &UserId) {
        for message in self.log.iter().filter(|m| m.receiver_id == *user) {
            self.receipts.insert(message.id, true);
        }
    }

    fn apply_watermark(&mut self, user: &UserId, watermark: Option<MessageId>) {
        let Some(watermark) = watermark else {
            return;
        };
        if self.peer_read_through.is_some_and(|w| w >= watermark) {
            return;
        }
        self.peer_read_through = Some(watermark);
        for message in self
            .log
            .iter()
            .take_while(|m| m.id <= watermark)
            .filter(|m| m.sender_id == *user)
        {
            self.receipts.insert(message.id, true);
        }
    }
}

/// Keeps one conversation's local log in step with the server.
///
/// All methods block on the transport; [`crate::Poller`] drives
/// [`poll_once`](Self::poll_once) from a tokio task.
///
/// # Invariants
///
/// - The log never contains an id twice and its ids strictly increase
/// - The cursor is `None` or the id of the last logged message
/// - Errors never shrink the log or move the cursor back
/// - Results fetched before a [`close`](Self::close) or reopen are dropped
pub struct ConversationSync<T: ChatTransport> {
    config: SyncConfig,
    peer: UserId,
    transport: Arc<T>,
    inner: RwLock<Inner>,
    stats: RwLock<SyncStats>,
    connected: AtomicBool,
    auth_failed: AtomicBool,
}

impl<T: ChatTransport> ConversationSync<T> {
    /// Creates an idle conversation with `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidInput`] if `peer` is the local user.
    pub fn new(config: SyncConfig, peer: UserId, transport: Arc<T>) -> SyncResult<Self> {
        if peer == config.user_id {
            return Err(SyncError::InvalidInput(
                "cannot open a conversation with yourself".into(),
            ));
        }
        Ok(Self {
            config,
            peer,
            transport,
            inner: RwLock::new(Inner::new()),
            stats: RwLock::new(SyncStats::default()),
            connected: AtomicBool::new(false),
            auth_failed: AtomicBool::new(false),
        })
    }

    /// The local participant.
    pub fn user_id(&self) -> &UserId {
        &self.config.user_id
    }

    /// The other participant.
    pub fn peer(&self) -> &UserId {
        &self.peer
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.inner.read().state
    }

    /// Id of the last merged message.
    pub fn cursor(&self) -> Option<MessageId> {
        self.inner.read().cursor
    }

    /// Copy of the log, without read-flag overlay.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.read().log.messages().to_vec()
    }

    /// Returns the read flag of a logged message.
    pub fn is_read(&self, id: MessageId) -> Option<bool> {
        self.inner.read().receipts.get(&id).copied()
    }

    /// Returns true if the last poll succeeded.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns true if the last poll was rejected as unauthenticated or
    /// unauthorized.
    pub fn is_auth_failed(&self) -> bool {
        self.auth_failed.load(Ordering::SeqCst)
    }

    /// Incremented on every open and close.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns a consistent view for rendering.
    pub fn snapshot(&self) -> ConversationSnapshot {
        let inner = self.inner.read();
        let messages = inner
            .log
            .iter()
            .map(|m| {
                let mut m = m.clone();
                if let Some(read) = inner.receipts.get(&m.id) {
                    m.is_read = *read;
                }
                m
            })
            .collect();

        ConversationSnapshot {
            peer: self.peer.clone(),
            state: inner.state,
            messages,
            cursor: inner.cursor,
            connected: self.is_connected(),
            auth_failed: self.is_auth_failed(),
            peer_read_through: inner.peer_read_through,
        }
    }

    /// Clears local state and enters `Loading` without touching the network.
    ///
    /// The next [`poll_once`](Self::poll_once) performs the initial load.
    pub fn begin(&self) -> SyncResult<()> {
        let mut inner = self.inner.write();
        if inner.state.is_closed() {
            return Err(SyncError::Closed);
        }
        inner.reset();
        inner.generation += 1;
        inner.state = SyncState::Loading;
        info!(user = %self.config.user_id, peer = %self.peer, generation = inner.generation, "conversation opened");
        Ok(())
    }

    /// Opens the conversation and performs the initial load.
    ///
    /// A failed initial load leaves the conversation in `Loading`, so the
    /// next poll retries it.
    pub fn open(&self) -> SyncResult<PollReport> {
        self.begin()?;
        self.poll_once()
    }

    /// Fetches and merges everything after the cursor.
    ///
    /// Truncated pages are drained back to back, up to
    /// [`SyncConfig::max_drain_pages`].
    pub fn poll_once(&self) -> SyncResult<PollReport> {
        let mut report = PollReport::default();

        loop {
            let (generation, cursor) = {
                let inner = self.inner.read();
                match inner.state {
                    SyncState::Idle => return Err(SyncError::NotOpen),
                    SyncState::Closed => return Err(SyncError::Closed),
                    _ => (inner.generation, inner.cursor),
                }
            };

            let request = DeltaRequest::new(self.config.user_id.clone(), self.peer.clone(), cursor)
                .with_limit(self.config.page_limit);
            let response = match self.transport.fetch_delta(&request) {
                Ok(response) => response,
                Err(e) => {
                    self.record_failure(&e);
                    return Err(e);
                }
            };
            report.fetches += 1;
            self.record_success();

            let truncated = response.truncated;
            match self.apply(generation, response) {
                Some(appended) => report.appended += appended,
                None => {
                    report.discarded = true;
                    break;
                }
            }

            if !truncated || report.fetches >= self.config.max_drain_pages.max(1) {
                break;
            }
        }

        let mut stats = self.stats.write();
        stats.polls_completed += 1;
        stats.messages_received += report.appended as u64;
        stats.last_poll_time = Some(Instant::now());
        Ok(report)
    }

    /// Sends a message to the peer and merges the stored record.
    ///
    /// When the new id directly follows the cursor nothing can sit between
    /// them, so the record is merged at once and the cursor advances to it.
    /// Otherwise other messages were stored since the last fetch and one of
    /// them may belong to this conversation; a catch-up fetch merges them and
    /// the new record in id order. The same happens for sends issued during
    /// the initial load. Failures are returned to the caller and never
    /// retried.
    pub fn send(&self, content: &str) -> SyncResult<Message> {
        let generation = {
            let inner = self.inner.read();
            match inner.state {
                SyncState::Idle => return Err(SyncError::NotOpen),
                SyncState::Closed => return Err(SyncError::Closed),
                _ => inner.generation,
            }
        };

        let request = SendRequest::new(self.peer.clone(), content);
        let message = match self.transport.send(&request) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "send failed");
                self.stats.write().last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.stats.write().messages_sent += 1;

        let mut inner = self.inner.write();
        if inner.generation != generation || inner.state.is_closed() {
            debug!(id = %message.id, "conversation moved on; sent message not merged");
            return Ok(message);
        }
        let tail = inner.cursor.map_or(0, MessageId::get);
        if inner.state != SyncState::Loading && message.id.get() <= tail + 1 {
            inner.merge(vec![message.clone()]);
            debug!(id = %message.id, cursor = ?inner.cursor, "sent message merged");
            return Ok(message);
        }
        drop(inner);

        debug!(id = %message.id, tail, "id gap after send; catching up");
        if let Err(e) = self.poll_once() {
            debug!(id = %message.id, error = %e, "catch-up failed; next poll picks the message up");
        }
        Ok(message)
    }

    /// Closes the conversation. Later results and calls are ignored.
    pub fn close(&self) {
        let mut inner = self.inner.write();
        if inner.state.is_closed() {
            return;
        }
        inner.state = SyncState::Closed;
        inner.generation += 1;
        inner.reset();
        info!(user = %self.config.user_id, peer = %self.peer, "conversation closed");
    }

    /// Applies a fetch result if it still belongs to the live conversation.
    ///
    /// Returns the number of appended messages, or `None` if the result is stale.
    fn apply(&self, generation: u64, response: DeltaResponse) -> Option<usize> {
        let mut inner = self.inner.write();
        if inner.generation != generation || inner.state.is_closed() {
            self.stats.write().stale_discarded += 1;
            debug!(peer = %self.peer, "discarding stale fetch result");
            return None;
        }

        let seeding = inner.state == SyncState::Loading;
        inner.state = SyncState::Merging;

        let appended = inner.merge(response.messages);
        inner.mark_incoming_read(&self.config.user_id);
        inner.apply_watermark(&self.config.user_id, response.peer_read_through);

        inner.state = SyncState::Polling;
        if appended > 0 {
            debug!(peer = %self.peer, appended, cursor = ?inner.cursor, seeding, "delta merged");
        }
        Some(appended)
    }

    /// Records a poll that did not finish within [`SyncConfig::timeout`].
    pub(crate) fn record_timeout(&self) {
        self.record_failure(&SyncError::Timeout);
    }

    fn record_success(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            debug!(peer = %self.peer, "connected");
        }
        self.auth_failed.store(false, Ordering::SeqCst);
        let mut stats = self.stats.write();
        stats.consecutive_failures = 0;
        stats.last_error = None;
    }

    fn record_failure(&self, err: &SyncError) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        let rejected = matches!(
            err,
            SyncError::AuthenticationFailed(_) | SyncError::Unauthorized(_)
        );
        if rejected && !self.auth_failed.swap(true, Ordering::SeqCst) {
            warn!(peer = %self.peer, error = %err, "poll rejected; credential or membership must change");
        }
        let mut stats = self.stats.write();
        stats.poll_failures += 1;
        stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
        stats.last_error = Some(err.to_string());

        if was_connected {
            warn!(peer = %self.peer, error = %err, "poll failed; connection lost");
        } else {
            debug!(peer = %self.peer, error = %err, failures = stats.consecutive_failures, "poll failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use pairchat_protocol::{FetchMode, Timestamp};

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn message(id: u64, from: &str, to: &str) -> Message {
        Message {
            id: MessageId::new(id),
            sender_id: user(from),
            receiver_id: user(to),
            content: format!("m{}", id),
            created_at: Timestamp::from_millis(id * 100),
            is_read: false,
            read_at: None,
        }
    }

    fn from_bob(ids: impl IntoIterator<Item = u64>) -> Vec<Message> {
        ids.into_iter().map(|id| message(id, "bob", "alice")).collect()
    }

    fn ids(messages: &[Message]) -> Vec<u64> {
        messages.iter().map(|m| m.id.get()).collect()
    }

    fn session() -> (ConversationSync<MockTransport>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let config = SyncConfig::new(user("alice"), "mock://");
        let sync = ConversationSync::new(config, user("bob"), Arc::clone(&transport)).unwrap();
        (sync, transport)
    }

    fn seeded(ids: impl IntoIterator<Item = u64>) -> (ConversationSync<MockTransport>, Arc<MockTransport>) {
        let (sync, transport) = session();
        transport.push_delta(Ok(DeltaResponse::new(from_bob(ids), FetchMode::Initial, false)));
        sync.open().unwrap();
        (sync, transport)
    }

    #[test]
    fn state_helpers() {
        assert!(SyncState::Loading.can_poll());
        assert!(SyncState::Polling.can_poll());
        assert!(!SyncState::Idle.can_poll());
        assert!(SyncState::Merging.is_active());
        assert!(SyncState::Closed.is_closed());
    }

    #[test]
    fn rejects_self_conversation() {
        let config = SyncConfig::new(user("alice"), "mock://");
        let result = ConversationSync::new(config, user("alice"), Arc::new(MockTransport::new()));
        assert!(matches!(result, Err(SyncError::InvalidInput(_))));
    }

    #[test]
    fn idle_conversation_refuses_work() {
        let (sync, transport) = session();
        assert_eq!(sync.state(), SyncState::Idle);
        assert_eq!(sync.poll_once(), Err(SyncError::NotOpen));
        assert_eq!(sync.send("hi"), Err(SyncError::NotOpen));
        assert!(transport.requests().is_empty());
        assert!(!sync.is_connected());
    }

    #[test]
    fn open_seeds_log_and_cursor() {
        let (sync, transport) = seeded(1..=5);

        assert_eq!(sync.state(), SyncState::Polling);
        assert_eq!(ids(&sync.messages()), vec![1, 2, 3, 4, 5]);
        assert_eq!(sync.cursor(), Some(MessageId::new(5)));
        assert!(sync.is_connected());
        assert_eq!(transport.delta_requests()[0].cursor, None);
        assert_eq!(transport.delta_requests()[0].limit, Some(50));
    }

    #[test]
    fn empty_seed_keeps_cursor_none() {
        let (sync, transport) = seeded(std::iter::empty());
        assert_eq!(sync.state(), SyncState::Polling);
        assert_eq!(sync.cursor(), None);

        sync.poll_once().unwrap();
        assert_eq!(transport.delta_requests()[1].cursor, None);
    }

    #[test]
    fn idle_poll_changes_nothing() {
        let (sync, transport) = seeded(1..=5);

        let report = sync.poll_once().unwrap();
        assert_eq!(report.appended, 0);
        assert_eq!(sync.cursor(), Some(MessageId::new(5)));
        assert_eq!(sync.messages().len(), 5);
        assert_eq!(transport.delta_requests()[1].cursor, Some(MessageId::new(5)));
    }

    #[test]
    fn new_message_advances_cursor() {
        let (sync, transport) = seeded(1..=5);
        transport.push_delta(Ok(DeltaResponse::new(from_bob([6]), FetchMode::Incremental, false)));

        let report = sync.poll_once().unwrap();
        assert_eq!(report.appended, 1);
        assert_eq!(ids(&sync.messages()), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(sync.cursor(), Some(MessageId::new(6)));
    }

    #[test]
    fn failed_poll_keeps_state() {
        let (sync, transport) = seeded(1..=3);
        transport.push_delta(Err(SyncError::transport_retryable("connection reset")));

        assert!(sync.poll_once().is_err());
        assert!(!sync.is_connected());
        assert_eq!(sync.messages().len(), 3);
        assert_eq!(sync.cursor(), Some(MessageId::new(3)));
        assert_eq!(sync.state(), SyncState::Polling);
        assert_eq!(sync.stats().consecutive_failures, 1);

        sync.poll_once().unwrap();
        assert!(sync.is_connected());
        assert_eq!(sync.stats().consecutive_failures, 0);
        assert_eq!(sync.stats().poll_failures, 1);
    }

    #[test]
    fn failed_initial_load_is_retried() {
        let (sync, transport) = session();
        transport.push_delta(Err(SyncError::Timeout));

        assert_eq!(sync.open(), Err(SyncError::Timeout));
        assert_eq!(sync.state(), SyncState::Loading);
        assert_eq!(sync.cursor(), None);

        transport.push_delta(Ok(DeltaResponse::new(from_bob([1, 2]), FetchMode::Initial, false)));
        sync.poll_once().unwrap();
        assert_eq!(sync.state(), SyncState::Polling);
        assert_eq!(sync.cursor(), Some(MessageId::new(2)));
        assert!(transport.delta_requests().iter().all(|r| r.cursor.is_none()));
    }

    #[test]
    fn truncated_pages_are_drained() {
        let (sync, transport) = seeded(1..=5);
        transport.push_delta(Ok(DeltaResponse::new(from_bob([6, 7]), FetchMode::Incremental, true)));
        transport.push_delta(Ok(DeltaResponse::new(from_bob([8]), FetchMode::Incremental, false)));

        let report = sync.poll_once().unwrap();
        assert_eq!(report.fetches, 2);
        assert_eq!(report.appended, 3);
        assert_eq!(sync.cursor(), Some(MessageId::new(8)));

        let requests = transport.delta_requests();
        assert_eq!(requests[2].cursor, Some(MessageId::new(7)));
    }

    #[test]
    fn drain_is_bounded() {
        let transport = Arc::new(MockTransport::new());
        let config = SyncConfig::new(user("alice"), "mock://").with_max_drain_pages(2);
        let sync = ConversationSync::new(config, user("bob"), Arc::clone(&transport)).unwrap();
        sync.open().unwrap();

        for id in 1..=3 {
            transport.push_delta(Ok(DeltaResponse::new(from_bob([id]), FetchMode::Incremental, true)));
        }
        let report = sync.poll_once().unwrap();
        assert_eq!(report.fetches, 2);
        assert_eq!(sync.cursor(), Some(MessageId::new(2)));
    }

    #[test]
    fn send_merges_immediately() {
        let (sync, transport) = seeded(1..=2);
        transport.push_send(Ok(message(3, "alice", "bob")));

        let sent = sync.send("m3").unwrap();
        assert_eq!(sent.id, MessageId::new(3));
        assert_eq!(ids(&sync.messages()), vec![1, 2, 3]);
        assert_eq!(sync.cursor(), Some(MessageId::new(3)));

        // An overlapping poll result must not duplicate it.
        transport.push_delta(Ok(DeltaResponse::new(
            vec![message(3, "alice", "bob")],
            FetchMode::Incremental,
            false,
        )));
        sync.poll_once().unwrap();
        assert_eq!(ids(&sync.messages()), vec![1, 2, 3]);
        assert_eq!(transport.delta_requests()[1].cursor, Some(MessageId::new(3)));
    }

    #[test]
    fn send_failure_is_surfaced() {
        let (sync, transport) = seeded(1..=2);
        transport.push_send(Err(SyncError::ReceiverNotFound("bob".into())));

        assert_eq!(sync.send("hi"), Err(SyncError::ReceiverNotFound("bob".into())));
        assert_eq!(sync.messages().len(), 2);
        assert_eq!(sync.cursor(), Some(MessageId::new(2)));
    }

    #[test]
    fn send_after_gap_fetches_first() {
        let (sync, transport) = seeded(1..=2);
        transport.push_send(Ok(message(5, "alice", "bob")));
        let catch_up = vec![message(3, "bob", "alice"), message(5, "alice", "bob")];
        transport.push_delta(Ok(DeltaResponse::new(catch_up, FetchMode::Incremental, false)));

        sync.send("m5").unwrap();
        assert_eq!(ids(&sync.messages()), vec![1, 2, 3, 5]);
        assert_eq!(sync.cursor(), Some(MessageId::new(5)));
        assert_eq!(transport.delta_requests()[1].cursor, Some(MessageId::new(2)));
    }

    #[test]
    fn failed_catch_up_leaves_message_for_next_poll() {
        let (sync, transport) = seeded(1..=2);
        transport.push_send(Ok(message(4, "alice", "bob")));
        transport.push_delta(Err(SyncError::transport_retryable("offline")));

        let sent = sync.send("m4").unwrap();
        assert_eq!(sent.id, MessageId::new(4));
        assert_eq!(ids(&sync.messages()), vec![1, 2]);
        assert_eq!(sync.cursor(), Some(MessageId::new(2)));

        transport.push_delta(Ok(DeltaResponse::new(
            vec![message(4, "alice", "bob")],
            FetchMode::Incremental,
            false,
        )));
        sync.poll_once().unwrap();
        assert_eq!(ids(&sync.messages()), vec![1, 2, 4]);
    }

    #[test]
    fn send_during_loading_runs_the_seed() {
        let (sync, transport) = session();
        sync.begin().unwrap();
        transport.push_send(Ok(message(6, "alice", "bob")));
        let seed = vec![message(4, "bob", "alice"), message(5, "bob", "alice"), message(6, "alice", "bob")];
        transport.push_delta(Ok(DeltaResponse::new(seed, FetchMode::Initial, false)));

        sync.send("m6").unwrap();
        assert_eq!(sync.state(), SyncState::Polling);
        assert_eq!(ids(&sync.messages()), vec![4, 5, 6]);
        assert_eq!(sync.cursor(), Some(MessageId::new(6)));
    }

    #[test]
    fn close_stops_everything() {
        let (sync, transport) = seeded(1..=3);
        let requests_before = transport.requests().len();
        sync.close();

        assert_eq!(sync.state(), SyncState::Closed);
        assert_eq!(sync.poll_once(), Err(SyncError::Closed));
        assert_eq!(sync.send("late"), Err(SyncError::Closed));
        assert_eq!(sync.begin(), Err(SyncError::Closed));
        assert_eq!(transport.requests().len(), requests_before);
        assert!(sync.messages().is_empty());
        assert_eq!(sync.cursor(), None);
    }

    #[test]
    fn stale_results_are_discarded() {
        let (sync, _transport) = seeded(1..=3);
        let old_generation = sync.generation();

        // Reopen while a fetch from the old generation is "in flight".
        sync.begin().unwrap();
        let late = DeltaResponse::new(from_bob([4]), FetchMode::Incremental, false);
        assert_eq!(sync.apply(old_generation, late), None);
        assert!(sync.messages().is_empty());
        assert_eq!(sync.stats().stale_discarded, 1);

        sync.close();
        let late = DeltaResponse::new(from_bob([5]), FetchMode::Incremental, false);
        assert_eq!(sync.apply(old_generation + 1, late), None);
    }

    #[test]
    fn read_receipts_live_beside_the_log() {
        let (sync, transport) = session();
        let seed = vec![message(1, "bob", "alice"), message(2, "alice", "bob")];
        transport.push_delta(Ok(
            DeltaResponse::new(seed, FetchMode::Initial, false).with_peer_read_through(None),
        ));
        sync.open().unwrap();

        // Incoming messages were marked read by the fetch itself.
        assert_eq!(sync.is_read(MessageId::new(1)), Some(true));
        assert_eq!(sync.is_read(MessageId::new(2)), Some(false));

        transport.push_delta(Ok(DeltaResponse::new(vec![], FetchMode::Incremental, false)
            .with_peer_read_through(Some(MessageId::new(2)))));
        sync.poll_once().unwrap();

        let snapshot = sync.snapshot();
        assert!(snapshot.messages.iter().all(|m| m.is_read));
        assert_eq!(snapshot.peer_read_through, Some(MessageId::new(2)));
        // The log itself is never rewritten.
        assert!(!sync.messages()[1].is_read);
    }

    #[test]
    fn rejected_poll_is_flagged_until_success() {
        let (sync, transport) = seeded(1..=2);
        transport.push_delta(Err(SyncError::AuthenticationFailed("expired".into())));

        assert!(sync.poll_once().is_err());
        let snapshot = sync.snapshot();
        assert!(snapshot.auth_failed);
        assert!(!snapshot.connected);
        assert_eq!(snapshot.cursor, Some(MessageId::new(2)));

        // A network failure does not clear the flag; only a success does.
        transport.push_delta(Err(SyncError::Timeout));
        assert!(sync.poll_once().is_err());
        assert!(sync.is_auth_failed());

        sync.poll_once().unwrap();
        assert!(!sync.is_auth_failed());
        assert!(sync.is_connected());
    }

    #[test]
    fn snapshot_reflects_state() {
        let (sync, transport) = seeded(1..=2);
        transport.push_delta(Err(SyncError::NotConnected));
        let _ = sync.poll_once();

        let snapshot = sync.snapshot();
        assert_eq!(snapshot.peer, user("bob"));
        assert_eq!(snapshot.state, SyncState::Polling);
        assert_eq!(snapshot.cursor, Some(MessageId::new(2)));
        assert!(!snapshot.connected);
        assert!(!snapshot.auth_failed);
    }
}
