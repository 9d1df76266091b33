//! Fault injection for stores and transports.
//!
//! Wrappers that forward to a real implementation until told to misbehave.

use pairchat_protocol::{
    ConversationsResponse, DeltaRequest, DeltaResponse, HistoryRequest, HistoryResponse, Message,
    MessageId, SendRequest, Timestamp, UserId,
};
use pairchat_store::{MessageStore, StoreError, StoreResult};
use pairchat_sync::{ChatTransport, SyncError, SyncResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A message store that can be switched into an outage.
pub struct FlakyStore<S: MessageStore> {
    inner: Arc<S>,
    down: AtomicBool,
    fail_appends: AtomicUsize,
}

impl<S: MessageStore> FlakyStore<S> {
    /// Wraps `inner`; the store starts healthy.
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            fail_appends: AtomicUsize::new(0),
        }
    }

    /// Makes every call fail (or succeed again).
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Makes the next `count` appends fail.
    pub fn fail_next_appends(&self, count: usize) {
        self.fail_appends.store(count, Ordering::SeqCst);
    }

    /// The wrapped store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected outage".into()))
        } else {
            Ok(())
        }
    }
}

impl<S: MessageStore> MessageStore for FlakyStore<S> {
    fn append(&self, sender: &UserId, receiver: &UserId, content: &str) -> StoreResult<Message> {
        self.check()?;
        let pending = self
            .fail_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(StoreError::Unavailable("injected append failure".into()));
        }
        self.inner.append(sender, receiver, content)
    }

    fn query_after(
        &self,
        a: &UserId,
        b: &UserId,
        after: Option<MessageId>,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        self.check()?;
        self.inner.query_after(a, b, after, limit)
    }

    fn query_latest(&self, a: &UserId, b: &UserId, limit: usize) -> StoreResult<Vec<Message>> {
        self.check()?;
        self.inner.query_latest(a, b, limit)
    }

    fn mark_read(&self, reader: &UserId, sender: &UserId, at: Timestamp) -> StoreResult<usize> {
        self.check()?;
        self.inner.mark_read(reader, sender, at)
    }

    fn read_through(&self, sender: &UserId, reader: &UserId) -> StoreResult<Option<MessageId>> {
        self.check()?;
        self.inner.read_through(sender, reader)
    }

    fn len(&self) -> StoreResult<usize> {
        self.check()?;
        self.inner.len()
    }
}

/// A transport that drops, fails or replays responses on request.
///
/// Replaying hands the client a previously seen delta page again, which is
/// what a retried request looks like when the first response was delayed.
pub struct FaultyTransport<T: ChatTransport> {
    inner: Arc<T>,
    fail_fetches: AtomicUsize,
    fail_sends: AtomicUsize,
    replay_next: AtomicBool,
    last_delta: Mutex<Option<DeltaResponse>>,
}

impl<T: ChatTransport> FaultyTransport<T> {
    /// Wraps `inner`; no faults are armed.
    pub fn new(inner: Arc<T>) -> Self {
        Self {
            inner,
            fail_fetches: AtomicUsize::new(0),
            fail_sends: AtomicUsize::new(0),
            replay_next: AtomicBool::new(false),
            last_delta: Mutex::new(None),
        }
    }

    /// Fails the next `count` delta fetches with a retryable error.
    pub fn fail_next_fetches(&self, count: usize) {
        self.fail_fetches.store(count, Ordering::SeqCst);
    }

    /// Fails the next `count` sends with a retryable error.
    pub fn fail_next_sends(&self, count: usize) {
        self.fail_sends.store(count, Ordering::SeqCst);
    }

    /// Answers the next delta fetch with the previous response instead.
    pub fn replay_next_fetch(&self) {
        self.replay_next.store(true, Ordering::SeqCst);
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<T: ChatTransport> ChatTransport for FaultyTransport<T> {
    fn fetch_delta(&self, request: &DeltaRequest) -> SyncResult<DeltaResponse> {
        if Self::take_one(&self.fail_fetches) {
            return Err(SyncError::transport_retryable("injected fetch failure"));
        }
        if self.replay_next.swap(false, Ordering::SeqCst) {
            if let Some(previous) = self.last_delta.lock().clone() {
                return Ok(previous);
            }
        }

        let response = self.inner.fetch_delta(request)?;
        *self.last_delta.lock() = Some(response.clone());
        Ok(response)
    }

    fn send(&self, request: &SendRequest) -> SyncResult<Message> {
        if Self::take_one(&self.fail_sends) {
            return Err(SyncError::transport_retryable("injected send failure"));
        }
        self.inner.send(request)
    }

    fn history(&self, request: &HistoryRequest) -> SyncResult<HistoryResponse> {
        self.inner.history(request)
    }

    fn conversations(&self) -> SyncResult<ConversationsResponse> {
        self.inner.conversations()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn close(&self) -> SyncResult<()> {
        self.inner.close()
    }
}
