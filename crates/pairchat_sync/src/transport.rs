//! Transport layer abstraction for chat operations.

use crate::error::{SyncError, SyncResult};
use pairchat_protocol::{
    ConversationsResponse, DeltaRequest, DeltaResponse, HistoryRequest, HistoryResponse, Message,
    SendRequest,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A chat transport handles network communication with the chat server.
///
/// This trait abstracts the network layer, allowing for different implementations
/// (HTTP, an in-process loopback, mock for testing, etc.). Calls block; async
/// callers run them on the blocking pool.
pub trait ChatTransport: Send + Sync {
    /// Fetches messages after the request's cursor.
    fn fetch_delta(&self, request: &DeltaRequest) -> SyncResult<DeltaResponse>;

    /// Sends a message and returns the stored record.
    fn send(&self, request: &SendRequest) -> SyncResult<Message>;

    /// Fetches the beginning of a conversation.
    fn history(&self, request: &HistoryRequest) -> SyncResult<HistoryResponse>;

    /// Lists the caller's conversations.
    fn conversations(&self) -> SyncResult<ConversationsResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> SyncResult<()>;
}

/// A request observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRequest {
    /// Delta fetch.
    Delta(DeltaRequest),
    /// Send.
    Send(SendRequest),
    /// History fetch.
    History(HistoryRequest),
    /// Conversation list.
    Conversations,
}

/// A scripted transport for testing.
///
/// Responses are queued and consumed in order. A delta fetch with nothing
/// queued answers with an empty page, which is what an idle server returns.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    delta_responses: Mutex<VecDeque<SyncResult<DeltaResponse>>>,
    send_responses: Mutex<VecDeque<SyncResult<Message>>>,
    history_response: Mutex<Option<HistoryResponse>>,
    conversations_response: Mutex<Option<ConversationsResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
    latency: Mutex<Duration>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            delta_responses: Mutex::new(VecDeque::new()),
            send_responses: Mutex::new(VecDeque::new()),
            history_response: Mutex::new(None),
            conversations_response: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Queues the result of the next delta fetch.
    pub fn push_delta(&self, response: SyncResult<DeltaResponse>) {
        self.delta_responses.lock().push_back(response);
    }

    /// Queues the result of the next send.
    pub fn push_send(&self, response: SyncResult<Message>) {
        self.send_responses.lock().push_back(response);
    }

    /// Sets the history response.
    pub fn set_history_response(&self, response: HistoryResponse) {
        *self.history_response.lock() = Some(response);
    }

    /// Sets the conversation list response.
    pub fn set_conversations_response(&self, response: ConversationsResponse) {
        *self.conversations_response.lock() = Some(response);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Delays every fetch and send by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Returns every request seen so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// Returns the delta requests seen so far.
    pub fn delta_requests(&self) -> Vec<DeltaRequest> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| match r {
                ChatRequest::Delta(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, request: ChatRequest) -> SyncResult<()> {
        self.requests.lock().push(request);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTransport for MockTransport {
    fn fetch_delta(&self, request: &DeltaRequest) -> SyncResult<DeltaResponse> {
        self.record(ChatRequest::Delta(request.clone()))?;
        self.delta_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(DeltaResponse::new(Vec::new(), request.mode(), false)))
    }

    fn send(&self, request: &SendRequest) -> SyncResult<Message> {
        self.record(ChatRequest::Send(request.clone()))?;
        self.send_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("No mock send response set".into())))
    }

    fn history(&self, request: &HistoryRequest) -> SyncResult<HistoryResponse> {
        self.record(ChatRequest::History(request.clone()))?;
        self.history_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("No mock history response set".into()))
    }

    fn conversations(&self) -> SyncResult<ConversationsResponse> {
        self.record(ChatRequest::Conversations)?;
        self.conversations_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("No mock conversations response set".into()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
