//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the chat client.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, etc.).

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::ChatTransport;
use pairchat_protocol::{
    ConversationsRequest, ConversationsResponse, DeltaRequest, DeltaResponse, ErrorBody,
    HistoryRequest, HistoryResponse, HttpRequest, HttpResponse, Message, SendRequest,
    SendResponse, WireMessage, CONVERSATIONS_ROUTE, DELTA_ROUTE, HISTORY_ROUTE, SEND_ROUTE,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
/// This allows using different HTTP libraries (reqwest, hyper, ureq, etc.).
pub trait HttpClient: Send + Sync {
    /// Executes a request against an absolute URL held in `request.path`.
    ///
    /// Returns `Err` only when no response was received at all.
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based chat transport.
///
/// Uses CBOR encoding for request/response bodies and authenticates every
/// request with a bearer token.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the chat server (e.g., "https://chat.example.com").
    base_url: String,
    /// Bearer token.
    token: RwLock<String>,
    /// HTTP client implementation.
    client: C,
    /// Connection state.
    connected: AtomicBool,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(token.into()),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Creates a transport for the server named by [`SyncConfig::server_url`].
    pub fn from_config(config: &SyncConfig, token: impl Into<String>, client: C) -> Self {
        Self::new(config.server_url.clone(), token, client)
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replaces the bearer token.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = token.into();
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn post_cbor<Req, Res>(&self, route: &str, request: &Req) -> SyncResult<Res>
    where
        Req: WireMessage,
        Res: WireMessage,
    {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let body = request
            .encode()
            .map_err(|e| SyncError::Protocol(format!("Failed to encode request: {}", e)))?;

        let url = format!("{}{}", self.base_url, route);
        let http_request = HttpRequest::post(url, body).with_bearer(&self.token.read());
        let response = self.client.execute(http_request).map_err(|e| {
            self.set_error(&e);
            SyncError::transport_retryable(e)
        })?;

        if !response.is_success() {
            let err = match ErrorBody::decode(&response.body) {
                Ok(body) => SyncError::from_error_body(response.status, body),
                Err(_) => SyncError::ServerError {
                    status: response.status,
                    message: "unreadable error body".into(),
                },
            };
            debug!(route, status = response.status, error = %err, "request rejected");
            self.set_error(&err.to_string());
            return Err(err);
        }

        self.clear_error();

        Res::decode(&response.body)
            .map_err(|e| SyncError::Protocol(format!("Failed to decode response: {}", e)))
    }
}

impl<C: HttpClient> ChatTransport for HttpTransport<C> {
    fn fetch_delta(&self, request: &DeltaRequest) -> SyncResult<DeltaResponse> {
        self.post_cbor(DELTA_ROUTE, request)
    }

    fn send(&self, request: &SendRequest) -> SyncResult<Message> {
        let response: SendResponse = self.post_cbor(SEND_ROUTE, request)?;
        Ok(response.message)
    }

    fn history(&self, request: &HistoryRequest) -> SyncResult<HistoryResponse> {
        self.post_cbor(HISTORY_ROUTE, request)
    }

    fn conversations(&self) -> SyncResult<ConversationsResponse> {
        self.post_cbor(CONVERSATIONS_ROUTE, &ConversationsRequest::default())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A loopback HTTP client that routes requests directly to a chat server.
///
/// Useful for testing without actual network overhead. The client can be
/// made unreachable to simulate a network outage.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    reachable: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulates losing or regaining the network.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

/// Trait for servers that can handle loopback requests.
///
/// Implemented for any `Fn(HttpRequest) -> HttpResponse`, so a server is
/// plugged in as `move |req| server.handle(req)`.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request and returns the response.
    fn handle(&self, request: HttpRequest) -> HttpResponse;
}

impl<F> LoopbackServer for F
where
    F: Fn(HttpRequest) -> HttpResponse + Send + Sync,
{
    fn handle(&self, request: HttpRequest) -> HttpResponse {
        self(request)
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn execute(&self, mut request: HttpRequest) -> Result<HttpResponse, String> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }

        // Extract path from URL
        if let Some(i) = request.path.find("/api/") {
            request.path = request.path[i..].to_string();
        }

        Ok(self.server.handle(request))
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
