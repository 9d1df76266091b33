//! Chat client owning at most one active conversation.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::poller::{Poller, PollerHandle};
use crate::session::{ConversationSnapshot, ConversationSync};
use crate::transport::ChatTransport;
use pairchat_protocol::{ConversationSummary, HistoryRequest, Message, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

struct ActiveConversation<T: ChatTransport> {
    sync: Arc<ConversationSync<T>>,
    poller: PollerHandle,
}

/// Entry point for a UI: opens conversations and keeps the open one polled.
///
/// Opening a new peer closes the previous conversation and stops its poller
/// before the new one starts, so at most one loop runs per client.
pub struct ChatClient<T: ChatTransport + 'static> {
    config: SyncConfig,
    transport: Arc<T>,
    active: Option<ActiveConversation<T>>,
}

impl<T: ChatTransport + 'static> ChatClient<T> {
    /// Creates a client with no open conversation.
    pub fn new(config: SyncConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            active: None,
        }
    }

    /// The local participant.
    pub fn user_id(&self) -> &UserId {
        &self.config.user_id
    }

    /// Opens a conversation with `peer` and starts polling it.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(&mut self, peer: UserId) -> SyncResult<Arc<ConversationSync<T>>> {
        let sync = Arc::new(ConversationSync::new(
            self.config.clone(),
            peer,
            Arc::clone(&self.transport),
        )?);

        self.close().await;

        sync.begin()?;
        let poller = Poller::spawn(Arc::clone(&sync));
        self.active = Some(ActiveConversation {
            sync: Arc::clone(&sync),
            poller,
        });
        Ok(sync)
    }

    /// The open conversation, if any.
    pub fn active(&self) -> Option<&Arc<ConversationSync<T>>> {
        self.active.as_ref().map(|a| &a.sync)
    }

    /// Snapshot updates of the open conversation.
    pub fn subscribe(&self) -> Option<watch::Receiver<ConversationSnapshot>> {
        self.active.as_ref().map(|a| a.poller.subscribe())
    }

    /// Sends a message in the open conversation.
    pub async fn send(&self, content: impl Into<String>) -> SyncResult<Message> {
        let sync = Arc::clone(self.active().ok_or(SyncError::NotOpen)?);
        let content = content.into();
        run_blocking(self.config.timeout, move || sync.send(&content)).await
    }

    /// Closes the open conversation and waits for its poller to exit.
    pub async fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.sync.close();
            active.poller.shutdown().await;
            info!(peer = %active.sync.peer(), "conversation switched off");
        }
    }

    /// Lists this user's conversations, most recent first.
    pub async fn conversations(&self) -> SyncResult<Vec<ConversationSummary>> {
        let transport = Arc::clone(&self.transport);
        run_blocking(self.config.timeout, move || {
            transport.conversations().map(|r| r.conversations)
        })
        .await
    }

    /// Fetches the beginning of the conversation with `peer`.
    pub async fn history(&self, peer: UserId, limit: Option<u32>) -> SyncResult<Vec<Message>> {
        let transport = Arc::clone(&self.transport);
        let request = HistoryRequest {
            other_user_id: peer,
            limit,
        };
        run_blocking(self.config.timeout, move || {
            transport.history(&request).map(|r| r.messages)
        })
        .await
    }
}

impl<T: ChatTransport + 'static> Drop for ChatClient<T> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.sync.close();
            active.poller.stop();
        }
    }
}

/// Runs a blocking transport call, giving up after `timeout`.
///
/// A call that times out may still complete on the blocking pool.
async fn run_blocking<R, F>(timeout: Duration, f: F) -> SyncResult<R>
where
    F: FnOnce() -> SyncResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::time::timeout(timeout, tokio::task::spawn_blocking(f))
        .await
        .map_err(|_| SyncError::Timeout)?
        .map_err(|e| SyncError::transport_fatal(format!("blocking task failed: {}", e)))?
}
