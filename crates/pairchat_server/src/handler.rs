//! Request handlers for the chat endpoints.
//!
//! Handlers receive an already-authenticated principal and a decoded body.
//! Routing, authentication and the wire codec live in [`crate::server`].

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use pairchat_protocol::{
    ConversationKey, ConversationSummary, ConversationsResponse, DeltaRequest, DeltaResponse,
    FetchMode, HistoryRequest, HistoryResponse, Message, SendRequest, UserId,
};
use pairchat_store::{Clock, ConversationSummaryStore, MessageStore, ParticipantDirectory};
use std::sync::Arc;
use tracing::{debug, warn};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Message store (shared across all handlers).
    pub messages: Arc<dyn MessageStore>,
    /// Conversation summary collaborator.
    pub summaries: Arc<dyn ConversationSummaryStore>,
    /// Known participants.
    pub directory: Arc<dyn ParticipantDirectory>,
    /// Time source for read receipts.
    pub clock: Arc<dyn Clock>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(
        config: ServerConfig,
        messages: Arc<dyn MessageStore>,
        summaries: Arc<dyn ConversationSummaryStore>,
        directory: Arc<dyn ParticipantDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            messages,
            summaries,
            directory,
            clock,
        }
    }
}

/// Handler for chat requests.
#[derive(Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Handles a send request from `sender`.
    ///
    /// The stored message is returned even if the summary upsert fails, so
    /// the sender never resubmits a message that was already appended.
    pub fn handle_send(&self, sender: &UserId, request: SendRequest) -> ServerResult<Message> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(ServerError::InvalidInput("message content is empty".into()));
        }
        let max_len = self.context.config.max_content_len;
        if content.chars().count() > max_len {
            return Err(ServerError::InvalidInput(format!(
                "message content exceeds {} characters",
                max_len
            )));
        }
        if *sender == request.receiver_id {
            return Err(ServerError::InvalidInput(
                "cannot send a message to yourself".into(),
            ));
        }
        if !self.context.directory.contains(&request.receiver_id)? {
            return Err(ServerError::ReceiverNotFound(request.receiver_id));
        }

        let message = self
            .context
            .messages
            .append(sender, &request.receiver_id, content)?;
        debug!(id = %message.id, sender = %sender, receiver = %message.receiver_id, "message stored");

        self.update_summary(&message);
        Ok(message)
    }

    /// Handles a delta fetch on behalf of `principal`.
    pub fn handle_delta(
        &self,
        principal: &UserId,
        request: DeltaRequest,
    ) -> ServerResult<DeltaResponse> {
        let peer = self.peer_for(principal, &request)?;
        let limit = self.context.config.page_limit(request.limit);
        let mode = request.mode();

        let (messages, truncated) = match request.cursor {
            None => (
                self.context
                    .messages
                    .query_latest(principal, &peer, limit)?,
                false,
            ),
            Some(cursor) => {
                // One extra row tells us whether the page was cut short.
                let mut messages = self.context.messages.query_after(
                    principal,
                    &peer,
                    Some(cursor),
                    limit + 1,
                )?;
                let truncated = messages.len() > limit;
                messages.truncate(limit);
                (messages, truncated)
            }
        };

        let marked = self
            .context
            .messages
            .mark_read(principal, &peer, self.context.clock.now())?;
        let peer_read_through = self.context.messages.read_through(principal, &peer)?;

        debug!(
            user = %principal,
            peer = %peer,
            cursor = ?request.cursor,
            found = messages.len(),
            truncated,
            marked,
            "delta served"
        );

        Ok(DeltaResponse::new(messages, mode, truncated).with_peer_read_through(peer_read_through))
    }

    /// Handles a history request: the oldest messages of the conversation.
    pub fn handle_history(
        &self,
        principal: &UserId,
        request: HistoryRequest,
    ) -> ServerResult<HistoryResponse> {
        if *principal == request.other_user_id {
            return Err(ServerError::InvalidInput(
                "a conversation needs two distinct participants".into(),
            ));
        }
        let limit = self.context.config.page_limit(request.limit);
        let messages =
            self.context
                .messages
                .query_after(principal, &request.other_user_id, None, limit)?;
        self.context
            .messages
            .mark_read(principal, &request.other_user_id, self.context.clock.now())?;

        Ok(HistoryResponse { messages })
    }

    /// Handles a conversation list request.
    pub fn handle_conversations(&self, principal: &UserId) -> ServerResult<ConversationsResponse> {
        let conversations = self.context.summaries.list_for(principal)?;
        Ok(ConversationsResponse { conversations })
    }

    /// Resolves the other participant, enforcing that `principal` is one of the pair.
    fn peer_for(&self, principal: &UserId, request: &DeltaRequest) -> ServerResult<UserId> {
        if request.user_id == request.other_user_id {
            return Err(ServerError::InvalidInput(
                "a conversation needs two distinct participants".into(),
            ));
        }
        if *principal == request.user_id {
            Ok(request.other_user_id.clone())
        } else if *principal == request.other_user_id {
            Ok(request.user_id.clone())
        } else {
            warn!(user = %principal, "delta requested for a foreign conversation");
            Err(ServerError::Unauthorized(format!(
                "{} is not a participant of this conversation",
                principal
            )))
        }
    }

    fn update_summary(&self, message: &Message) {
        let participants =
            match ConversationKey::new(message.sender_id.clone(), message.receiver_id.clone()) {
                Ok(key) => key,
                Err(e) => {
                    warn!(id = %message.id, error = %e, "stored message has no conversation");
                    return;
                }
            };
        let summary = ConversationSummary {
            participants,
            last_message_id: message.id,
            last_message_at: message.created_at,
        };
        if let Err(e) = self.context.summaries.upsert(summary) {
            warn!(id = %message.id, error = %e, "conversation summary update failed");
        }
    }
}
