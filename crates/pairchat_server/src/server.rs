//! Router and request pipeline.

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use pairchat_protocol::{
    ConversationsRequest, DeltaRequest, HistoryRequest, HttpRequest, HttpResponse, Method,
    SendRequest, SendResponse, UserId, WireMessage, CONVERSATIONS_ROUTE, DELTA_ROUTE,
    HISTORY_ROUTE, SEND_ROUTE,
};
use pairchat_store::{
    Clock, ConversationSummaryStore, InMemoryDirectory, InMemoryMessageStore,
    InMemorySummaryStore, MessageStore, ParticipantDirectory, SystemClock,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Send,
    Delta,
    History,
    Conversations,
}

impl Route {
    fn resolve(path: &str) -> Option<Self> {
        match path {
            SEND_ROUTE => Some(Route::Send),
            DELTA_ROUTE => Some(Route::Delta),
            HISTORY_ROUTE => Some(Route::History),
            CONVERSATIONS_ROUTE => Some(Route::Conversations),
            _ => None,
        }
    }
}

/// The chat server.
///
/// Transport-neutral: a front-end converts its native requests into
/// [`HttpRequest`] and calls [`ChatServer::handle`]. Every request is
/// authenticated before its body is decoded or any store is touched.
///
/// # Example
///
/// ```
/// use pairchat_protocol::{HttpRequest, SendRequest, UserId, WireMessage, SEND_ROUTE};
/// use pairchat_server::{ChatServer, ServerConfig};
///
/// let alice = UserId::new("alice").unwrap();
/// let bob = UserId::new("bob").unwrap();
/// let config = ServerConfig::default().with_auth(b"secret".to_vec());
/// let server = ChatServer::in_memory(config, [alice.clone(), bob.clone()]);
///
/// let token = server.issue_token(&alice).unwrap();
/// let body = SendRequest::new(bob, "hi").encode().unwrap();
/// let response = server.handle(HttpRequest::post(SEND_ROUTE, body).with_bearer(&token));
/// assert!(response.is_success());
/// ```
pub struct ChatServer {
    handler: RequestHandler,
    auth: Option<TokenValidator>,
}

impl ChatServer {
    /// Creates a server over the given collaborators, using the system clock.
    pub fn new(
        config: ServerConfig,
        messages: Arc<dyn MessageStore>,
        summaries: Arc<dyn ConversationSummaryStore>,
        directory: Arc<dyn ParticipantDirectory>,
    ) -> Self {
        Self::with_clock(config, messages, summaries, directory, Arc::new(SystemClock))
    }

    /// Creates a server with a custom clock for read receipts and token expiry.
    pub fn with_clock(
        config: ServerConfig,
        messages: Arc<dyn MessageStore>,
        summaries: Arc<dyn ConversationSummaryStore>,
        directory: Arc<dyn ParticipantDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let auth = config.auth_secret.clone().map(|secret| {
            TokenValidator::with_clock(
                AuthConfig::new(secret).with_expiry(config.token_expiry),
                Arc::clone(&clock),
            )
        });
        let context = HandlerContext::new(config, messages, summaries, directory, clock);

        Self {
            handler: RequestHandler::new(Arc::new(context)),
            auth,
        }
    }

    /// Creates a server backed by fresh in-memory stores with `users` registered.
    pub fn in_memory(config: ServerConfig, users: impl IntoIterator<Item = UserId>) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(InMemorySummaryStore::new()),
            Arc::new(InMemoryDirectory::with_users(users)),
        )
    }

    /// Mints a bearer token for `user`.
    ///
    /// # Errors
    ///
    /// Fails if the server has no auth secret configured.
    pub fn issue_token(&self, user: &UserId) -> ServerResult<String> {
        self.validator()?.create_token(user)
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Handles one request and always produces a response.
    pub fn handle(&self, request: HttpRequest) -> HttpResponse {
        match self.dispatch(&request) {
            Ok(body) => HttpResponse::ok(body),
            Err(err) => {
                if err.is_server_error() {
                    warn!(path = %request.path, error = %err, "request failed");
                } else {
                    debug!(path = %request.path, error = %err, "request rejected");
                }
                let body = err.to_body().encode().unwrap_or_default();
                HttpResponse::with_status(err.status_code(), body)
            }
        }
    }

    fn dispatch(&self, request: &HttpRequest) -> ServerResult<Vec<u8>> {
        let route = Route::resolve(&request.path)
            .ok_or_else(|| ServerError::NotFound(request.path.clone()))?;
        if request.method != Method::Post {
            return Err(ServerError::MethodNotAllowed {
                method: request.method,
                path: request.path.clone(),
            });
        }

        let principal = self.authenticate(request.authorization.as_deref())?;

        let body = match route {
            Route::Send => {
                let message = self
                    .handler
                    .handle_send(&principal, SendRequest::decode(&request.body)?)?;
                encoded(&SendResponse { message })?
            }
            Route::Delta => encoded(
                &self
                    .handler
                    .handle_delta(&principal, DeltaRequest::decode(&request.body)?)?,
            )?,
            Route::History => encoded(
                &self
                    .handler
                    .handle_history(&principal, HistoryRequest::decode(&request.body)?)?,
            )?,
            Route::Conversations => {
                // The body is empty today; still reject garbage.
                if !request.body.is_empty() {
                    ConversationsRequest::decode(&request.body)?;
                }
                encoded(&self.handler.handle_conversations(&principal)?)?
            }
        };
        Ok(body)
    }

    fn authenticate(&self, authorization: Option<&str>) -> ServerResult<UserId> {
        let validator = self.validator()?;
        validator.authenticate(authorization).map_err(|err| {
            info!(error = %err, "authentication failed");
            err
        })
    }

    fn validator(&self) -> ServerResult<&TokenValidator> {
        self.auth
            .as_ref()
            .ok_or_else(|| ServerError::Unauthenticated("server has no auth secret".into()))
    }
}

fn encoded<M: WireMessage>(message: &M) -> ServerResult<Vec<u8>> {
    message
        .encode()
        .map_err(|e| ServerError::Internal(e.to_string()))
}
