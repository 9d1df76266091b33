//! Test fixtures and server helpers.
//!
//! Provides an in-process server with inspectable stores, and transports
//! that reach it through the loopback HTTP client.

use pairchat_protocol::{HttpRequest, HttpResponse, Message, Timestamp, UserId};
use pairchat_server::{ChatServer, ServerConfig};
use pairchat_store::{
    InMemoryDirectory, InMemoryMessageStore, InMemorySummaryStore, ManualClock, MessageStore,
};
use pairchat_sync::{ConversationSync, HttpTransport, LoopbackClient, SyncConfig};
use std::sync::Arc;
use std::time::Duration;

/// Auth secret used by every test server.
pub const TEST_SECRET: &[u8] = b"pairchat-testkit-secret";

/// Base URL handed to loopback transports.
pub const LOOPBACK_URL: &str = "http://loopback";

/// Server entry point as seen by a loopback client.
pub type Endpoint = Box<dyn Fn(HttpRequest) -> HttpResponse + Send + Sync>;

/// HTTP transport wired straight into a [`TestServer`].
pub type LoopbackTransport = HttpTransport<LoopbackClient<Endpoint>>;

/// Shorthand for a user id known to be valid.
pub fn user(id: &str) -> UserId {
    UserId::new(id).expect("test user ids are non-empty")
}

/// An in-process chat server whose stores stay reachable for assertions.
pub struct TestServer {
    /// The server under test.
    pub server: Arc<ChatServer>,
    /// Message log behind the server.
    pub messages: Arc<InMemoryMessageStore>,
    /// Summary store behind the server.
    pub summaries: Arc<InMemorySummaryStore>,
    /// Directory behind the server.
    pub directory: Arc<InMemoryDirectory>,
    /// Clock shared by the stores and token validation.
    pub clock: Arc<ManualClock>,
}

impl TestServer {
    /// Creates a server with `users` registered and the default config.
    pub fn new(users: impl IntoIterator<Item = UserId>) -> Self {
        Self::with_config(ServerConfig::default(), users)
    }

    /// Creates a server with a custom config. The auth secret is always set.
    pub fn with_config(config: ServerConfig, users: impl IntoIterator<Item = UserId>) -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000)));
        let messages = Arc::new(InMemoryMessageStore::with_clock(clock.clone()));
        let summaries = Arc::new(InMemorySummaryStore::new());
        let directory = Arc::new(InMemoryDirectory::with_users(users));

        let server = ChatServer::with_clock(
            config.with_auth(TEST_SECRET.to_vec()),
            messages.clone(),
            summaries.clone(),
            directory.clone(),
            clock.clone(),
        );

        Self {
            server: Arc::new(server),
            messages,
            summaries,
            directory,
            clock,
        }
    }

    /// The usual pair: `alice` and `bob`.
    pub fn alice_and_bob() -> Self {
        Self::new([user("alice"), user("bob")])
    }

    /// Mints a token for `who`.
    pub fn token(&self, who: &str) -> String {
        self.server
            .issue_token(&user(who))
            .expect("test server has an auth secret")
    }

    /// Creates a loopback transport authenticated as `who`.
    pub fn transport(&self, who: &str) -> Arc<LoopbackTransport> {
        let server = Arc::clone(&self.server);
        let endpoint: Endpoint = Box::new(move |request| server.handle(request));
        Arc::new(HttpTransport::new(
            LOOPBACK_URL,
            self.token(who),
            LoopbackClient::new(endpoint),
        ))
    }

    /// Creates an unopened conversation for `who` talking to `peer`.
    pub fn conversation(&self, who: &str, peer: &str) -> ConversationSync<LoopbackTransport> {
        self.conversation_with(SyncConfig::new(user(who), LOOPBACK_URL), peer)
    }

    /// Like [`conversation`](Self::conversation) with a caller-supplied config.
    pub fn conversation_with(
        &self,
        config: SyncConfig,
        peer: &str,
    ) -> ConversationSync<LoopbackTransport> {
        let who = config.user_id.as_str().to_string();
        ConversationSync::new(config, user(peer), self.transport(&who))
            .expect("fixture conversations have distinct participants")
    }

    /// Appends a message directly to the store, bypassing the send endpoint.
    pub fn append(&self, from: &str, to: &str, content: &str) -> Message {
        self.clock.advance(1);
        self.messages
            .append(&user(from), &user(to), content)
            .expect("test store is open")
    }

    /// Returns every stored message between `a` and `b`, oldest first.
    pub fn stored(&self, a: &str, b: &str) -> Vec<Message> {
        self.messages
            .query_after(&user(a), &user(b), None, usize::MAX)
            .expect("test store is open")
    }

    /// Moves the shared clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by.as_millis() as u64);
    }
}

/// Returns the ids of `messages` as plain integers.
pub fn ids(messages: &[Message]) -> Vec<u64> {
    messages.iter().map(|m| m.id.get()).collect()
}

/// Common server states.
pub mod scenarios {
    use super::*;

    /// Alice and Bob with `count` alternating messages, Bob first.
    pub fn alternating(count: usize) -> TestServer {
        let server = TestServer::alice_and_bob();
        for i in 1..=count {
            let (from, to) = if i % 2 == 1 {
                ("bob", "alice")
            } else {
                ("alice", "bob")
            };
            server.append(from, to, &format!("m{}", i));
        }
        server
    }

    /// Alice and Bob with `count` messages from Bob to Alice.
    pub fn inbox(count: usize) -> TestServer {
        let server = TestServer::alice_and_bob();
        for i in 1..=count {
            server.append("bob", "alice", &format!("m{}", i));
        }
        server
    }
}
