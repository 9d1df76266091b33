//! Integration tests for the sync client against an in-process server.

use pairchat_protocol::{HttpRequest, MessageId, SendRequest, UserId};
use pairchat_server::{ChatServer, ServerConfig};
use pairchat_store::{InMemoryDirectory, InMemoryMessageStore, InMemorySummaryStore};
use pairchat_sync::{
    ChatTransport, ConversationSync, HttpTransport, LoopbackClient, LoopbackServer, SyncConfig,
    SyncError, SyncState,
};
use std::sync::Arc;

const SECRET: &[u8] = b"integration-secret";

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn server() -> Arc<ChatServer> {
    Arc::new(ChatServer::in_memory(
        ServerConfig::default().with_auth(SECRET.to_vec()),
        [user("alice"), user("bob")],
    ))
}

fn transport_for(
    server: &Arc<ChatServer>,
    who: &str,
) -> Arc<HttpTransport<LoopbackClient<impl LoopbackServer>>> {
    let token = server.issue_token(&user(who)).unwrap();
    let handle = Arc::clone(server);
    let client = LoopbackClient::new(move |request: HttpRequest| handle.handle(request));
    Arc::new(HttpTransport::new("http://loopback", token, client))
}

fn ids(messages: &[pairchat_protocol::Message]) -> Vec<u64> {
    messages.iter().map(|m| m.id.get()).collect()
}

#[test]
fn initial_load_then_incremental() {
    let server = server();
    let bob = transport_for(&server, "bob");
    for i in 1..=5 {
        bob.send(&SendRequest::new(user("alice"), format!("m{}", i)))
            .unwrap();
    }

    let sync = ConversationSync::new(
        SyncConfig::new(user("alice"), "http://loopback"),
        user("bob"),
        transport_for(&server, "alice"),
    )
    .unwrap();

    sync.open().unwrap();
    assert_eq!(ids(&sync.messages()), vec![1, 2, 3, 4, 5]);
    assert_eq!(sync.cursor(), Some(MessageId::new(5)));

    let report = sync.poll_once().unwrap();
    assert_eq!(report.appended, 0);
    assert_eq!(sync.cursor(), Some(MessageId::new(5)));

    bob.send(&SendRequest::new(user("alice"), "m6")).unwrap();
    sync.poll_once().unwrap();
    assert_eq!(ids(&sync.messages()), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(sync.cursor(), Some(MessageId::new(6)));
}

#[test]
fn both_sides_converge() {
    let server = server();
    let alice = ConversationSync::new(
        SyncConfig::new(user("alice"), "http://loopback"),
        user("bob"),
        transport_for(&server, "alice"),
    )
    .unwrap();
    let bob = ConversationSync::new(
        SyncConfig::new(user("bob"), "http://loopback"),
        user("alice"),
        transport_for(&server, "bob"),
    )
    .unwrap();

    alice.open().unwrap();
    bob.open().unwrap();

    alice.send("hi bob").unwrap();
    bob.poll_once().unwrap();
    bob.send("hi alice").unwrap();
    alice.poll_once().unwrap();
    alice.send("how are you").unwrap();
    bob.poll_once().unwrap();

    assert_eq!(ids(&alice.messages()), vec![1, 2, 3]);
    assert_eq!(ids(&bob.messages()), vec![1, 2, 3]);

    // Each side has read what the other sent before its last poll.
    assert_eq!(alice.snapshot().peer_read_through, Some(MessageId::new(1)));
    assert_eq!(alice.is_read(MessageId::new(1)), Some(true));
    assert_eq!(bob.snapshot().peer_read_through, Some(MessageId::new(2)));
    assert_eq!(bob.is_read(MessageId::new(2)), Some(true));
}

#[test]
fn send_then_poll_keeps_one_copy() {
    let server = server();
    let transport = transport_for(&server, "alice");
    let sync = ConversationSync::new(
        SyncConfig::new(user("alice"), "http://loopback"),
        user("bob"),
        Arc::clone(&transport),
    )
    .unwrap();
    sync.open().unwrap();

    let sent = sync.send("hello").unwrap();
    assert_eq!(sync.cursor(), Some(sent.id));

    sync.poll_once().unwrap();
    assert_eq!(ids(&sync.messages()), vec![sent.id.get()]);
}

#[test]
fn self_send_is_rejected() {
    let server = server();
    let alice = transport_for(&server, "alice");

    let result = alice.send(&SendRequest::new(user("alice"), "hi"));
    assert!(matches!(result, Err(SyncError::InvalidInput(_))));
}

#[test]
fn unknown_receiver_is_reported() {
    let server = server();
    let alice = transport_for(&server, "alice");

    let err = alice
        .send(&SendRequest::new(user("ghost"), "hi"))
        .unwrap_err();
    assert!(matches!(err, SyncError::ReceiverNotFound(_)));
    assert!(!err.is_retryable());
}

#[test]
fn outage_keeps_log_and_recovers() {
    let server = server();
    let transport = transport_for(&server, "alice");
    let bob = transport_for(&server, "bob");
    bob.send(&SendRequest::new(user("alice"), "before")).unwrap();

    let sync = ConversationSync::new(
        SyncConfig::new(user("alice"), "http://loopback"),
        user("bob"),
        Arc::clone(&transport),
    )
    .unwrap();
    sync.open().unwrap();
    assert!(sync.is_connected());

    transport.client().set_reachable(false);
    bob.send(&SendRequest::new(user("alice"), "during")).unwrap();
    let err = sync.poll_once().unwrap_err();
    assert!(err.is_retryable());
    assert!(!sync.is_connected());
    assert_eq!(ids(&sync.messages()), vec![1]);
    assert_eq!(sync.state(), SyncState::Polling);

    transport.client().set_reachable(true);
    sync.poll_once().unwrap();
    assert!(sync.is_connected());
    assert_eq!(ids(&sync.messages()), vec![1, 2]);
}

#[test]
fn bad_token_is_not_retryable() {
    let server = server();
    let handle = Arc::clone(&server);
    let client = LoopbackClient::new(move |request: HttpRequest| handle.handle(request));
    let transport = Arc::new(HttpTransport::new("http://loopback", "deadbeef", client));

    let sync = ConversationSync::new(
        SyncConfig::new(user("alice"), "http://loopback"),
        user("bob"),
        Arc::clone(&transport),
    )
    .unwrap();
    let err = sync.open().unwrap_err();
    assert!(matches!(err, SyncError::AuthenticationFailed(_)));
    assert!(!err.is_retryable());
    assert!(sync.snapshot().auth_failed);

    // A fresh token lets the next poll through and clears the flag.
    transport.set_token(server.issue_token(&user("alice")).unwrap());
    sync.poll_once().unwrap();
    assert!(!sync.snapshot().auth_failed);
}

#[test]
fn storage_outage_surfaces_as_error() {
    let store = Arc::new(InMemoryMessageStore::new());
    let server = Arc::new(ChatServer::new(
        ServerConfig::default().with_auth(SECRET.to_vec()),
        store.clone(),
        Arc::new(InMemorySummaryStore::new()),
        Arc::new(InMemoryDirectory::with_users([user("alice"), user("bob")])),
    ));
    let sync = ConversationSync::new(
        SyncConfig::new(user("alice"), "http://loopback"),
        user("bob"),
        transport_for(&server, "alice"),
    )
    .unwrap();
    sync.open().unwrap();
    sync.send("persisted").unwrap();

    store.close();
    let err = sync.poll_once().unwrap_err();
    assert!(matches!(err, SyncError::StorageUnavailable(_)));
    assert_eq!(sync.messages().len(), 1);
}
