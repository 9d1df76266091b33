//! Simulate command implementation.
//!
//! Runs a server and two polling clients in one process and reports how the
//! conversation converged.

use pairchat_protocol::{HttpRequest, HttpResponse, UserId};
use pairchat_server::{ChatServer, ServerConfig};
use pairchat_store::MessageStore;
use pairchat_sync::{
    BackoffConfig, ChatClient, ConversationSnapshot, HttpTransport, LoopbackClient, SyncConfig,
    SyncStats,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

type Endpoint = Box<dyn Fn(HttpRequest) -> HttpResponse + Send + Sync>;
type Transport = HttpTransport<LoopbackClient<Endpoint>>;

const SIMULATION_SECRET: &[u8] = b"pairchat-simulation";
const LOOPBACK_URL: &str = "http://loopback";

/// Simulation settings.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// First participant.
    pub alice: String,
    /// Second participant.
    pub bob: String,
    /// Number of messages to send, alternating senders.
    pub messages: usize,
    /// Poll interval of both clients.
    pub poll_interval: Duration,
    /// Pause between sends.
    pub send_gap: Duration,
    /// How long the first participant loses the network halfway through.
    pub outage: Option<Duration>,
    /// Give up if the clients have not converged after this long.
    pub deadline: Duration,
}

/// One participant's view at the end of the run.
#[derive(Debug, Serialize)]
pub struct ParticipantReport {
    /// Participant id.
    pub user: String,
    /// Messages in the local log.
    pub log_len: usize,
    /// Final cursor.
    pub cursor: Option<u64>,
    /// Successful polls.
    pub polls: u64,
    /// Failed polls.
    pub poll_failures: u64,
    /// Messages sent by this participant.
    pub sent: u64,
}

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Messages sent in total.
    pub messages_sent: usize,
    /// True if both logs ended identical to the server's.
    pub converged: bool,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
    /// Per-participant results.
    pub participants: Vec<ParticipantReport>,
}

/// Runs the simulate command.
pub fn run(options: SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(simulate(options))?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }

    if report.converged {
        Ok(())
    } else {
        Err("clients did not converge before the deadline".into())
    }
}

async fn simulate(options: SimulateOptions) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    let alice = UserId::new(options.alice.clone())?;
    let bob = UserId::new(options.bob.clone())?;
    if alice == bob {
        return Err("participants must differ".into());
    }

    let server = Arc::new(ChatServer::in_memory(
        ServerConfig::default().with_auth(SIMULATION_SECRET.to_vec()),
        [alice.clone(), bob.clone()],
    ));
    let config = |user: &UserId| {
        SyncConfig::new(user.clone(), LOOPBACK_URL)
            .with_poll_interval(options.poll_interval)
            .with_backoff(BackoffConfig::default().without_jitter())
    };
    let (alice_config, bob_config) = (config(&alice), config(&bob));
    let alice_transport = transport(&server, &alice_config)?;
    let bob_transport = transport(&server, &bob_config)?;

    let mut alice_client = ChatClient::new(alice_config, Arc::clone(&alice_transport));
    let mut bob_client = ChatClient::new(bob_config, Arc::clone(&bob_transport));
    alice_client.open(bob.clone()).await?;
    bob_client.open(alice.clone()).await?;

    let started = Instant::now();
    let mut last_id = None;
    for i in 0..options.messages {
        if i == options.messages / 2 {
            if let Some(outage) = options.outage {
                info!(user = %alice, outage_ms = outage.as_millis() as u64, "network down");
                alice_transport.client().set_reachable(false);
                tokio::time::sleep(outage).await;
                alice_transport.client().set_reachable(true);
                info!(user = %alice, "network back");
            }
        }

        let sender = if i % 2 == 0 { &alice_client } else { &bob_client };
        let message = sender.send(format!("message {}", i + 1)).await?;
        debug!(id = %message.id, from = %message.sender_id, "sent");
        last_id = Some(message.id);
        tokio::time::sleep(options.send_gap).await;
    }

    let views = [
        alice_client.subscribe().ok_or("conversation not open")?,
        bob_client.subscribe().ok_or("conversation not open")?,
    ];
    let mut converged = true;
    for view in views {
        converged &= wait_for_cursor(view, last_id.map(|id| id.get()), options.deadline).await;
    }

    // The store, not the paged history endpoint, is the full record.
    let expected = server
        .handler()
        .context()
        .messages
        .query_after(&alice, &bob, None, usize::MAX)?;
    let mut participants = Vec::with_capacity(2);
    for client in [&alice_client, &bob_client] {
        let sync = client.active().ok_or("conversation not open")?;
        converged &= sync.messages().iter().map(|m| m.id).eq(expected.iter().map(|m| m.id));
        participants.push(participant_report(
            client.user_id(),
            &sync.snapshot(),
            &sync.stats(),
        ));
    }

    alice_client.close().await;
    bob_client.close().await;

    Ok(SimulationReport {
        messages_sent: options.messages,
        converged,
        elapsed_ms: started.elapsed().as_millis() as u64,
        participants,
    })
}

fn transport(
    server: &Arc<ChatServer>,
    config: &SyncConfig,
) -> Result<Arc<Transport>, Box<dyn std::error::Error>> {
    let token = server.issue_token(&config.user_id)?;
    let handle = Arc::clone(server);
    let endpoint: Endpoint = Box::new(move |request| handle.handle(request));
    Ok(Arc::new(HttpTransport::from_config(
        config,
        token,
        LoopbackClient::new(endpoint),
    )))
}

async fn wait_for_cursor(
    mut view: watch::Receiver<ConversationSnapshot>,
    target: Option<u64>,
    deadline: Duration,
) -> bool {
    let reached = |s: &ConversationSnapshot| s.cursor.map(|c| c.get()) >= target;
    let wait = async {
        loop {
            if reached(&view.borrow()) {
                return true;
            }
            if view.changed().await.is_err() {
                return reached(&view.borrow());
            }
        }
    };
    tokio::time::timeout(deadline, wait).await.unwrap_or(false)
}

fn participant_report(
    user: &UserId,
    snapshot: &ConversationSnapshot,
    stats: &SyncStats,
) -> ParticipantReport {
    ParticipantReport {
        user: user.as_str().to_string(),
        log_len: snapshot.messages.len(),
        cursor: snapshot.cursor.map(|c| c.get()),
        polls: stats.polls_completed,
        poll_failures: stats.poll_failures,
        sent: stats.messages_sent,
    }
}

fn print_text(report: &SimulationReport) {
    println!("Pairchat Simulation");
    println!("===================");
    println!();
    println!("Messages sent: {}", report.messages_sent);
    println!("Elapsed:       {} ms", report.elapsed_ms);
    println!("Converged:     {}", if report.converged { "yes" } else { "no" });
    println!();
    for p in &report.participants {
        println!("{}:", p.user);
        println!("  Log length:    {}", p.log_len);
        println!(
            "  Cursor:        {}",
            p.cursor.map_or_else(|| "none".to_string(), |c| c.to_string())
        );
        println!("  Polls:         {}", p.polls);
        println!("  Poll failures: {}", p.poll_failures);
        println!("  Sent:          {}", p.sent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(messages: usize) -> SimulateOptions {
        SimulateOptions {
            alice: "alice".into(),
            bob: "bob".into(),
            messages,
            poll_interval: Duration::from_millis(10),
            send_gap: Duration::from_millis(2),
            outage: None,
            deadline: Duration::from_secs(10),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn clients_converge() {
        let report = simulate(options(6)).await.unwrap();
        assert!(report.converged);
        assert_eq!(report.participants.len(), 2);
        assert!(report.participants.iter().all(|p| p.log_len == 6));
        assert!(report.participants.iter().all(|p| p.cursor == Some(6)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn converges_after_outage() {
        let mut opts = options(4);
        opts.outage = Some(Duration::from_millis(60));
        let report = simulate(opts).await.unwrap();

        assert!(report.converged);
        assert!(report.participants[0].poll_failures > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn converges_beyond_one_history_page() {
        let mut opts = options(210);
        opts.send_gap = Duration::ZERO;
        let report = simulate(opts).await.unwrap();

        assert!(report.converged);
        assert!(report.participants.iter().all(|p| p.log_len == 210));
        assert!(report.participants.iter().all(|p| p.cursor == Some(210)));
    }

    #[tokio::test]
    async fn rejects_identical_participants() {
        let mut opts = options(1);
        opts.bob = "alice".into();
        assert!(simulate(opts).await.is_err());
    }
}
