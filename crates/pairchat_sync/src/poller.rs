//! Background polling task.
//!
//! One tokio task per open conversation. Each tick runs
//! [`ConversationSync::poll_once`] on the blocking pool, publishes a
//! snapshot, then sleeps for the poll interval stretched by the backoff.

use crate::error::SyncError;
use crate::session::{ConversationSnapshot, ConversationSync};
use crate::transport::ChatTransport;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawns pollers.
pub struct Poller;

impl Poller {
    /// Starts polling `sync` on the current tokio runtime.
    ///
    /// The conversation should already be opened with
    /// [`ConversationSync::begin`]; the first tick performs the initial load.
    pub fn spawn<T>(sync: Arc<ConversationSync<T>>) -> PollerHandle
    where
        T: ChatTransport + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (updates_tx, updates_rx) = watch::channel(sync.snapshot());

        let task = tokio::spawn(async move {
            let base = sync.config().poll_interval;
            let timeout = sync.config().timeout;
            let backoff = sync.config().backoff.clone();
            let mut failures: u32 = 0;
            info!(peer = %sync.peer(), interval_ms = base.as_millis() as u64, "poller started");

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let worker = Arc::clone(&sync);
                let poll = tokio::task::spawn_blocking(move || worker.poll_once());
                match tokio::time::timeout(timeout, poll).await {
                    Ok(Ok(Ok(_))) => failures = 0,
                    Ok(Ok(Err(SyncError::Closed))) => break,
                    Ok(Ok(Err(_))) => failures = failures.saturating_add(1),
                    Ok(Err(e)) => {
                        warn!(error = %e, "poll task panicked");
                        failures = failures.saturating_add(1);
                    }
                    Err(_) => {
                        // The fetch keeps running on the blocking pool; a late
                        // result still passes the generation check.
                        sync.record_timeout();
                        failures = failures.saturating_add(1);
                    }
                }
                updates_tx.send_replace(sync.snapshot());

                let delay = backoff.delay_after(base, failures);
                if failures > 0 {
                    debug!(failures, delay_ms = delay.as_millis() as u64, "backing off");
                }

                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            updates_tx.send_replace(sync.snapshot());
            info!(peer = %sync.peer(), "poller stopped");
        });

        PollerHandle {
            shutdown: shutdown_tx,
            updates: updates_rx,
            task,
        }
    }
}

/// Controls a running poller.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    updates: watch::Receiver<ConversationSnapshot>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Returns a receiver that sees a fresh snapshot after every tick.
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.updates.clone()
    }

    /// Asks the task to stop. A fetch already in flight finishes on the
    /// blocking pool, but the task exits without scheduling another tick.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Returns true once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!(error = %e, "poller task failed");
        }
    }

    /// Waits for the task to exit on its own (e.g. after the conversation closed).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "poller task failed");
        }
    }
}
