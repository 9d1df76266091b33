//! Stress tests for pairchat.
//!
//! These runs push concurrent sends and polls through the full server path
//! and check that ids stay unique and ordered under contention.

use crate::fixtures::{user, TestServer};
use pairchat_protocol::{DeltaRequest, MessageId, SendRequest};
use pairchat_sync::ChatTransport;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per run.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Message body size in bytes.
    pub content_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            content_size: 64,
        }
    }
}

/// Sends from both sides on `config.threads` threads at once.
///
/// Even threads send as Alice, odd threads as Bob.
pub fn stress_concurrent_sends(server: &TestServer, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let per_thread = config.operations / config.threads.max(1);
    let content = "x".repeat(config.content_size.max(1));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let (from, to) = if t % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
            let transport = server.transport(from);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let request = SendRequest::new(user(to), content.clone());

            thread::spawn(move || {
                for _ in 0..per_thread {
                    match transport.send(&request) {
                        Ok(_) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Polls incrementally from many threads while one thread keeps sending.
///
/// Every poller walks its own cursor; a poll counts as failed if it returns
/// an id at or below the cursor it asked with.
pub fn stress_polls_during_sends(server: &TestServer, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let pollers = config.threads.max(2) - 1;
    let per_thread = config.operations / (pollers + 1);

    let start = Instant::now();

    let sender = {
        let transport = server.transport("bob");
        let request = SendRequest::new(user("alice"), "tick");
        let successful = Arc::clone(&successful);
        let failed = Arc::clone(&failed);
        thread::spawn(move || {
            for _ in 0..per_thread {
                match transport.send(&request) {
                    Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                    Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                };
            }
        })
    };

    let handles: Vec<_> = (0..pollers)
        .map(|_| {
            let transport = server.transport("alice");
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                let mut cursor: Option<MessageId> = None;
                for _ in 0..per_thread {
                    let request = DeltaRequest::new(user("alice"), user("bob"), cursor);
                    match transport.fetch_delta(&request) {
                        Ok(page) => {
                            let ordered = page.messages.windows(2).all(|w| w[0].id < w[1].id);
                            let fresh = match (cursor, page.messages.first()) {
                                (Some(c), Some(first)) => first.id > c,
                                _ => true,
                            };
                            if ordered && fresh {
                                if let Some(last) = page.last_id() {
                                    cursor = Some(last);
                                }
                                successful.fetch_add(1, Ordering::Relaxed);
                            } else {
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    sender.join().expect("Thread panicked");
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
