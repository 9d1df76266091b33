//! Configuration for conversation sync.

use pairchat_protocol::UserId;
use rand::Rng;
use std::time::Duration;

/// Configuration for a chat client.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// The local participant.
    pub user_id: UserId,
    /// Server base URL, used by [`crate::HttpTransport::from_config`].
    pub server_url: String,
    /// Delay between polls while the server is reachable.
    pub poll_interval: Duration,
    /// Page size requested from the delta endpoint.
    pub page_limit: u32,
    /// Upper bound on pages drained back to back in one poll.
    pub max_drain_pages: u32,
    /// Backoff applied after failed polls.
    pub backoff: BackoffConfig,
    /// Upper bound on one poll or client call; exceeding it counts as a
    /// failed fetch.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(user_id: UserId, server_url: impl Into<String>) -> Self {
        Self {
            user_id,
            server_url: server_url.into(),
            poll_interval: Duration::from_secs(2),
            page_limit: pairchat_protocol::DEFAULT_PAGE_LIMIT,
            max_drain_pages: 20,
            backoff: BackoffConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the page size.
    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit;
        self
    }

    /// Sets how many pages one poll may drain.
    pub fn with_max_drain_pages(mut self, pages: u32) -> Self {
        self.max_drain_pages = pages;
        self
    }

    /// Sets the backoff configuration.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Delay policy for consecutive poll failures.
///
/// Polling never gives up; the backoff only stretches the wait between
/// ticks and resets after the first successful poll.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Multiplier applied per consecutive failure.
    pub multiplier: f64,
    /// Maximum delay between polls.
    pub max_delay: Duration,
    /// Whether to add up to 25% jitter.
    pub add_jitter: bool,
}

impl BackoffConfig {
    /// Creates an exponential backoff.
    pub fn exponential(multiplier: f64, max_delay: Duration) -> Self {
        Self {
            multiplier,
            max_delay,
            add_jitter: true,
        }
    }

    /// Keeps polling at the base interval regardless of failures.
    pub fn fixed() -> Self {
        Self {
            multiplier: 1.0,
            max_delay: Duration::MAX,
            add_jitter: false,
        }
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the wait before the next poll after `failures` consecutive failures.
    pub fn delay_after(&self, base: Duration, failures: u32) -> Duration {
        if failures == 0 {
            return base;
        }

        let ceiling = self.max_delay.max(base);
        let scaled = base.as_secs_f64() * self.multiplier.powi(failures.min(32) as i32);
        let mut delay_secs = scaled.min(ceiling.as_secs_f64());

        if self.add_jitter {
            delay_secs += delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
        }

        // Beyond what a Duration holds the ceiling is the answer anyway.
        Duration::try_from_secs_f64(delay_secs).unwrap_or(ceiling)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::exponential(2.0, Duration::from_secs(30))
    }
}
