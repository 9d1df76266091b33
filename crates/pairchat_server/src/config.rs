//! Server configuration.

use std::time::Duration;

/// Configuration for the chat server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Page size used when a request does not specify one.
    pub default_page_limit: u32,
    /// Upper bound applied to requested page sizes.
    pub max_page_limit: u32,
    /// Maximum message length in characters, after trimming.
    pub max_content_len: usize,
    /// Secret key for bearer token validation.
    pub auth_secret: Option<Vec<u8>>,
    /// How long an issued token stays valid.
    pub token_expiry: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            default_page_limit: pairchat_protocol::DEFAULT_PAGE_LIMIT,
            max_page_limit: 200,
            max_content_len: 4096,
            auth_secret: None,
            token_expiry: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
        }
    }

    /// Sets the default page size.
    pub fn with_default_page_limit(mut self, limit: u32) -> Self {
        self.default_page_limit = limit;
        self
    }

    /// Sets the maximum page size.
    pub fn with_max_page_limit(mut self, limit: u32) -> Self {
        self.max_page_limit = limit;
        self
    }

    /// Sets the maximum message length.
    pub fn with_max_content_len(mut self, len: usize) -> Self {
        self.max_content_len = len;
        self
    }

    /// Sets the token signing secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.auth_secret = Some(secret);
        self
    }

    /// Sets the token lifetime.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    /// Resolves a requested page size against the default and maximum.
    ///
    /// The result is always in `1..=max_page_limit`.
    pub fn page_limit(&self, requested: Option<u32>) -> usize {
        let max = self.max_page_limit.max(1);
        requested
            .unwrap_or(self.default_page_limit)
            .clamp(1, max) as usize
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
