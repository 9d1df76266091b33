//! Bearer token authentication.
//!
//! Tokens are HMAC-SHA256 signed and bind a [`UserId`] to an issue time.
//! Issuing tokens to end users (login) happens elsewhere; this module only
//! mints and verifies them.
//!
//! ## Token Format
//!
//! Tokens are composed of:
//! - 2 bytes: user id length (big-endian)
//! - N bytes: user id (UTF-8)
//! - 8 bytes: issue timestamp (Unix millis, big-endian)
//! - 32 bytes: HMAC-SHA256 signature over everything before it
//!
//! The whole token is hex-encoded for the `Authorization` header.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use pairchat_protocol::{Timestamp, UserId};
use pairchat_store::{Clock, SystemClock};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_LEN: usize = 32;
const TIMESTAMP_LEN: usize = 8;
const BEARER_PREFIX: &str = "Bearer ";

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60), // 24 hours
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Mints and validates bearer tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
    clock: Arc<dyn Clock>,
}

impl TokenValidator {
    /// Creates a validator using the system clock.
    pub fn new(config: AuthConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a validator with a custom clock.
    pub fn with_clock(config: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Creates a token for `user`, issued now.
    pub fn create_token(&self, user: &UserId) -> ServerResult<String> {
        self.create_token_at(user, self.clock.now())
    }

    /// Creates a token for `user` with an explicit issue time.
    pub fn create_token_at(&self, user: &UserId, issued_at: Timestamp) -> ServerResult<String> {
        let id = user.as_str().as_bytes();
        let id_len = u16::try_from(id.len())
            .map_err(|_| ServerError::InvalidInput("user id too long for a token".into()))?;

        let mut data = Vec::with_capacity(2 + id.len() + TIMESTAMP_LEN + SIGNATURE_LEN);
        data.extend_from_slice(&id_len.to_be_bytes());
        data.extend_from_slice(id);
        data.extend_from_slice(&issued_at.as_millis().to_be_bytes());

        let signature = self.mac(&data)?.finalize().into_bytes();
        data.extend_from_slice(&signature);
        Ok(hex::encode(data))
    }

    /// Validates a token and returns the user it was issued to.
    pub fn validate_token(&self, token: &str) -> ServerResult<UserId> {
        let raw = hex::decode(token.trim())
            .map_err(|_| ServerError::Unauthenticated("malformed token".into()))?;

        if raw.len() < 2 + TIMESTAMP_LEN + SIGNATURE_LEN {
            return Err(ServerError::Unauthenticated("invalid token length".into()));
        }

        let id_len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
        let signed_len = 2 + id_len + TIMESTAMP_LEN;
        if raw.len() != signed_len + SIGNATURE_LEN {
            return Err(ServerError::Unauthenticated("invalid token length".into()));
        }

        let (signed, signature) = raw.split_at(signed_len);
        self.mac(signed)?
            .verify_slice(signature)
            .map_err(|_| ServerError::Unauthenticated("invalid signature".into()))?;

        let mut timestamp_bytes = [0u8; TIMESTAMP_LEN];
        timestamp_bytes.copy_from_slice(&signed[2 + id_len..]);
        let issued_at = u64::from_be_bytes(timestamp_bytes);

        let now = self.clock.now().as_millis();
        let expiry_millis = self.config.token_expiry.as_millis() as u64;
        if now > issued_at.saturating_add(expiry_millis) {
            return Err(ServerError::Unauthenticated("token expired".into()));
        }

        let id = std::str::from_utf8(&signed[2..2 + id_len])
            .map_err(|_| ServerError::Unauthenticated("malformed user id".into()))?;
        UserId::new(id).map_err(|_| ServerError::Unauthenticated("malformed user id".into()))
    }

    /// Resolves an `Authorization` header value to a user.
    ///
    /// A missing header, a non-bearer scheme, or an invalid token all fail
    /// with [`ServerError::Unauthenticated`].
    pub fn authenticate(&self, authorization: Option<&str>) -> ServerResult<UserId> {
        let header = authorization
            .ok_or_else(|| ServerError::Unauthenticated("no token provided".into()))?;
        let token = header
            .strip_prefix(BEARER_PREFIX)
            .ok_or_else(|| ServerError::Unauthenticated("expected a bearer token".into()))?;

        let user = self.validate_token(token)?;
        debug!(user = %user, "token verified");
        Ok(user)
    }

    fn mac(&self, data: &[u8]) -> ServerResult<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("hmac key rejected: {}", e)))?;
        mac.update(data);
        Ok(mac)
    }
}
