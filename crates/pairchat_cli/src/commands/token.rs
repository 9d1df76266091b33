//! Token command implementation.

use pairchat_protocol::UserId;
use pairchat_server::{AuthConfig, TokenValidator};
use serde::Serialize;
use std::time::Duration;

/// Result of minting or checking a token.
#[derive(Debug, Serialize)]
pub struct TokenResult {
    /// The token.
    pub token: String,
    /// User bound to the token.
    pub user: String,
    /// Lifetime accepted by the validator, in seconds.
    pub expires_in_secs: u64,
}

/// Runs the token command.
///
/// With `verify` set, checks that token against the secret instead of minting
/// a new one for `user`.
pub fn run(
    user: Option<&str>,
    secret: &str,
    expiry_hours: u64,
    verify: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if secret.is_empty() {
        return Err("secret must not be empty".into());
    }

    let expiry = Duration::from_secs(expiry_hours * 60 * 60);
    let validator = TokenValidator::new(AuthConfig::new(secret.as_bytes().to_vec()).with_expiry(expiry));

    let result = match verify {
        Some(token) => {
            let user = validator.validate_token(token)?;
            TokenResult {
                token: token.trim().to_string(),
                user: user.as_str().to_string(),
                expires_in_secs: expiry.as_secs(),
            }
        }
        None => {
            let user = UserId::new(user.ok_or("--user is required to mint a token")?)?;
            TokenResult {
                token: validator.create_token(&user)?,
                user: user.as_str().to_string(),
                expires_in_secs: expiry.as_secs(),
            }
        }
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ if verify.is_some() => println!("valid token for {}", result.user),
        _ => println!("{}", result.token),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_verify() {
        let validator = TokenValidator::new(AuthConfig::new(b"cli-secret".to_vec()));
        let token = validator
            .create_token(&UserId::new("alice").unwrap())
            .unwrap();

        assert!(run(None, "cli-secret", 24, Some(&token), "text").is_ok());
        assert!(run(None, "other-secret", 24, Some(&token), "text").is_err());
    }

    #[test]
    fn minting_needs_a_user() {
        assert!(run(None, "cli-secret", 24, None, "text").is_err());
        assert!(run(Some("alice"), "cli-secret", 24, None, "json").is_ok());
        assert!(run(Some("alice"), "", 24, None, "text").is_err());
    }
}
