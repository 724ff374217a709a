//! Single-use challenge nonces
//!
//! Issues and consumes one-time, TTL-bound tokens scoped to
//! (action, identity). Consumption is an atomic delete-and-report-count at
//! the store: among N racing callers with the same token, exactly one
//! succeeds. Scoping means a vote challenge cannot authorize a generation,
//! and one wallet's challenges cannot be consumed by another.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::auth::signature;
use crate::services::TokenSource;
use crate::store::AtomicKv;
use crate::types::{Result, TurnstileError};

/// Nonce TTL clamp bounds in seconds
pub const MIN_TTL_SECONDS: u64 = 60;
pub const MAX_TTL_SECONDS: u64 = 3600;

/// Token length bounds checked before any store call
pub const MIN_TOKEN_LEN: usize = 8;
pub const MAX_TOKEN_LEN: usize = 120;

/// Privileged actions a challenge can authorize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Generate,
    Vote,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Generate => "generate",
            Action::Vote => "vote",
        }
    }

    pub fn parse(s: &str) -> Option<Action> {
        match s {
            "generate" => Some(Action::Generate),
            "vote" => Some(Action::Vote),
            _ => None,
        }
    }
}

/// Nonce validation and consumption failures
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NonceError {
    #[error("unknown action")]
    InvalidAction,

    #[error("identity must be a base58 32-byte public key")]
    InvalidIdentity,

    #[error("token length must be between {MIN_TOKEN_LEN} and {MAX_TOKEN_LEN} characters")]
    InvalidToken,

    #[error("nonce not found or expired")]
    NotFoundOrExpired,
}

impl From<NonceError> for TurnstileError {
    fn from(err: NonceError) -> Self {
        match err {
            // Same body as a signature mismatch; see SignatureError::Mismatch.
            NonceError::NotFoundOrExpired => {
                TurnstileError::Unauthorized("unauthorized".to_string())
            }
            other => TurnstileError::BadRequest(other.to_string()),
        }
    }
}

/// A freshly issued challenge
#[derive(Debug, Serialize)]
pub struct IssuedNonce {
    pub token: String,
    pub ttl_seconds: u64,
}

/// Issues and consumes single-use challenge tokens
pub struct NonceAuthority {
    store: Arc<dyn AtomicKv>,
    tokens: Arc<dyn TokenSource>,
    ttl_seconds: u64,
}

impl NonceAuthority {
    /// Create an authority with the configured TTL clamped to
    /// [`MIN_TTL_SECONDS`]..=[`MAX_TTL_SECONDS`].
    pub fn new(store: Arc<dyn AtomicKv>, tokens: Arc<dyn TokenSource>, ttl_seconds: u64) -> Self {
        Self {
            store,
            tokens,
            ttl_seconds: ttl_seconds.clamp(MIN_TTL_SECONDS, MAX_TTL_SECONDS),
        }
    }

    /// Effective TTL after clamping
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    fn key(action: Action, identity: &str, token: &str) -> String {
        format!("nonce:{}:{}:{}", action.as_str(), identity, token)
    }

    /// Issue a fresh challenge for (action, identity).
    pub async fn issue(&self, action: Action, identity: &str) -> Result<IssuedNonce> {
        signature::decode_identity(identity).map_err(|_| NonceError::InvalidIdentity)?;

        let token = self.tokens.mint();
        let created = self
            .store
            .put_if_absent(
                &Self::key(action, identity, &token),
                Duration::from_secs(self.ttl_seconds),
            )
            .await?;
        // The token is fresh randomness, so a collision means the token
        // source is broken, not that the caller raced anyone.
        if !created {
            return Err(TurnstileError::Internal(
                "minted nonce token already existed".to_string(),
            ));
        }

        debug!(action = action.as_str(), identity, "issued challenge nonce");
        Ok(IssuedNonce {
            token,
            ttl_seconds: self.ttl_seconds,
        })
    }

    /// Consume a challenge exactly once. Fails for unknown, expired, or
    /// already-consumed tokens.
    pub async fn consume(&self, action: Action, identity: &str, token: &str) -> Result<()> {
        if token.len() < MIN_TOKEN_LEN || token.len() > MAX_TOKEN_LEN {
            return Err(NonceError::InvalidToken.into());
        }
        signature::decode_identity(identity).map_err(|_| NonceError::InvalidIdentity)?;

        let deleted = self
            .store
            .delete_and_count(&Self::key(action, identity, token))
            .await?;
        if deleted == 1 {
            debug!(action = action.as_str(), identity, "consumed challenge nonce");
            Ok(())
        } else {
            Err(NonceError::NotFoundOrExpired.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SystemTokenSource;
    use crate::store::MemoryKv;

    fn authority(ttl: u64) -> NonceAuthority {
        NonceAuthority::new(
            Arc::new(MemoryKv::new()),
            Arc::new(SystemTokenSource),
            ttl,
        )
    }

    fn identity(byte: u8) -> String {
        bs58::encode([byte; 32]).into_string()
    }

    #[test]
    fn ttl_is_clamped() {
        assert_eq!(authority(5).ttl_seconds(), MIN_TTL_SECONDS);
        assert_eq!(authority(300).ttl_seconds(), 300);
        assert_eq!(authority(86_400).ttl_seconds(), MAX_TTL_SECONDS);
    }

    #[test]
    fn action_parsing() {
        assert_eq!(Action::parse("vote"), Some(Action::Vote));
        assert_eq!(Action::parse("generate"), Some(Action::Generate));
        assert_eq!(Action::parse("admin"), None);
        assert_eq!(Action::parse("VOTE"), None);
    }

    #[tokio::test]
    async fn issue_then_consume_exactly_once() {
        let authority = authority(300);
        let wallet = identity(7);

        let issued = authority.issue(Action::Vote, &wallet).await.unwrap();
        assert_eq!(issued.ttl_seconds, 300);

        authority
            .consume(Action::Vote, &wallet, &issued.token)
            .await
            .unwrap();

        let replay = authority.consume(Action::Vote, &wallet, &issued.token).await;
        assert!(matches!(replay, Err(TurnstileError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn racing_consumers_produce_one_winner() {
        let authority = Arc::new(authority(300));
        let wallet = identity(7);
        let issued = authority.issue(Action::Vote, &wallet).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..12 {
            let authority = Arc::clone(&authority);
            let wallet = wallet.clone();
            let token = issued.token.clone();
            handles.push(tokio::spawn(async move {
                authority.consume(Action::Vote, &wallet, &token).await
            }));
        }

        let mut wins = 0;
        let mut losses = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => wins += 1,
                Err(TurnstileError::Unauthorized(_)) => losses += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(losses, 11);
    }

    #[tokio::test]
    async fn scope_is_action_and_identity() {
        let authority = authority(300);
        let wallet = identity(7);
        let other_wallet = identity(9);

        let issued = authority.issue(Action::Vote, &wallet).await.unwrap();

        // Wrong action
        let cross = authority
            .consume(Action::Generate, &wallet, &issued.token)
            .await;
        assert!(matches!(cross, Err(TurnstileError::Unauthorized(_))));

        // Wrong identity
        let stolen = authority
            .consume(Action::Vote, &other_wallet, &issued.token)
            .await;
        assert!(matches!(stolen, Err(TurnstileError::Unauthorized(_))));

        // Correct scope still works after the failed attempts
        authority
            .consume(Action::Vote, &wallet, &issued.token)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn malformed_input_is_rejected_before_the_store() {
        let authority = authority(300);
        let wallet = identity(7);

        let short = authority.consume(Action::Vote, &wallet, "short").await;
        assert!(matches!(short, Err(TurnstileError::BadRequest(_))));

        let long_token = "t".repeat(MAX_TOKEN_LEN + 1);
        let long = authority.consume(Action::Vote, &wallet, &long_token).await;
        assert!(matches!(long, Err(TurnstileError::BadRequest(_))));

        let bad_identity = authority.issue(Action::Vote, "not-a-key").await;
        assert!(matches!(bad_identity, Err(TurnstileError::BadRequest(_))));
    }
}
