//! Random token minting
//!
//! Challenge nonces and card identifiers come from one swappable source so
//! tests can substitute a deterministic one.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Bytes of entropy per minted token
const TOKEN_BYTES: usize = 24;

/// Source of opaque random tokens
pub trait TokenSource: Send + Sync {
    /// Mint a fresh URL-safe token
    fn mint(&self) -> String;
}

/// OS-entropy token source used outside of tests
pub struct SystemTokenSource;

impl TokenSource for SystemTokenSource {
    fn mint(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_url_safe_and_distinct() {
        let source = SystemTokenSource;
        let a = source.mint();
        let b = source.mint();

        assert_ne!(a, b);
        // 24 bytes -> 32 unpadded base64 chars
        assert_eq!(a.len(), 32);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
