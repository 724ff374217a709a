//! Authentication for Turnstile
//!
//! Provides:
//! - Ed25519 wallet signature verification
//! - Single-use challenge nonces scoped to (action, identity)

pub mod nonce;
pub mod signature;

pub use nonce::{Action, IssuedNonce, NonceAuthority};
pub use signature::{verify, SignatureError};
