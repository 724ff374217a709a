//! Wallet signature verification
//!
//! Validates a detached Ed25519 signature over the UTF-8 bytes of a
//! challenge message. Identities and signatures travel as base58 text and
//! must decode to exactly 32 and 64 bytes respectively.
//!
//! Verification is pure and side-effect free; it is safe to call
//! concurrently and repeatedly. Replay protection is the nonce authority's
//! job, not this module's.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::types::TurnstileError;

/// Ed25519 public key length
pub const PUBKEY_LEN: usize = 32;

/// Ed25519 signature length
pub const SIGNATURE_LEN: usize = 64;

/// Signed message length bounds in UTF-8 bytes.
///
/// These cap the replay/DoS surface of oversized signed payloads; they are
/// not cryptographic.
pub const MIN_MESSAGE_LEN: usize = 5;
pub const MAX_MESSAGE_LEN: usize = 400;

/// Signature validation failures
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("identity must be a base58 32-byte public key")]
    InvalidIdentity,

    #[error("signature must be a base58 64-byte value")]
    InvalidSignatureEncoding,

    #[error("message length must be between {MIN_MESSAGE_LEN} and {MAX_MESSAGE_LEN} bytes")]
    InvalidMessage,

    #[error("signature does not match message")]
    Mismatch,
}

impl From<SignatureError> for TurnstileError {
    fn from(err: SignatureError) -> Self {
        match err {
            // Same response body as a failed nonce consumption
            SignatureError::Mismatch => TurnstileError::Unauthorized("unauthorized".to_string()),
            other => TurnstileError::BadRequest(other.to_string()),
        }
    }
}

/// Decode a base58 identity into its 32-byte public key form.
pub fn decode_identity(identity: &str) -> Result<[u8; PUBKEY_LEN], SignatureError> {
    let bytes = bs58::decode(identity)
        .into_vec()
        .map_err(|_| SignatureError::InvalidIdentity)?;
    bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidIdentity)
}

/// Verify a detached wallet signature over `message`.
pub fn verify(identity: &str, message: &str, signature: &str) -> Result<(), SignatureError> {
    let key_bytes = decode_identity(identity)?;

    let sig_bytes: [u8; SIGNATURE_LEN] = bs58::decode(signature)
        .into_vec()
        .map_err(|_| SignatureError::InvalidSignatureEncoding)?
        .try_into()
        .map_err(|_| SignatureError::InvalidSignatureEncoding)?;

    if message.len() < MIN_MESSAGE_LEN || message.len() > MAX_MESSAGE_LEN {
        return Err(SignatureError::InvalidMessage);
    }

    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| SignatureError::InvalidIdentity)?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(message.as_bytes(), &signature)
        .map_err(|_| SignatureError::Mismatch)
}
