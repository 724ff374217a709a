//! Turnstile - wallet-gated meme card gateway
//!
//! Users sign challenge messages with an Ed25519 wallet key, spend
//! rate-limited image generations, and vote on the resulting cards. The
//! interesting part is the admission path: single-use signature-backed
//! authorization, atomic rate limiting, and idempotent vote aggregation,
//! all of which must hold up under concurrent, adversarial, and retried
//! requests. Everything else is request/response glue around managed
//! services.
//!
//! ## Services
//!
//! - **Auth**: wallet signature verification + single-use challenge nonces
//! - **Limits**: fixed-window rate limiting and per-day generation quota
//! - **Ledger**: vote rows, delta-maintained card aggregates, trend ranking
//! - **Store**: atomic key-value capability over MongoDB or memory

pub mod auth;
pub mod config;
pub mod ledger;
pub mod limits;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, TurnstileError};
