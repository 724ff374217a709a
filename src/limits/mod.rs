//! Admission control for Turnstile
//!
//! Fixed-window rate limiting for unauthenticated and high-volume paths,
//! and the once-per-UTC-day generation quota. These are the only admission
//! control in the system: over-limit requests are rejected immediately,
//! never queued.

pub mod quota;
pub mod rate;

pub use quota::DailyQuotaGate;
pub use rate::RateLimiter;
