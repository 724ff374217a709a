//! Storage capability interfaces
//!
//! Request handlers are stateless and may run as independent processes, so
//! every cross-request invariant (exactly-once nonce consumption, daily
//! quota grants, per-window hit counts) is enforced by atomic primitives at
//! the store. Components depend only on the capability trait here, never on
//! a concrete backend.

pub mod memory;
pub mod mongo;

pub use memory::MemoryKv;
pub use mongo::{MongoClient, MongoKv};

use std::time::Duration;

use crate::types::Result;

/// Atomic key-value capability backing the nonce authority, rate limiter,
/// and daily quota gate.
///
/// Each operation is a single atomic step at the store; callers never
/// compose them from separate reads and writes.
#[async_trait::async_trait]
pub trait AtomicKv: Send + Sync {
    /// Create `key` with the given expiry if no live entry exists.
    /// Returns false when one already does.
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key`, reporting how many live entries were removed (0 or 1).
    /// Among N concurrent callers for the same key, exactly one observes 1.
    async fn delete_and_count(&self, key: &str) -> Result<u64>;

    /// Increment the counter at `key`, creating it with `ttl` on the first
    /// hit. Returns the post-increment value; N racing callers receive N
    /// distinct sequential counts.
    async fn incr_and_get(&self, key: &str, ttl: Duration) -> Result<i64>;
}
