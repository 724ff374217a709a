//! Daily generation quota
//!
//! One privileged generation per identity per UTC calendar day, enforced by
//! the same atomic create-if-absent primitive as nonce issuance. The lock
//! TTL outlives the day it covers so clock skew at the boundary cannot
//! reopen it early. Idempotent under retries: a second call on the same UTC
//! day always fails.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::store::AtomicKv;
use crate::types::{Result, TurnstileError};

/// Once-per-UTC-day lock over the atomic KV capability
pub struct DailyQuotaGate {
    store: Arc<dyn AtomicKv>,
    ttl: Duration,
}

impl DailyQuotaGate {
    pub fn new(store: Arc<dyn AtomicKv>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(identity: &str, day: NaiveDate) -> String {
        format!("quota:{}:{}", identity, day.format("%Y-%m-%d"))
    }

    /// Claim today's generation for `identity`, failing if already used.
    pub async fn try_consume(&self, identity: &str) -> Result<()> {
        self.try_consume_on(identity, Utc::now().date_naive()).await
    }

    async fn try_consume_on(&self, identity: &str, day: NaiveDate) -> Result<()> {
        let granted = self
            .store
            .put_if_absent(&Self::key(identity, day), self.ttl)
            .await?;
        if granted {
            debug!(identity, %day, "daily generation granted");
            Ok(())
        } else {
            Err(TurnstileError::QuotaExhausted(
                "daily generation already used".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;

    fn gate() -> DailyQuotaGate {
        DailyQuotaGate::new(
            Arc::new(MemoryKv::new()),
            Duration::from_secs(25 * 60 * 60),
        )
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn second_grant_on_the_same_day_fails() {
        let gate = gate();

        gate.try_consume("wallet-a").await.unwrap();
        let again = gate.try_consume("wallet-a").await;
        assert!(matches!(again, Err(TurnstileError::QuotaExhausted(_))));

        // Another identity is unaffected
        gate.try_consume("wallet-b").await.unwrap();
    }

    #[tokio::test]
    async fn the_next_utc_day_grants_again() {
        let gate = gate();

        gate.try_consume_on("wallet-a", day("2026-08-05"))
            .await
            .unwrap();
        let same_day = gate.try_consume_on("wallet-a", day("2026-08-05")).await;
        assert!(matches!(same_day, Err(TurnstileError::QuotaExhausted(_))));

        gate.try_consume_on("wallet-a", day("2026-08-06"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn retries_stay_exhausted() {
        let gate = gate();
        gate.try_consume("wallet-a").await.unwrap();
        for _ in 0..5 {
            let retry = gate.try_consume("wallet-a").await;
            assert!(matches!(retry, Err(TurnstileError::QuotaExhausted(_))));
        }
    }
}
