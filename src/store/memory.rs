//! In-memory atomic key-value store
//!
//! Dev-mode and test backend with the same atomicity contract as the
//! MongoDB store. Entries expire by wall clock; a background sweep reclaims
//! dead ones so unconsumed nonces do not pile up.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::AtomicKv;
use crate::types::Result;

#[derive(Debug, Clone)]
struct KvEntry {
    expires_at: Instant,
    count: i64,
}

/// DashMap-backed [`AtomicKv`] implementation
#[derive(Default)]
pub struct MemoryKv {
    entries: DashMap<String, KvEntry>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait::async_trait]
impl AtomicKv for MemoryKv {
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        // The entry guard serializes concurrent callers on this key.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at <= now {
                    occupied.insert(KvEntry {
                        expires_at: now + ttl,
                        count: 0,
                    });
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(KvEntry {
                    expires_at: now + ttl,
                    count: 0,
                });
                Ok(true)
            }
        }
    }

    async fn delete_and_count(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        if self
            .entries
            .remove_if(key, |_, entry| entry.expires_at > now)
            .is_some()
        {
            return Ok(1);
        }
        // A dead entry counts as already gone; drop it while we are here.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(0)
    }

    async fn incr_and_get(&self, key: &str, ttl: Duration) -> Result<i64> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.expires_at <= now {
                    entry.expires_at = now + ttl;
                    entry.count = 0;
                }
                entry.count += 1;
                Ok(entry.count)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(KvEntry {
                    expires_at: now + ttl,
                    count: 1,
                });
                Ok(1)
            }
        }
    }
}

/// Spawn a background task that sweeps expired entries every 60 seconds
pub fn spawn_cleanup_task(store: Arc<MemoryKv>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = store.cleanup();
            if removed > 0 {
                debug!("KV cleanup removed {} expired entries", removed);
            }
        }
    });
}
