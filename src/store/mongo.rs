//! MongoDB client and atomic key-value store
//!
//! The connection is constructed once at startup and injected into
//! components; nothing fetches it from global state. Atomicity mapping for
//! the [`AtomicKv`](super::AtomicKv) capability:
//!
//! - create-if-absent: `insert_one` with the unique `_id` as arbiter
//! - delete-and-count: `delete_one` filtered on unexpired, reporting
//!   `deleted_count`
//! - increment-and-get: `find_one_and_update` with `$inc`, upsert, and
//!   `ReturnDocument::After`

use bson::{doc, DateTime};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::AtomicKv;
use crate::types::{Result, TurnstileError};

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client and verify the connection
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| TurnstileError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| TurnstileError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    pub fn database(&self) -> Database {
        self.client.database(&self.db_name)
    }

    /// Liveness check for the readiness probe
    pub async fn ping(&self) -> Result<()> {
        self.database()
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| TurnstileError::Database(format!("MongoDB ping failed: {}", e)))?;
        Ok(())
    }
}

/// Stored KV entry. `_id` carries the logical key, so uniqueness is
/// enforced by the collection itself.
#[derive(Debug, Serialize, Deserialize)]
struct KvDoc {
    #[serde(rename = "_id")]
    key: String,
    count: i64,
    expires_at: DateTime,
}

/// MongoDB-backed [`AtomicKv`] implementation over a `kv_entries` collection
#[derive(Clone)]
pub struct MongoKv {
    entries: Collection<KvDoc>,
}

impl MongoKv {
    /// Open the collection and ensure its TTL index exists
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let entries = client.database().collection::<KvDoc>("kv_entries");

        let ttl_index = IndexModel::builder()
            .keys(doc! { "expires_at": 1 })
            .options(
                IndexOptions::builder()
                    .expire_after(Some(Duration::from_secs(0)))
                    .build(),
            )
            .build();
        entries
            .create_index(ttl_index)
            .await
            .map_err(|e| TurnstileError::Database(format!("Failed to create TTL index: {}", e)))?;

        Ok(Self { entries })
    }

    fn expiry(ttl: Duration) -> DateTime {
        DateTime::from_millis(DateTime::now().timestamp_millis() + ttl.as_millis() as i64)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

#[async_trait::async_trait]
impl AtomicKv for MongoKv {
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = DateTime::now();

        // The server TTL monitor is periodic, so an expired predecessor may
        // still be present; reap it before the insert arbitrates.
        self.entries
            .delete_one(doc! { "_id": key, "expires_at": { "$lte": now } })
            .await?;

        let entry = KvDoc {
            key: key.to_string(),
            count: 0,
            expires_at: Self::expiry(ttl),
        };
        match self.entries.insert_one(&entry).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_and_count(&self, key: &str) -> Result<u64> {
        let result = self
            .entries
            .delete_one(doc! { "_id": key, "expires_at": { "$gt": DateTime::now() } })
            .await?;
        Ok(result.deleted_count)
    }

    async fn incr_and_get(&self, key: &str, ttl: Duration) -> Result<i64> {
        let update = doc! {
            "$inc": { "count": 1 },
            "$setOnInsert": { "expires_at": Self::expiry(ttl) },
        };

        // Two racing upserts on the same missing key can surface E11000 on
        // one of them; the retry resolves against the now-existing document.
        for _ in 0..2 {
            match self
                .entries
                .find_one_and_update(doc! { "_id": key }, update.clone())
                .upsert(true)
                .return_document(ReturnDocument::After)
                .await
            {
                Ok(Some(entry)) => return Ok(entry.count),
                Ok(None) => {
                    return Err(TurnstileError::Database(
                        "upsert returned no document".to_string(),
                    ))
                }
                Err(e) if is_duplicate_key(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(TurnstileError::Database(
            "increment kept colliding on upsert".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running MongoDB instance; the
    // atomicity contract itself is covered against the in-memory backend.
}
