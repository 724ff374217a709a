//! Object storage collaborator
//!
//! Generated card art lands here. The ETag is a strong content hash
//! computed once at write time, which is what makes the conditional-GET
//! delivery path cheap.

use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::types::Result;

/// A stored binary artifact
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    /// Strong ETag, quoted, derived from the content hash
    pub etag: String,
}

/// Binary artifact storage
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<StoredObject>>;
}

/// Strong ETag for a byte payload: quoted sha256 hex
pub fn strong_etag(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// DashMap-backed [`ObjectStore`] for dev mode and tests
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, StoredObject>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let etag = strong_etag(&data);
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                etag,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.objects.get(key).map(|object| object.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_quoted_and_content_addressed() {
        let a = strong_etag(b"payload");
        let b = strong_etag(b"payload");
        let c = strong_etag(b"other payload");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with('"') && a.ends_with('"'));
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryObjectStore::new();
        store
            .put("cards/CC_ABC.png", Bytes::from_static(b"png-bytes"), "image/png")
            .await
            .unwrap();

        let object = store.get("cards/CC_ABC.png").await.unwrap().unwrap();
        assert_eq!(object.data.as_ref(), b"png-bytes");
        assert_eq!(object.content_type, "image/png");
        assert_eq!(object.etag, strong_etag(b"png-bytes"));

        assert!(store.get("cards/missing.png").await.unwrap().is_none());
    }
}
