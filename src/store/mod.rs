//! Durable ephemeral storage: a key-value store where every entry expires.
//!
//! All quiz state (generated quizzes, processing records and submission
//! results) lives behind [`KvStore`]. [`QuizStore`] layers the JSON encoding
//! and the per-quiz key layout on top of it.

pub mod memory;
pub mod redis_store;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Failed to (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Minimal contract the quiz core needs from a TTL key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value`, replacing any previous entry and resetting its TTL.
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration)
    -> Result<(), StoreError>;

    /// Atomically writes `value` only if `key` holds no live entry.
    /// Returns `true` when the write happened.
    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Short backend label for health output.
    fn backend(&self) -> &'static str;
}

/// Opens the store selected by the URL scheme (`memory://` or `redis://`).
pub async fn connect(url: &str) -> Result<Arc<dyn KvStore>, StoreError> {
    if url.starts_with("memory://") {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        let store = RedisStore::connect(url).await?;
        return Ok(Arc::new(store));
    }
    Err(StoreError::Backend(format!("Unsupported store URL scheme: {url}")))
}

pub fn quiz_key(quiz_id: &Uuid) -> String {
    format!("quiz:{quiz_id}")
}

pub fn processing_key(quiz_id: &Uuid) -> String {
    format!("quiz:{quiz_id}:processing")
}

pub fn results_key(quiz_id: &Uuid) -> String {
    format!("quiz:{quiz_id}:results")
}

/// Typed JSON access to the key-value store.
#[derive(Clone)]
pub struct QuizStore {
    inner: Arc<dyn KvStore>,
}

impl QuizStore {
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self { inner }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.inner.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.inner.set_with_ttl(key, raw, ttl).await
    }

    pub async fn set_json_if_absent<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let raw = serde_json::to_string(value)?;
        self.inner.set_if_absent(key, raw, ttl).await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    pub fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}
