//! Networked key-value store boundary.
//!
//! The cache never manages connections, retries or authentication for the
//! networked tier. It is handed a ready-to-use [`KvStore`] and only issues
//! plain key-value commands against it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::BoxError;

/// Failure reported by a [`KvStore`] implementation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Key-value store used by the networked cache layer.
///
/// Implementations must be safe to share across tasks. Keys arrive already
/// namespaced; implementations must not add their own prefix.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a value. `Ok(None)` means the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store a value. A zero `ttl` leaves expiry to the store's default.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Remaining time-to-live, `None` when absent or without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Fetch several values at once. Absent keys are omitted from the result.
    ///
    /// The default implementation issues one `get` per key.
    async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Store several values with one shared TTL.
    ///
    /// The default implementation issues one `set` per key.
    async fn mset(&self, items: &[(&str, &[u8])], ttl: Duration) -> Result<(), StoreError> {
        for (key, value) in items {
            self.set(key, value, ttl).await?;
        }
        Ok(())
    }
}
