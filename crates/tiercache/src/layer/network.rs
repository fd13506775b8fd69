//! Networked cache layer over a [`KvStore`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{BatchHits, BatchLayer, Layer, LayerEntry, Payload};
use crate::error::CacheError;
use crate::store::{KvStore, StoreError};

/// Cache layer that forwards to a shared key-value store.
pub struct NetworkLayer {
    name: String,
    store: Arc<dyn KvStore>,
    op_timeout: Option<Duration>,
}

impl NetworkLayer {
    pub fn new(name: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Self {
            name: name.into(),
            store,
            op_timeout: None,
        }
    }

    /// Bound every store call by `timeout`; a zero duration disables the bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    async fn call<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, CacheError> {
        let result = match self.op_timeout {
            Some(after) => tokio::time::timeout(after, op)
                .await
                .map_err(|_| CacheError::Timeout {
                    layer: self.name.clone(),
                    after,
                })?,
            None => op.await,
        };
        result.map_err(|source| CacheError::Backend {
            layer: self.name.clone(),
            source,
        })
    }
}

#[async_trait]
impl Layer for NetworkLayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<LayerEntry>, CacheError> {
        let Some(value) = self.call(self.store.get(key)).await? else {
            return Ok(None);
        };

        // Remaining TTL is best effort; the value is still a hit without it
        let ttl_remaining = match self.call(self.store.ttl(key)).await {
            Ok(ttl) => ttl,
            Err(e) => {
                tracing::debug!(layer = %self.name, key = %key, error = %e, "TTL lookup failed");
                None
            }
        };

        Ok(Some(LayerEntry {
            payload: Arc::new(value),
            ttl_remaining,
        }))
    }

    async fn set(&self, key: &str, payload: Payload, ttl: Duration) -> Result<(), CacheError> {
        self.call(self.store.set(key, &payload, ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.call(self.store.delete(key)).await
    }

    fn as_batch(&self) -> Option<&dyn BatchLayer> {
        Some(self)
    }
}

#[async_trait]
impl BatchLayer for NetworkLayer {
    async fn mget(&self, keys: &[String]) -> Result<BatchHits, CacheError> {
        if keys.is_empty() {
            return Ok(BatchHits::default());
        }
        let mut found = self.call(self.store.mget(keys)).await?;

        // Keys absent from the store result are misses, never empty hits
        let mut batch = BatchHits::default();
        for key in keys {
            match found.remove(key) {
                Some(value) => {
                    batch.hits.insert(key.clone(), Arc::new(value));
                }
                None => batch.missing.push(key.clone()),
            }
        }
        Ok(batch)
    }

    async fn mset(
        &self,
        items: &HashMap<String, Payload>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if items.is_empty() {
            return Ok(());
        }
        let pairs: Vec<(&str, &[u8])> = items
            .iter()
            .map(|(key, payload)| (key.as_str(), payload.as_slice()))
            .collect();
        self.call(self.store.mset(&pairs, ttl)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MapStore {
        values: DashMap<String, Vec<u8>>,
        ttl_fails: AtomicBool,
        hang: AtomicBool,
    }

    #[async_trait]
    impl KvStore for MapStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(self.values.get(key).map(|v| v.clone()))
        }

        async fn set(&self, key: &str, value: &[u8], _ttl: Duration) -> Result<(), StoreError> {
            self.values.insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.values.remove(key);
            Ok(())
        }

        async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
            if self.ttl_fails.load(Ordering::SeqCst) {
                return Err(StoreError::new("TTL unsupported"));
            }
            Ok(Some(Duration::from_secs(30)))
        }
    }

    #[tokio::test]
    async fn test_get_reports_remaining_ttl() {
        let store = Arc::new(MapStore::default());
        let layer = NetworkLayer::new("L2", store.clone());
        layer
            .set("k", Arc::new(b"v".to_vec()), Duration::from_secs(30))
            .await
            .unwrap();

        let entry = layer.get("k").await.unwrap().expect("hit");
        assert_eq!(entry.payload.as_slice(), b"v");
        assert_eq!(entry.ttl_remaining, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_ttl_failure_does_not_fail_get() {
        let store = Arc::new(MapStore::default());
        store.ttl_fails.store(true, Ordering::SeqCst);
        store.values.insert("k".to_string(), b"v".to_vec());
        let layer = NetworkLayer::new("L2", store);

        let entry = layer.get("k").await.unwrap().expect("hit");
        assert!(entry.ttl_remaining.is_none());
    }

    #[tokio::test]
    async fn test_mget_distinguishes_absent_from_empty() {
        let store = Arc::new(MapStore::default());
        store.values.insert("empty".to_string(), Vec::new());
        store.values.insert("full".to_string(), b"x".to_vec());
        let layer = NetworkLayer::new("L2", store);

        let keys = vec![
            "empty".to_string(),
            "absent".to_string(),
            "full".to_string(),
        ];
        let batch = layer.mget(&keys).await.unwrap();
        assert_eq!(batch.hits.len(), 2);
        assert!(batch.hits["empty"].is_empty());
        assert_eq!(batch.missing, vec!["absent".to_string()]);
    }

    #[tokio::test]
    async fn test_mset_uses_default_per_key_fallback() {
        let store = Arc::new(MapStore::default());
        let layer = NetworkLayer::new("L2", store.clone());
        let items: HashMap<String, Payload> = [
            ("a".to_string(), Arc::new(b"1".to_vec())),
            ("b".to_string(), Arc::new(b"2".to_vec())),
        ]
        .into_iter()
        .collect();

        layer.mset(&items, Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.values.get("a").unwrap().as_slice(), b"1");
        assert_eq!(store.values.get("b").unwrap().as_slice(), b"2");
    }

    #[tokio::test]
    async fn test_hung_store_times_out() {
        let store = Arc::new(MapStore::default());
        store.hang.store(true, Ordering::SeqCst);
        let layer = NetworkLayer::new("L2", store).with_timeout(Duration::from_millis(20));

        let err = layer.get("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout { ref layer, .. } if layer == "L2"));
    }
}
