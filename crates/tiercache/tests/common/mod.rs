//! Shared fixtures for cache integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tiercache::{CacheConfig, KvStore, Layer, LayeredCache, NetworkLayer, StoreError};

/// In-memory `KvStore` with expiry, failure injection and call recording.
#[derive(Default)]
pub struct FakeStore {
    values: DashMap<String, (Vec<u8>, Option<Instant>)>,
    failing: AtomicBool,
    /// TTL passed to every write, in call order.
    pub written_ttls: Mutex<Vec<(String, Duration)>>,
    pub gets: AtomicUsize,
    pub mgets: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Store raw bytes, bypassing the cache codec.
    pub fn put_raw(&self, key: &str, bytes: &[u8]) {
        self.values.insert(key.to_string(), (bytes.to_vec(), None));
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.values.get(key).map(|entry| entry.0.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.live(key, Instant::now()).is_some()
    }

    pub fn last_ttl(&self, key: &str) -> Option<Duration> {
        self.written_ttls
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, ttl)| *ttl)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::new("connection refused"));
        }
        Ok(())
    }

    fn live(&self, key: &str, now: Instant) -> Option<(Vec<u8>, Option<Instant>)> {
        let entry = self.values.get(key)?;
        match entry.1 {
            Some(at) if at <= now => None,
            _ => Some(entry.clone()),
        }
    }

    fn write(&self, key: &str, value: &[u8], ttl: Duration) {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        self.values
            .insert(key.to_string(), (value.to_vec(), expires_at));
        self.written_ttls.lock().push((key.to_string(), ttl));
    }
}

#[async_trait]
impl KvStore for FakeStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check()?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.live(key, Instant::now()).map(|(value, _)| value))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        self.write(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.values.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.check()?;
        let now = Instant::now();
        Ok(self
            .live(key, now)
            .and_then(|(_, expires_at)| expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn mget(
        &self,
        keys: &[String],
    ) -> Result<std::collections::HashMap<String, Vec<u8>>, StoreError> {
        self.check()?;
        self.mgets.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        Ok(keys
            .iter()
            .filter_map(|key| self.live(key, now).map(|(value, _)| (key.clone(), value)))
            .collect())
    }
}

/// Config with no jitter, so stored TTLs are exact.
pub fn exact_config() -> CacheConfig {
    CacheConfig {
        jitter_percent: 0.0,
        ..CacheConfig::default()
    }
}

/// Layered cache over fake stores, closest first, named L1, L2, ...
pub fn layered_over(config: &CacheConfig, stores: &[Arc<FakeStore>]) -> LayeredCache {
    let layers: Vec<Box<dyn Layer>> = stores
        .iter()
        .enumerate()
        .map(|(i, store)| {
            let store: Arc<dyn KvStore> = store.clone();
            Box::new(NetworkLayer::new(format!("L{}", i + 1), store)) as Box<dyn Layer>
        })
        .collect();
    LayeredCache::new(config, layers).expect("valid layers")
}
