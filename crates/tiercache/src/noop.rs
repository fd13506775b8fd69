//! Disabled-cache stand-in.
//!
//! Reads always miss, writes and deletes do nothing, and the remember
//! variants call their loader and hand back its result untouched. Turning
//! caching off therefore changes performance, never behaviour.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::batch::{BatchGet, dedupe_keys};
use crate::error::CacheError;
use crate::options::{Loaded, Lookup, RememberOptions};

/// Cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl NoopCache {
    pub async fn get(&self, _key: &str) -> Result<Lookup, CacheError> {
        Ok(Lookup::Miss)
    }

    pub async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    pub async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    pub async fn remember<F, Fut>(
        &self,
        _key: &str,
        loader: F,
        _options: RememberOptions,
    ) -> Result<Vec<u8>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Loaded, CacheError>>,
    {
        loader().await.map(|loaded| loaded.value)
    }

    pub async fn mget<K: AsRef<str>>(&self, keys: &[K]) -> Result<BatchGet, CacheError> {
        Ok(BatchGet {
            hits: HashMap::new(),
            missing: dedupe_keys(keys),
        })
    }

    pub async fn mset(
        &self,
        _items: &HashMap<String, Vec<u8>>,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    pub async fn mremember<K, F, Fut>(
        &self,
        keys: &[K],
        loader: F,
        _options: RememberOptions,
    ) -> Result<HashMap<String, Vec<u8>>, CacheError>
    where
        K: AsRef<str>,
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = Result<HashMap<String, Loaded>, CacheError>>,
    {
        let keys = dedupe_keys(keys);
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let loaded = loader(keys).await?;
        Ok(loaded
            .into_iter()
            .map(|(key, loaded)| (key, loaded.value))
            .collect())
    }
}
