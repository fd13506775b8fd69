//! Cache handle handed to application code.
//!
//! [`Cache`] is either a [`LayeredCache`] or the [`NoopCache`] used when
//! caching is disabled. Cloning is cheap: layered caches are shared behind
//! an `Arc`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::batch::BatchGet;
use crate::error::CacheError;
use crate::layered::LayeredCache;
use crate::noop::NoopCache;
use crate::options::{Loaded, Lookup, RememberOptions};

#[derive(Clone)]
pub enum Cache {
    /// Ordered layers with stampede protection.
    Layered(Arc<LayeredCache>),
    /// Caching turned off.
    Disabled(NoopCache),
}

impl Cache {
    pub fn layered(cache: LayeredCache) -> Self {
        Self::Layered(Arc::new(cache))
    }

    pub fn disabled() -> Self {
        Self::Disabled(NoopCache)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Layered(_))
    }

    /// The underlying layered cache, when caching is enabled.
    pub fn as_layered(&self) -> Option<&LayeredCache> {
        match self {
            Self::Layered(cache) => Some(cache),
            Self::Disabled(_) => None,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Lookup, CacheError> {
        match self {
            Self::Layered(cache) => cache.get(key).await,
            Self::Disabled(cache) => cache.get(key).await,
        }
    }

    /// Read a key, reporting both misses and negative entries as
    /// [`CacheError::NotFound`].
    pub async fn get_value(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        match self.get(key).await? {
            Lookup::Hit(value) => Ok(value),
            Lookup::Negative | Lookup::Miss => Err(CacheError::NotFound),
        }
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        match self {
            Self::Layered(cache) => cache.set(key, value, ttl).await,
            Self::Disabled(cache) => cache.set(key, value, ttl).await,
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            Self::Layered(cache) => cache.delete(key).await,
            Self::Disabled(cache) => cache.delete(key).await,
        }
    }

    pub async fn remember<F, Fut>(
        &self,
        key: &str,
        loader: F,
        options: RememberOptions,
    ) -> Result<Vec<u8>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Loaded, CacheError>>,
    {
        match self {
            Self::Layered(cache) => cache.remember(key, loader, options).await,
            Self::Disabled(cache) => cache.remember(key, loader, options).await,
        }
    }

    pub async fn mget<K: AsRef<str>>(&self, keys: &[K]) -> Result<BatchGet, CacheError> {
        match self {
            Self::Layered(cache) => cache.mget(keys).await,
            Self::Disabled(cache) => cache.mget(keys).await,
        }
    }

    pub async fn mset(
        &self,
        items: &HashMap<String, Vec<u8>>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        match self {
            Self::Layered(cache) => cache.mset(items, ttl).await,
            Self::Disabled(cache) => cache.mset(items, ttl).await,
        }
    }

    pub async fn mremember<K, F, Fut>(
        &self,
        keys: &[K],
        loader: F,
        options: RememberOptions,
    ) -> Result<HashMap<String, Vec<u8>>, CacheError>
    where
        K: AsRef<str>,
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = Result<HashMap<String, Loaded>, CacheError>>,
    {
        match self {
            Self::Layered(cache) => cache.mremember(keys, loader, options).await,
            Self::Disabled(cache) => cache.mremember(keys, loader, options).await,
        }
    }

    /// Stop background work. A disabled cache has none.
    pub async fn close(&self) {
        if let Self::Layered(cache) = self {
            cache.close().await;
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Layered(cache) => f
                .debug_struct("Cache::Layered")
                .field("layers", &cache.layer_names())
                .finish(),
            Self::Disabled(_) => f.write_str("Cache::Disabled"),
        }
    }
}
