//! Multi-level cache orchestrator.
//!
//! ## Read Path
//!
//! ```text
//! get(k) → L1 → L2 → ... → Ln → miss
//!            hit at Li: backfill L0..Li-1 with default TTL (no jitter)
//!            negative at Li: stop, report Negative
//! ```
//!
//! ## Write Path
//!
//! Positive writes are jittered, encoded once and fanned out to every layer
//! in order. Fan-out is best effort: every layer is attempted and the first
//! error is returned.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{CacheConfig, ReadPolicy};
use crate::error::CacheError;
use crate::guard::StampedeGuard;
use crate::layer::{Layer, Payload};
use crate::options::{Loaded, Lookup, RememberOptions};
use crate::record;
use crate::ttl::apply_jitter;

/// Resolved, immutable settings of a [`LayeredCache`].
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) prefix: String,
    pub(crate) default_ttl: Duration,
    pub(crate) negative_ttl: Duration,
    pub(crate) jitter: f64,
    pub(crate) read_policy: ReadPolicy,
}

impl From<&CacheConfig> for Settings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            default_ttl: config.default_ttl(),
            negative_ttl: config.negative_ttl(),
            jitter: config.jitter_percent,
            read_policy: config.read_policy,
        }
    }
}

/// Cache composed of an ordered list of layers.
pub struct LayeredCache {
    pub(crate) settings: Settings,
    pub(crate) layers: Vec<Box<dyn Layer>>,
    guard: StampedeGuard,
}

impl LayeredCache {
    /// Compose `layers` (closest first) using the TTL, jitter, prefix and
    /// policy settings of `config`. The layer list in `config` is ignored.
    pub fn new(config: &CacheConfig, layers: Vec<Box<dyn Layer>>) -> Result<Self, CacheError> {
        if layers.is_empty() {
            return Err(CacheError::config("no cache layers configured"));
        }
        if !(0.0..=1.0).contains(&config.jitter_percent) {
            return Err(CacheError::config("jitter_percent must be within [0, 1]"));
        }
        Ok(Self {
            settings: Settings::from(config),
            layers,
            guard: StampedeGuard::new(),
        })
    }

    /// Names of the layers, closest first.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    /// Number of keys with a loader currently in flight.
    pub fn in_flight(&self) -> usize {
        self.guard.in_flight()
    }

    #[inline]
    pub(crate) fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.settings.prefix)
    }

    /// Read a key from the layers, top to bottom.
    pub async fn get(&self, key: &str) -> Result<Lookup, CacheError> {
        let nk = self.namespaced(key);

        for (depth, layer) in self.layers.iter().enumerate() {
            let Some(entry) = layer.get(&nk).await? else {
                continue;
            };
            let record = match record::decode(&entry.payload) {
                Ok(record) => record,
                Err(e) => {
                    debug!(
                        key = %nk,
                        layer = layer.name(),
                        error = %e,
                        "undecodable cache payload, treating as miss"
                    );
                    continue;
                }
            };
            if record.negative {
                debug!(key = %nk, layer = layer.name(), "cache hit (negative)");
                crate::metrics::record_negative_hit(layer.name());
                return Ok(Lookup::Negative);
            }

            debug!(key = %nk, layer = layer.name(), "cache hit");
            crate::metrics::record_cache_hit(layer.name());
            self.backfill(&nk, &entry.payload, depth).await;
            return Ok(Lookup::Hit(record.into_value()));
        }

        debug!(key = %nk, "cache miss");
        crate::metrics::record_cache_miss();
        Ok(Lookup::Miss)
    }

    /// Copy a payload found at `depth` into every layer above it.
    async fn backfill(&self, nk: &str, payload: &Payload, depth: usize) {
        for upper in &self.layers[..depth] {
            match upper
                .set(nk, Arc::clone(payload), self.settings.default_ttl)
                .await
            {
                Ok(()) => debug!(key = %nk, layer = upper.name(), "cache backfill"),
                Err(e) => {
                    warn!(key = %nk, layer = upper.name(), error = %e, "cache backfill failed")
                }
            }
        }
    }

    /// Write a value to every layer. A zero `ttl` uses the default TTL.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let ttl = apply_jitter(self.resolve_ttl(ttl), self.settings.jitter);
        let payload = record::encode(value)?;
        self.write_through(&self.namespaced(key), payload, ttl).await
    }

    /// Write a negative entry to every layer.
    pub(crate) async fn set_negative(&self, key: &str) -> Result<(), CacheError> {
        let ttl = apply_jitter(self.settings.negative_ttl, self.settings.jitter);
        let payload = record::encode_negative()?;
        self.write_through(&self.namespaced(key), payload, ttl).await
    }

    async fn write_through(
        &self,
        nk: &str,
        payload: Payload,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut first_err = None;
        for layer in &self.layers {
            if let Err(e) = layer.set(nk, Arc::clone(&payload), ttl).await {
                debug!(key = %nk, layer = layer.name(), error = %e, "cache write failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Remove a key from every layer.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let nk = self.namespaced(key);
        let mut first_err = None;
        for layer in &self.layers {
            if let Err(e) = layer.delete(&nk).await {
                debug!(key = %nk, layer = layer.name(), error = %e, "cache delete failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub(crate) fn resolve_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() {
            self.settings.default_ttl
        } else {
            ttl
        }
    }

    /// Read a key, calling `loader` on a miss and caching its result.
    ///
    /// A negatively cached key returns [`CacheError::NotFound`] without
    /// calling the loader. A loader error of the not-found class writes a
    /// negative entry and also returns [`CacheError::NotFound`]; any other
    /// loader error is returned unchanged and nothing is written.
    ///
    /// Under [`ReadPolicy::CacheAsideSingleFlight`] concurrent callers for
    /// the same key share one loader call and its outcome, errors included.
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
        match self.get(key).await? {
            Lookup::Hit(value) => return Ok(value),
            Lookup::Negative => return Err(CacheError::NotFound),
            Lookup::Miss => {}
        }

        let ttl = self.resolve_ttl(options.ttl.unwrap_or_default());
        match options.policy.unwrap_or(self.settings.read_policy) {
            ReadPolicy::CacheAside => self.load(key, loader, ttl).await,
            ReadPolicy::CacheAsideSingleFlight => {
                let nk = self.namespaced(key);
                self.guard
                    .run(&nk, move || async move {
                        // An earlier flight may have filled the key since the first read
                        match self.get(key).await? {
                            Lookup::Hit(value) => return Ok(value),
                            Lookup::Negative => return Err(CacheError::NotFound),
                            Lookup::Miss => {}
                        }
                        self.load(key, loader, ttl).await
                    })
                    .await
            }
        }
    }

    async fn load<F, Fut>(
        &self,
        key: &str,
        loader: F,
        ttl: Duration,
    ) -> Result<Vec<u8>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Loaded, CacheError>>,
    {
        crate::metrics::record_loader_call();
        match loader().await {
            Ok(loaded) => {
                let ttl = loaded.ttl.filter(|t| !t.is_zero()).unwrap_or(ttl);
                if let Err(e) = self.set(key, &loaded.value, ttl).await {
                    warn!(key = %key, error = %e, "failed to cache loaded value");
                }
                Ok(loaded.value)
            }
            Err(e) if e.is_not_found() => {
                debug!(key = %key, "loader reported not found, caching negative entry");
                if let Err(e) = self.set_negative(key).await {
                    warn!(key = %key, error = %e, "failed to cache negative entry");
                }
                Err(CacheError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Stop background work in every layer.
    pub async fn close(&self) {
        for layer in &self.layers {
            layer.close().await;
        }
        tracing::info!(layers = self.layers.len(), "cache closed");
    }
}
