//! Batch operations for [`LayeredCache`].
//!
//! Batch reads treat negative entries as plain misses: they are reported in
//! `missing` and never as a separate negative result. Use a single-key
//! `get` to tell the two apart.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::CacheError;
use crate::layer::{Layer, Payload};
use crate::layered::LayeredCache;
use crate::options::{Loaded, RememberOptions};
use crate::record;
use crate::ttl::apply_jitter;

/// Result of a batch read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchGet {
    pub hits: HashMap<String, Vec<u8>>,
    /// Keys no layer could answer, including negatively cached keys,
    /// in first-seen input order.
    pub missing: Vec<String>,
}

/// Drop empty keys and duplicates, keeping first-seen order.
pub(crate) fn dedupe_keys<K: AsRef<str>>(keys: &[K]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter()
        .map(AsRef::as_ref)
        .filter(|key| !key.is_empty() && seen.insert(*key))
        .map(str::to_string)
        .collect()
}

impl LayeredCache {
    /// Read several keys, backfilling upper layers from lower-layer hits.
    pub async fn mget<K: AsRef<str>>(&self, keys: &[K]) -> Result<BatchGet, CacheError> {
        let mut pending = dedupe_keys(keys);
        let mut result = BatchGet::default();
        if pending.is_empty() {
            return Ok(result);
        }

        for (depth, layer) in self.layers.iter().enumerate() {
            if pending.is_empty() {
                break;
            }
            let query: Vec<String> = pending.iter().map(|key| self.namespaced(key)).collect();
            let found = fetch_many(layer.as_ref(), &query).await?;
            if found.is_empty() {
                continue;
            }

            let mut promote: HashMap<String, Payload> = HashMap::new();
            let mut still_pending = Vec::with_capacity(pending.len());
            for (key, nk) in pending.into_iter().zip(query) {
                let Some(payload) = found.get(&nk) else {
                    still_pending.push(key);
                    continue;
                };
                match record::decode(payload) {
                    Ok(record) if !record.negative => {
                        crate::metrics::record_cache_hit(layer.name());
                        result.hits.insert(key, record.into_value());
                        promote.insert(nk, Arc::clone(payload));
                    }
                    Ok(_) => {
                        crate::metrics::record_negative_hit(layer.name());
                        still_pending.push(key);
                    }
                    Err(e) => {
                        debug!(
                            key = %nk,
                            layer = layer.name(),
                            error = %e,
                            "undecodable cache payload, treating as miss"
                        );
                        still_pending.push(key);
                    }
                }
            }
            pending = still_pending;

            if depth > 0 && !promote.is_empty() {
                self.backfill_many(&promote, depth).await;
            }
        }

        debug!(
            hits = result.hits.len(),
            missing = pending.len(),
            "cache batch get"
        );
        result.missing = pending;
        Ok(result)
    }

    /// Copy payloads found at `depth` into every layer above it, one batch per layer.
    async fn backfill_many(&self, items: &HashMap<String, Payload>, depth: usize) {
        let ttl = self.settings.default_ttl;
        for upper in &self.layers[..depth] {
            let outcome = match upper.as_batch() {
                Some(batch) => batch.mset(items, ttl).await,
                None => {
                    let mut outcome = Ok(());
                    for (nk, payload) in items {
                        if let Err(e) = upper.set(nk, Arc::clone(payload), ttl).await {
                            outcome = Err(e);
                        }
                    }
                    outcome
                }
            };
            match outcome {
                Ok(()) => debug!(layer = upper.name(), keys = items.len(), "cache batch backfill"),
                Err(e) => warn!(layer = upper.name(), error = %e, "cache batch backfill failed"),
            }
        }
    }

    /// Write several values to every layer, jittering each key's TTL independently.
    ///
    /// A zero `ttl` uses the default TTL.
    pub async fn mset(
        &self,
        items: &HashMap<String, Vec<u8>>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if items.is_empty() {
            return Ok(());
        }
        let nominal = self.resolve_ttl(ttl);
        let mut rows = Vec::with_capacity(items.len());
        for (key, value) in items {
            rows.push((
                self.namespaced(key),
                record::encode(value)?,
                apply_jitter(nominal, self.settings.jitter),
            ));
        }

        let mut first_err = None;
        for layer in &self.layers {
            for (nk, payload, ttl) in &rows {
                if let Err(e) = layer.set(nk, Arc::clone(payload), *ttl).await {
                    debug!(key = %nk, layer = layer.name(), error = %e, "cache write failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Read several keys, loading every missing key with one loader call.
    ///
    /// Keys the loader does not return are negatively cached and left out of
    /// the result. There is no stampede protection here: concurrent batch
    /// callers with overlapping misses each call their loader.
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
        let BatchGet { mut hits, missing } = self.mget(keys).await?;
        if missing.is_empty() {
            return Ok(hits);
        }

        let ttl = self.resolve_ttl(options.ttl.unwrap_or_default());
        crate::metrics::record_loader_call();
        let mut loaded = loader(missing.clone()).await?;

        for key in missing {
            match loaded.remove(&key) {
                Some(item) => {
                    let item_ttl = item.ttl.filter(|t| !t.is_zero()).unwrap_or(ttl);
                    if let Err(e) = self.set(&key, &item.value, item_ttl).await {
                        warn!(key = %key, error = %e, "failed to cache loaded value");
                    }
                    hits.insert(key, item.value);
                }
                None => {
                    if let Err(e) = self.set_negative(&key).await {
                        warn!(key = %key, error = %e, "failed to cache negative entry");
                    }
                }
            }
        }
        if !loaded.is_empty() {
            debug!(extra = loaded.len(), "batch loader returned unrequested keys, ignoring them");
        }

        Ok(hits)
    }
}

/// Read `keys` from one layer, through its batch capability when it has one.
async fn fetch_many(
    layer: &dyn Layer,
    keys: &[String],
) -> Result<HashMap<String, Payload>, CacheError> {
    if let Some(batch) = layer.as_batch() {
        return Ok(batch.mget(keys).await?.hits);
    }
    let mut hits = HashMap::new();
    for key in keys {
        if let Some(entry) = layer.get(key).await? {
            hits.insert(key.clone(), entry.payload);
        }
    }
    Ok(hits)
}
