//! In-process cache layer backed by `DashMap`.
//!
//! ## Capacity
//!
//! `max_entries` is a soft limit. A write that leaves the map above it
//! triggers an immediate sweep of expired entries; live entries are never
//! evicted to make room.
//!
//! ## Background Tasks
//!
//! - **Sweeper**: removes expired entries every `clean_interval`
//! - **Reporter**: sends hit-rate samples to a [`StatsSink`] every
//!   `stats_interval` (only when a sink is configured)
//!
//! Both tasks stop when [`MemoryLayer::close`] is awaited or the layer is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use super::{BatchHits, BatchLayer, Layer, LayerEntry, Payload};
use crate::config::MemoryLayerConfig;
use crate::error::CacheError;
use crate::stats::{LayerStats, StatsSink};

/// Stored payload with optional expiration time.
struct MemoryItem {
    payload: Payload,
    /// `None` means the entry never expires.
    expires_at: Option<Instant>,
}

impl MemoryItem {
    fn new(payload: Payload, ttl: Duration, now: Instant) -> Self {
        // A deadline past what `Instant` can represent never expires
        let expires_at = if ttl.is_zero() {
            None
        } else {
            now.checked_add(ttl)
        };
        Self {
            payload,
            expires_at,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Snapshot of a memory layer's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Number of entries currently held (expired entries included until swept).
    pub entries: usize,
    /// Number of lookups.
    pub gets: u64,
    /// Number of lookups that found a live entry.
    pub hits: u64,
    /// Number of entries removed because they expired.
    pub evictions: u64,
}

struct Shared {
    name: String,
    entries: DashMap<String, MemoryItem>,
    max_entries: usize,
    gets: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
}

impl Shared {
    fn lookup(&self, key: &str, now: Instant) -> Option<LayerEntry> {
        self.gets.fetch_add(1, Ordering::Relaxed);

        if let Some(item) = self.entries.get(key) {
            if !item.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(LayerEntry {
                    payload: Arc::clone(&item.payload),
                    ttl_remaining: item
                        .expires_at
                        .map(|at| at.saturating_duration_since(now)),
                });
            }
            // Entry expired, remove it unless a writer replaced it meanwhile
            drop(item);
            if self
                .entries
                .remove_if(key, |_, item| item.is_expired(now))
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        None
    }

    fn store(&self, key: String, payload: Payload, ttl: Duration, now: Instant) {
        self.entries.insert(key, MemoryItem::new(payload, ttl, now));
    }

    fn enforce_soft_limit(&self) {
        if self.max_entries > 0 && self.entries.len() > self.max_entries {
            let removed = self.sweep_expired();
            tracing::debug!(
                layer = %self.name,
                removed,
                max_entries = self.max_entries,
                "memory layer over capacity, swept expired entries"
            );
        }
    }

    /// Remove every expired entry. Returns the number removed.
    fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.entries.retain(|_, item| {
            if item.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }

        removed
    }

    fn sample(&self) -> LayerStats {
        LayerStats::new(
            self.name.clone(),
            self.gets.load(Ordering::Relaxed),
            self.hits.load(Ordering::Relaxed),
        )
    }
}

/// In-process cache layer.
pub struct MemoryLayer {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryLayer {
    /// Create a layer with the given soft capacity and no background tasks.
    ///
    /// `max_entries == 0` disables the capacity check.
    pub fn with_capacity(name: impl Into<String>, max_entries: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                entries: DashMap::new(),
                max_entries,
                gets: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Create a layer from configuration, starting its background tasks.
    ///
    /// The reporter only runs when both `stats_interval_ms > 0` and a sink is
    /// given. Background tasks require a Tokio runtime; outside of one they
    /// are skipped with a warning.
    pub fn new(
        name: impl Into<String>,
        config: &MemoryLayerConfig,
        sink: Option<Arc<dyn StatsSink>>,
    ) -> Self {
        let layer = Self::with_capacity(name, config.max_entries);
        let clean_every = config.clean_interval();
        let report_every = config.stats_interval();

        if clean_every.is_none() && (report_every.is_none() || sink.is_none()) {
            return layer;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!(
                layer = %layer.shared.name,
                "no Tokio runtime available, memory layer background tasks disabled"
            );
            return layer;
        }

        let mut tasks = layer.tasks.lock();
        if let Some(every) = clean_every {
            tasks.push(spawn_sweeper(
                Arc::clone(&layer.shared),
                every,
                layer.shutdown.subscribe(),
            ));
        }
        if let (Some(every), Some(sink)) = (report_every, sink) {
            tasks.push(spawn_reporter(
                Arc::clone(&layer.shared),
                sink,
                every,
                layer.shutdown.subscribe(),
            ));
        }
        drop(tasks);

        layer
    }

    /// Clean up expired entries now. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        self.shared.sweep_expired()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.shared.entries.clear();
    }

    /// Get layer statistics for monitoring.
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            entries: self.shared.entries.len(),
            gets: self.shared.gets.load(Ordering::Relaxed),
            hits: self.shared.hits.load(Ordering::Relaxed),
            evictions: self.shared.evictions.load(Ordering::Relaxed),
        }
    }

    /// Number of background tasks that have not been shut down.
    pub fn background_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Stop background tasks and wait for them to finish.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        // Receivers may already be gone; the send result is irrelevant then.
        let _ = self.shutdown.send(true);

        let handles = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(layer = %self.shared.name, error = %e, "memory layer task failed");
            }
        }
    }
}

impl Drop for MemoryLayer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn spawn_sweeper(
    shared: Arc<Shared>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = shared.sweep_expired();
                    if removed > 0 {
                        tracing::debug!(
                            layer = %shared.name,
                            removed,
                            "swept expired cache entries"
                        );
                    }
                    crate::metrics::set_cache_entries(&shared.name, shared.entries.len());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

fn spawn_reporter(
    shared: Arc<Shared>,
    sink: Arc<dyn StatsSink>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => sink.record(&shared.sample()),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[async_trait]
impl Layer for MemoryLayer {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn get(&self, key: &str) -> Result<Option<LayerEntry>, CacheError> {
        Ok(self.shared.lookup(key, Instant::now()))
    }

    async fn set(&self, key: &str, payload: Payload, ttl: Duration) -> Result<(), CacheError> {
        self.shared.store(key.to_string(), payload, ttl, Instant::now());
        self.shared.enforce_soft_limit();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.shared.entries.remove(key);
        Ok(())
    }

    fn as_batch(&self) -> Option<&dyn BatchLayer> {
        Some(self)
    }

    async fn close(&self) {
        MemoryLayer::close(self).await
    }
}

#[async_trait]
impl BatchLayer for MemoryLayer {
    async fn mget(&self, keys: &[String]) -> Result<BatchHits, CacheError> {
        let now = Instant::now();
        let mut batch = BatchHits::default();
        for key in keys {
            match self.shared.lookup(key, now) {
                Some(entry) => {
                    batch.hits.insert(key.clone(), entry.payload);
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
        let now = Instant::now();
        for (key, payload) in items {
            self.shared.store(key.clone(), Arc::clone(payload), ttl, now);
        }
        self.shared.enforce_soft_limit();
        Ok(())
    }
}
