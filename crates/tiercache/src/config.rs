use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CacheError;

/// Negative TTL used when `negative_ttl_ms` is zero.
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(30);

/// Read path used by `remember` on a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReadPolicy {
    /// Call the loader directly; concurrent misses all invoke it.
    #[serde(rename = "cache_aside")]
    CacheAside,
    /// Coalesce concurrent misses for a key into one loader call.
    #[default]
    #[serde(rename = "cache_aside_singleflight", alias = "cache_aside_sf")]
    CacheAsideSingleFlight,
}

/// Cache configuration.
///
/// Read once when the cache is built; later changes have no effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Disable to get a pass-through cache that always misses.
    /// Default: true
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Prepended to every key before it reaches a layer.
    #[serde(default)]
    pub key_prefix: String,

    /// TTL for writes that do not specify one, and for backfill writes.
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// TTL jitter as a fraction of the nominal TTL, in `[0, 1]`.
    /// Default: 0.1 (±10%)
    #[serde(default = "default_jitter_percent")]
    pub jitter_percent: f64,

    /// TTL for negative entries. Zero falls back to 30 seconds.
    #[serde(default = "default_negative_ttl_ms")]
    pub negative_ttl_ms: u64,

    #[serde(default)]
    pub read_policy: ReadPolicy,

    /// Layers from closest (L1) to farthest.
    #[serde(default = "default_layers")]
    pub layers: Vec<LayerConfig>,
}

fn default_enabled() -> bool {
    true
}

fn default_ttl_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_jitter_percent() -> f64 {
    0.1
}

fn default_negative_ttl_ms() -> u64 {
    30_000
}

fn default_layers() -> Vec<LayerConfig> {
    vec![LayerConfig::Memory(MemoryLayerConfig::default())]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            key_prefix: String::new(),
            default_ttl_ms: default_ttl_ms(),
            jitter_percent: default_jitter_percent(),
            negative_ttl_ms: default_negative_ttl_ms(),
            read_policy: ReadPolicy::default(),
            layers: default_layers(),
        }
    }
}

impl CacheConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, CacheError> {
        toml::from_str(input).map_err(|e| CacheError::config(e.to_string()))
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn negative_ttl(&self) -> Duration {
        if self.negative_ttl_ms == 0 {
            DEFAULT_NEGATIVE_TTL
        } else {
            Duration::from_millis(self.negative_ttl_ms)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.jitter_percent) {
            return Err("jitter_percent must be within [0, 1]".into());
        }
        if self.default_ttl_ms == 0 {
            return Err("default_ttl_ms must be > 0".into());
        }
        if !self.enabled {
            return Ok(());
        }
        if self.layers.is_empty() {
            return Err("at least one cache layer must be configured".into());
        }
        for (index, layer) in self.layers.iter().enumerate() {
            if let LayerConfig::Networked(net) = layer {
                if net.store.trim().is_empty() {
                    return Err(format!("layers[{index}].store must not be empty"));
                }
            }
        }
        Ok(())
    }
}

/// One entry of the ordered layer list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerConfig {
    Memory(MemoryLayerConfig),
    #[serde(alias = "redis")]
    Networked(NetworkLayerConfig),
}

/// In-process layer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryLayerConfig {
    /// Soft entry limit; zero disables the check.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Expiry sweep interval; zero disables the sweeper.
    #[serde(default = "default_clean_interval_ms")]
    pub clean_interval_ms: u64,

    /// Hit-rate report interval; zero disables reporting.
    #[serde(default)]
    pub stats_interval_ms: u64,
}

fn default_max_entries() -> usize {
    10_000
}

fn default_clean_interval_ms() -> u64 {
    60_000
}

impl Default for MemoryLayerConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            clean_interval_ms: default_clean_interval_ms(),
            stats_interval_ms: 0,
        }
    }
}

impl MemoryLayerConfig {
    pub fn clean_interval(&self) -> Option<Duration> {
        (self.clean_interval_ms > 0).then(|| Duration::from_millis(self.clean_interval_ms))
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_ms > 0).then(|| Duration::from_millis(self.stats_interval_ms))
    }
}

/// Networked layer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkLayerConfig {
    /// Name of a store handle registered on the builder.
    #[serde(default = "default_store")]
    pub store: String,

    /// Upper bound for a single store call; zero means unbounded.
    #[serde(default)]
    pub op_timeout_ms: u64,
}

fn default_store() -> String {
    "redis".to_string()
}

impl Default for NetworkLayerConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            op_timeout_ms: 0,
        }
    }
}
