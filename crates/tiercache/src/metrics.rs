//! Cache metrics.
//!
//! Emitted through the `metrics` facade; nothing is recorded unless the
//! embedding application installs a recorder.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_NEGATIVE_HITS_TOTAL: &str = "cache_negative_hits_total";
    pub const CACHE_LOADER_CALLS_TOTAL: &str = "cache_loader_calls_total";
    pub const CACHE_ENTRIES: &str = "cache_entries";
}

/// Record a cache hit at the given layer.
pub fn record_cache_hit(layer: &str) {
    counter!(names::CACHE_HITS_TOTAL, "layer" => layer.to_string()).increment(1);
}

/// Record a lookup that no layer could answer.
pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Record a negative entry served at the given layer.
pub fn record_negative_hit(layer: &str) {
    counter!(names::CACHE_NEGATIVE_HITS_TOTAL, "layer" => layer.to_string()).increment(1);
}

pub fn record_loader_call() {
    counter!(names::CACHE_LOADER_CALLS_TOTAL).increment(1);
}

/// Set the number of entries held by a layer.
pub fn set_cache_entries(layer: &str, count: usize) {
    gauge!(names::CACHE_ENTRIES, "layer" => layer.to_string()).set(count as f64);
}
