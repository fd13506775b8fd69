//! Periodic hit-rate reporting for in-process layers.

use serde::Serialize;

/// One hit-rate sample for a layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerStats {
    pub layer: String,
    pub gets: u64,
    pub hits: u64,
    /// `hits / gets`, in `[0, 1]`.
    pub hit_rate: f64,
}

impl LayerStats {
    pub fn new(layer: impl Into<String>, gets: u64, hits: u64) -> Self {
        let hit_rate = if gets == 0 {
            0.0
        } else {
            hits as f64 / gets as f64
        };
        Self {
            layer: layer.into(),
            gets,
            hits,
            hit_rate,
        }
    }
}

/// Receiver for periodic [`LayerStats`] samples.
///
/// When no sink is configured the reporter is simply not started.
pub trait StatsSink: Send + Sync {
    fn record(&self, stats: &LayerStats);
}

/// Sink that emits each sample as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
    fn record(&self, stats: &LayerStats) {
        tracing::info!(
            layer = %stats.layer,
            gets = stats.gets,
            hits = stats.hits,
            hit_rate = stats.hit_rate,
            "cache layer hit rate"
        );
    }
}
