//! Cache tiers.
//!
//! ## Layer Order
//!
//! ```text
//! get → L1 (memory) → L2 (networked) → ... → miss
//!          ↑ backfill ←──┘
//! ```
//!
//! Layers are numbered from 0 (closest, fastest). Each one tracks its own
//! expiry; layers never reference each other or the orchestrator.

pub mod memory;
pub mod network;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

pub use memory::{MemoryLayer, MemoryStats};
pub use network::NetworkLayer;

/// Encoded record bytes as stored by a layer.
///
/// Wrapped in `Arc` so that backfilling the same payload into several
/// layers does not copy it.
pub type Payload = Arc<Vec<u8>>;

/// A hit returned by [`Layer::get`].
#[derive(Debug, Clone)]
pub struct LayerEntry {
    pub payload: Payload,
    /// Remaining TTL, when the layer knows it.
    pub ttl_remaining: Option<Duration>,
}

/// Result of a batch read against a single layer.
#[derive(Debug, Default)]
pub struct BatchHits {
    pub hits: HashMap<String, Payload>,
    pub missing: Vec<String>,
}

/// One tier of the cache hierarchy.
#[async_trait]
pub trait Layer: Send + Sync {
    /// Short name used in log fields and metric labels (e.g. `L1`).
    fn name(&self) -> &str;

    /// Look up a key.
    ///
    /// `Ok(None)` is a clean miss, including entries that expired locally.
    /// Transport failures are reported as `Err` and never as a miss.
    async fn get(&self, key: &str) -> Result<Option<LayerEntry>, CacheError>;

    /// Store a payload. A zero `ttl` means "no expiry" for in-process tiers
    /// and "store default" for networked ones.
    async fn set(&self, key: &str, payload: Payload, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Batch capability, if the layer has one.
    ///
    /// Layers without it are driven key-by-key by the orchestrator.
    fn as_batch(&self) -> Option<&dyn BatchLayer> {
        None
    }

    /// Stop background tasks owned by the layer.
    ///
    /// Default implementation is a no-op (for layers without background work).
    async fn close(&self) {}
}

/// Optional batch capability of a [`Layer`].
#[async_trait]
pub trait BatchLayer: Send + Sync {
    async fn mget(&self, keys: &[String]) -> Result<BatchHits, CacheError>;

    async fn mset(&self, items: &HashMap<String, Payload>, ttl: Duration)
    -> Result<(), CacheError>;
}
