//! Multi-level cache with read-through loading, stampede protection and
//! negative caching.
//!
//! ## Architecture
//!
//! ```text
//! Cache ─┬─ Layered(LayeredCache) ── L1 MemoryLayer ── L2 NetworkLayer(KvStore) ── ...
//!        └─ Disabled(NoopCache)
//! ```
//!
//! Every layer stores the same encoded [`Record`](record::Record), so a value
//! found in a lower layer can be copied upward unchanged. Negative entries
//! ("known not to exist") are records too and expire on their own, shorter TTL.
//!
//! Build a cache with [`CacheBuilder`] from a [`CacheConfig`] and the store
//! handles that networked layers refer to by name.

pub mod batch;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod layer;
pub mod layered;
pub mod metrics;
pub mod noop;
pub mod options;
pub mod record;
pub mod stats;
pub mod store;
pub mod ttl;

pub use batch::BatchGet;
pub use builder::CacheBuilder;
pub use cache::Cache;
pub use config::{CacheConfig, LayerConfig, MemoryLayerConfig, NetworkLayerConfig, ReadPolicy};
pub use error::{BoxError, CacheError, SharedError};
pub use guard::StampedeGuard;
pub use layer::{BatchHits, BatchLayer, Layer, LayerEntry, MemoryLayer, NetworkLayer, Payload};
pub use layered::LayeredCache;
pub use noop::NoopCache;
pub use options::{Loaded, Lookup, RememberOptions};
pub use stats::{LayerStats, StatsSink, TracingStatsSink};
pub use store::{KvStore, StoreError};
