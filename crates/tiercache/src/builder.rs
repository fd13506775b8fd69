use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::config::{CacheConfig, LayerConfig};
use crate::error::CacheError;
use crate::layer::{Layer, MemoryLayer, NetworkLayer};
use crate::layered::LayeredCache;
use crate::stats::StatsSink;
use crate::store::KvStore;

/// Builds a [`Cache`] from a [`CacheConfig`] and explicitly registered
/// store handles.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tiercache::{CacheBuilder, CacheConfig, KvStore};
///
/// # async fn example(redis: Arc<dyn KvStore>) -> Result<(), tiercache::CacheError> {
/// let config = CacheConfig::from_toml_str(r#"
/// [[layers]]
/// type = "memory"
///
/// [[layers]]
/// type = "networked"
/// store = "redis"
/// "#)?;
///
/// let cache = CacheBuilder::new(config).store("redis", redis).build()?;
/// cache.set("user:1", b"{}", std::time::Duration::ZERO).await?;
/// # Ok(())
/// # }
/// ```
pub struct CacheBuilder {
    config: CacheConfig,
    stores: HashMap<String, Arc<dyn KvStore>>,
    stats_sink: Option<Arc<dyn StatsSink>>,
}

impl CacheBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            stores: HashMap::new(),
            stats_sink: None,
        }
    }

    /// Register a store handle that networked layers can reference by `name`.
    pub fn store(mut self, name: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        self.stores.insert(name.into(), store);
        self
    }

    /// Receiver for memory layers' periodic hit-rate samples.
    pub fn stats_sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = Some(sink);
        self
    }

    /// Validate the configuration and assemble the layers.
    ///
    /// Memory layers with background tasks must be built inside a Tokio runtime.
    pub fn build(self) -> Result<Cache, CacheError> {
        if !self.config.enabled {
            tracing::info!("caching disabled, using no-op cache");
            return Ok(Cache::disabled());
        }
        self.config.validate().map_err(CacheError::Config)?;

        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(self.config.layers.len());
        for (index, layer_config) in self.config.layers.iter().enumerate() {
            let name = format!("L{}", index + 1);
            match layer_config {
                LayerConfig::Memory(memory) => {
                    layers.push(Box::new(MemoryLayer::new(
                        name,
                        memory,
                        self.stats_sink.clone(),
                    )));
                }
                LayerConfig::Networked(network) => {
                    let store = self.stores.get(&network.store).ok_or_else(|| {
                        CacheError::config(format!(
                            "store handle `{}` for layer {name} has not been provisioned",
                            network.store
                        ))
                    })?;
                    let layer = NetworkLayer::new(name, Arc::clone(store))
                        .with_timeout(Duration::from_millis(network.op_timeout_ms));
                    layers.push(Box::new(layer));
                }
            }
        }

        let cache = LayeredCache::new(&self.config, layers)?;
        tracing::info!(
            layers = ?cache.layer_names(),
            prefix = %self.config.key_prefix,
            read_policy = ?self.config.read_policy,
            "cache initialized"
        );
        Ok(Cache::layered(cache))
    }
}
