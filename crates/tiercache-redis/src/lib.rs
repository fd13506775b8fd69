//! Redis-backed [`KvStore`](tiercache::KvStore) for tiercache's networked layer.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tiercache::{CacheBuilder, CacheConfig};
//! use tiercache_redis::{RedisStore, RedisStoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let redis = RedisStore::connect(&RedisStoreConfig {
//!     enabled: true,
//!     ..RedisStoreConfig::default()
//! })
//! .await?;
//!
//! let cache = CacheBuilder::new(CacheConfig::default())
//!     .store("redis", Arc::new(redis))
//!     .build()?;
//! # cache.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod store;

pub use config::RedisStoreConfig;
pub use store::{RedisStore, RedisStoreError, create_pool};
