mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeStore;
use parking_lot::Mutex;
use tiercache::{
    CacheBuilder, CacheConfig, CacheError, KvStore, LayerStats, Loaded, Lookup, RememberOptions,
    StatsSink,
};

const TWO_TIER: &str = r#"
key_prefix = "svc:"
jitter_percent = 0.0

[[layers]]
type = "memory"
max_entries = 100
clean_interval_ms = 20
stats_interval_ms = 20

[[layers]]
type = "redis"
store = "shared"
op_timeout_ms = 500
"#;

#[derive(Default)]
struct RecordingSink {
    samples: Mutex<Vec<LayerStats>>,
}

impl StatsSink for RecordingSink {
    fn record(&self, stats: &LayerStats) {
        self.samples.lock().push(stats.clone());
    }
}

#[tokio::test]
async fn test_build_from_toml_with_registered_store() {
    let store = FakeStore::new();
    let handle: Arc<dyn KvStore> = store.clone();
    let sink = Arc::new(RecordingSink::default());

    let config = CacheConfig::from_toml_str(TWO_TIER).unwrap();
    let cache = CacheBuilder::new(config)
        .store("shared", handle)
        .stats_sink(sink.clone())
        .build()
        .unwrap();

    assert!(cache.is_enabled());
    assert_eq!(cache.as_layered().unwrap().layer_names(), vec!["L1", "L2"]);

    cache.set("a", b"1", Duration::from_secs(30)).await.unwrap();
    assert!(store.contains("svc:a"));
    assert_eq!(store.last_ttl("svc:a"), Some(Duration::from_secs(30)));
    assert_eq!(cache.get_value("a").await.unwrap(), b"1".to_vec());

    tokio::time::sleep(Duration::from_millis(60)).await;
    cache.close().await;

    let samples = sink.samples.lock();
    assert!(samples.iter().all(|s| s.layer == "L1"));
    assert!(!samples.is_empty());
}

#[tokio::test]
async fn test_missing_store_handle_fails_fast() {
    let config = CacheConfig::from_toml_str(TWO_TIER).unwrap();
    let err = CacheBuilder::new(config)
        .store("other", FakeStore::new())
        .build()
        .unwrap_err();
    assert!(matches!(err, CacheError::Config(_)));
}

#[tokio::test]
async fn test_invalid_jitter_is_rejected() {
    let config = CacheConfig {
        jitter_percent: -0.5,
        ..CacheConfig::default()
    };
    let err = CacheBuilder::new(config).build().unwrap_err();
    assert!(matches!(err, CacheError::Config(ref message) if message.contains("jitter")));
}

#[tokio::test]
async fn test_disabled_cache_passes_loader_through() {
    let config = CacheConfig::from_toml_str("enabled = false").unwrap();
    let cache = CacheBuilder::new(config).build().unwrap();
    assert!(!cache.is_enabled());

    cache.set("k", b"v", Duration::from_secs(60)).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), Lookup::Miss);

    let value = cache
        .remember("k", || async { Ok(Loaded::new("fresh")) }, RememberOptions::new())
        .await
        .unwrap();
    assert_eq!(value, b"fresh".to_vec());

    let err = cache
        .remember(
            "k",
            || async { Err(CacheError::loader("row not found")) },
            RememberOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Loader(_)));

    let batch = cache.mget(&["a", "b"]).await.unwrap();
    assert_eq!(batch.missing.len(), 2);
    cache.close().await;
}
