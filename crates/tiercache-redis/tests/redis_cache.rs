//! Integration tests for the Redis-backed networked layer.
//!
//! Tests that talk to Redis spin up a real instance with testcontainers and
//! are ignored by default; run them with `cargo test -- --ignored`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tiercache::{
    Cache, CacheBuilder, CacheConfig, CacheError, KvStore, LayerConfig, Loaded, Lookup,
    MemoryLayerConfig, NetworkLayerConfig, RememberOptions,
};
use tiercache_redis::{RedisStore, RedisStoreConfig, RedisStoreError};
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

/// Get or create the shared Redis container
async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

async fn connect() -> RedisStore {
    let config = RedisStoreConfig {
        enabled: true,
        url: get_redis_url().await,
        pool_size: 5,
        timeout_ms: 5000,
    };
    RedisStore::connect(&config).await.expect("connect to redis")
}

/// Memory L1 over Redis L2, as one application instance would run it.
fn two_tier(prefix: &str, store: &RedisStore) -> Cache {
    let config = CacheConfig {
        key_prefix: prefix.to_string(),
        jitter_percent: 0.0,
        negative_ttl_ms: 500,
        layers: vec![
            LayerConfig::Memory(MemoryLayerConfig::default()),
            LayerConfig::Networked(NetworkLayerConfig::default()),
        ],
        ..CacheConfig::default()
    };
    CacheBuilder::new(config)
        .store("redis", Arc::new(store.clone()))
        .build()
        .expect("build cache")
}

#[tokio::test]
async fn test_unreachable_server_fails_fast() {
    let config = RedisStoreConfig {
        enabled: true,
        url: "redis://127.0.0.1:1".to_string(),
        pool_size: 1,
        timeout_ms: 500,
    };
    let err = RedisStore::connect(&config).await.err().expect("must fail");
    assert!(matches!(err, RedisStoreError::Pool(_)));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_store_get_set_delete() {
    let store = connect().await;

    store
        .set("store:k", b"value", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(store.get("store:k").await.unwrap(), Some(b"value".to_vec()));

    let ttl = store.ttl("store:k").await.unwrap().expect("has expiry");
    assert!(ttl <= Duration::from_secs(60));
    assert!(ttl > Duration::from_secs(50));

    store.delete("store:k").await.unwrap();
    assert_eq!(store.get("store:k").await.unwrap(), None);
    assert_eq!(store.ttl("store:k").await.unwrap(), None);

    // Deleting again is not an error
    store.delete("store:k").await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_store_zero_ttl_has_no_expiry() {
    let store = connect().await;

    store
        .set("store:forever", b"v", Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(store.ttl("store:forever").await.unwrap(), None);
    assert!(store.get("store:forever").await.unwrap().is_some());
    store.delete("store:forever").await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_store_batch_operations() {
    let store = connect().await;

    store
        .mset(
            &[("batch:a", b"1".as_slice()), ("batch:b", b"".as_slice())],
            Duration::from_secs(60),
        )
        .await
        .unwrap();

    let keys = vec![
        "batch:a".to_string(),
        "batch:b".to_string(),
        "batch:absent".to_string(),
    ];
    let found = store.mget(&keys).await.unwrap();
    assert_eq!(
        found,
        HashMap::from([
            ("batch:a".to_string(), b"1".to_vec()),
            ("batch:b".to_string(), Vec::new()),
        ])
    );
    assert!(store.ttl("batch:a").await.unwrap().is_some());

    // A single key still goes through MGET
    let single = store.mget(&keys[..1]).await.unwrap();
    assert_eq!(single.len(), 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_second_instance_reads_through_redis() {
    let store = connect().await;
    let first = two_tier("shared:", &store);
    let second = two_tier("shared:", &store);

    first
        .set("user:1", b"alice", Duration::from_secs(60))
        .await
        .unwrap();
    assert!(
        store.get("shared:user:1").await.unwrap().is_some(),
        "value should be written through to redis"
    );

    // Served from L2 and backfilled into the second instance's L1
    assert_eq!(
        second.get("user:1").await.unwrap(),
        Lookup::Hit(b"alice".to_vec())
    );
    store.delete("shared:user:1").await.unwrap();
    assert_eq!(
        second.get("user:1").await.unwrap(),
        Lookup::Hit(b"alice".to_vec())
    );

    first.close().await;
    second.close().await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_negative_entry_is_shared_between_instances() {
    let store = connect().await;
    let first = two_tier("neg:", &store);
    let second = two_tier("neg:", &store);

    let err = first
        .remember(
            "user:404",
            || async { Err(CacheError::loader("user not found")) },
            RememberOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::NotFound));

    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let err = second
        .remember(
            "user:404",
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Loaded::new("unexpected"))
            },
            RememberOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::NotFound));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The negative entry expires in redis on its own
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(store.get("neg:user:404").await.unwrap(), None);

    first.close().await;
    second.close().await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_mremember_over_redis() {
    let store = connect().await;
    let cache = two_tier("batch-remember:", &store);

    let values = cache
        .mremember(
            &["a", "b"],
            |keys| async move {
                Ok(keys
                    .into_iter()
                    .filter(|key| key == "a")
                    .map(|key| (key, Loaded::new("loaded")))
                    .collect::<HashMap<_, _>>())
            },
            RememberOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(values.len(), 1);

    let batch = cache.mget(&["a", "b"]).await.unwrap();
    assert_eq!(batch.hits["a"], b"loaded".to_vec());
    assert_eq!(batch.missing, vec!["b".to_string()]);
    assert_eq!(cache.get("b").await.unwrap(), Lookup::Negative);

    cache.close().await;
}
