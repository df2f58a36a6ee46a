mod common;

use std::sync::Arc;
use std::time::Duration;

use casale::application::repos::RepoError;
use casale::cache::{
    CacheConfig, CacheError, CacheMetadata, CacheStore, FetchSource, PropertyCache, keys,
};
use casale::domain::entities::PropertyRecord;
use casale::infra::memory::InMemoryRepositories;

use common::{CountingRepo, FlakyStore, Harness, memory_store, sample_records};

#[tokio::test]
async fn second_read_is_served_from_cache() {
    let store = Arc::new(FlakyStore::new());
    let harness = Harness::new(store.clone(), sample_records());

    let first = harness.cache.get_all_cached().await.expect("first read");
    assert_eq!(first.source, FetchSource::Database);
    assert_eq!(first.value.len(), 3);
    assert_eq!(harness.repo.calls(), 1);
    assert_eq!(
        store.set_keys(),
        vec![keys::all_key(), keys::meta_key(&keys::all_key())]
    );

    let second = harness.cache.get_all_cached().await.expect("second read");
    assert_eq!(second.source, FetchSource::Cache);
    assert_eq!(second.value, first.value);
    assert_eq!(second.payload, first.payload);
    assert_eq!(harness.repo.calls(), 1);
    assert_eq!(store.set_keys().len(), 2);
}

#[tokio::test]
async fn aggregate_is_newest_first() {
    let harness = Harness::new(memory_store(), sample_records());

    let fetched = harness.cache.get_all_cached().await.expect("read");
    let ids: Vec<_> = fetched.value.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

#[tokio::test]
async fn miss_writes_entry_with_ttl_and_metadata() {
    let harness = Harness::new(memory_store(), sample_records());
    harness.cache.get_all_cached().await.expect("read");

    let ttl = harness
        .store
        .ttl(&keys::all_key())
        .await
        .expect("ttl")
        .expect("entry should expire");
    assert!((3595..=3600).contains(&ttl), "unexpected ttl {ttl}");

    let raw = harness
        .store
        .get(&keys::meta_key(&keys::all_key()))
        .await
        .expect("get")
        .expect("metadata sidecar");
    let metadata: CacheMetadata = serde_json::from_slice(&raw).expect("metadata json");
    assert_eq!(metadata.row_count, 3);
    assert_eq!(metadata.source, FetchSource::Database);
    assert!(metadata.fetch_time_seconds >= 0.0);
}

#[tokio::test]
async fn cached_payload_decodes_to_the_stored_records() {
    let harness = Harness::new(memory_store(), sample_records());
    harness.cache.get_all_cached().await.expect("read");

    let raw = harness
        .store
        .get(&keys::all_key())
        .await
        .expect("get")
        .expect("entry present");
    let decoded: Vec<PropertyRecord> = serde_json::from_slice(&raw).expect("payload json");
    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded[0].location, "Chicago, IL");
}

#[tokio::test]
async fn location_lookups_share_one_entry_regardless_of_case() {
    let harness = Harness::new(memory_store(), sample_records());

    let first = harness
        .cache
        .get_by_location_cached("New York")
        .await
        .expect("first read");
    assert_eq!(first.source, FetchSource::Database);
    assert_eq!(first.value.len(), 2);

    let second = harness
        .cache
        .get_by_location_cached("new york")
        .await
        .expect("second read");
    assert_eq!(second.source, FetchSource::Cache);
    assert_eq!(harness.repo.calls(), 1);

    let ttl = harness
        .store
        .ttl("properties_location_new_york")
        .await
        .expect("ttl");
    assert!(ttl.is_some());
}

#[tokio::test]
async fn blank_location_is_rejected() {
    let harness = Harness::new(memory_store(), sample_records());

    let err = harness
        .cache
        .get_by_location_cached("   ")
        .await
        .expect_err("blank location");
    assert!(matches!(err, CacheError::InvalidInput(_)));
    assert_eq!(harness.repo.calls(), 0);
}

#[tokio::test]
async fn price_range_is_inclusive_and_cheapest_first() {
    let harness = Harness::new(memory_store(), sample_records());

    let fetched = harness
        .cache
        .get_by_price_range_cached(450_000.0, 800_000.0)
        .await
        .expect("read");
    let prices: Vec<_> = fetched.value.iter().map(|record| record.price).collect();
    assert_eq!(prices, vec![450_000.0, 800_000.0]);

    let again = harness
        .cache
        .get_by_price_range_cached(450_000.0, 800_000.00)
        .await
        .expect("read");
    assert_eq!(again.source, FetchSource::Cache);
}

#[tokio::test]
async fn inverted_price_range_never_reaches_the_repository() {
    let harness = Harness::new(memory_store(), sample_records());

    let err = harness
        .cache
        .get_by_price_range_cached(900_000.0, 100_000.0)
        .await
        .expect_err("inverted range");
    assert!(matches!(err, CacheError::InvalidInput(_)));
    assert_eq!(harness.repo.calls(), 0);
}

#[tokio::test]
async fn missing_listing_is_not_cached() {
    let harness = Harness::new(memory_store(), sample_records());

    let err = harness
        .cache
        .get_by_id_cached(999)
        .await
        .expect_err("missing listing");
    assert!(err.is_not_found());
    assert!(
        harness
            .store
            .get(&keys::entity_key(999))
            .await
            .expect("get")
            .is_none()
    );

    harness.cache.get_by_id_cached(999).await.expect_err("still missing");
    assert_eq!(harness.repo.calls(), 2);
}

#[tokio::test]
async fn detail_entry_uses_entity_key() {
    let harness = Harness::new(memory_store(), sample_records());

    let fetched = harness.cache.get_by_id_cached(2).await.expect("read");
    assert_eq!(fetched.value.id, 2);

    let ttl = harness
        .store
        .ttl("property_2")
        .await
        .expect("ttl")
        .expect("detail entry cached");
    assert!(ttl <= 900);
}

#[tokio::test]
async fn list_view_only_contains_available_listings() {
    let harness = Harness::new(memory_store(), sample_records());

    let fetched = harness.cache.get_list_cached().await.expect("read");
    assert_eq!(fetched.value.len(), 2);
    assert!(fetched.value.iter().all(PropertyRecord::is_available));

    let ttl = harness
        .store
        .ttl(&keys::list_key())
        .await
        .expect("ttl")
        .expect("list view cached");
    assert!(ttl <= 300);
}

#[tokio::test]
async fn unreachable_store_falls_back_to_the_repository() {
    let store = Arc::new(FlakyStore::new());
    store.fail_reads(true);
    store.fail_writes(true);
    let harness = Harness::new(store.clone(), sample_records());

    let first = harness.cache.get_all_cached().await.expect("fallback read");
    assert_eq!(first.source, FetchSource::DirectFallback);
    assert_eq!(first.value.len(), 3);

    let second = harness.cache.get_all_cached().await.expect("fallback read");
    assert_eq!(second.source, FetchSource::DirectFallback);
    assert_eq!(harness.repo.calls(), 2);

    store.fail_reads(false);
    store.fail_writes(false);
    assert!(store.get(&keys::all_key()).await.expect("get").is_none());
}

#[tokio::test]
async fn failed_cache_write_still_returns_data() {
    let store = Arc::new(FlakyStore::new());
    store.fail_writes(true);
    let harness = Harness::new(store.clone(), sample_records());

    let fetched = harness.cache.get_all_cached().await.expect("read");
    assert_eq!(fetched.source, FetchSource::Database);
    assert_eq!(fetched.value.len(), 3);
    assert!(store.get(&keys::all_key()).await.expect("get").is_none());
}

#[tokio::test]
async fn slow_repository_times_out() {
    let table = Arc::new(InMemoryRepositories::with_records(sample_records()));
    let repo = Arc::new(CountingRepo::new(table).with_delay(Duration::from_millis(200)));
    let config = CacheConfig {
        fetch_timeout: Some(Duration::from_millis(20)),
        ..CacheConfig::default()
    };
    let cache = PropertyCache::new(memory_store(), repo, &config);

    let err = cache.get_all_cached().await.expect_err("timeout");
    assert!(matches!(err, CacheError::Repository(RepoError::Timeout)));
    assert!(cache.store().get(&keys::all_key()).await.expect("get").is_none());
}
