#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

use casale::application::properties::PropertyService;
use casale::application::repos::{PropertiesRepo, RepoError};
use casale::cache::{CacheConfig, CacheStore, MemoryStore, PropertyCache, StoreError, StoreInfo};
use casale::domain::entities::{PropertyId, PropertyRecord};
use casale::domain::types::{PropertyStatus, PropertyType};
use casale::infra::memory::InMemoryRepositories;

pub fn sample_record(id: PropertyId, location: &str, price: f64) -> PropertyRecord {
    let created_at = OffsetDateTime::UNIX_EPOCH + time::Duration::days(id);
    PropertyRecord {
        id,
        reference_number: format!("PROP-{id:08}"),
        title: format!("Listing {id}"),
        description: "Bright corner unit close to transit.".to_string(),
        price,
        location: location.to_string(),
        property_type: PropertyType::Apartment,
        bedrooms: 2,
        bathrooms: 1.5,
        square_feet: Some(900),
        status: PropertyStatus::Available,
        has_garage: false,
        has_pool: false,
        has_garden: false,
        is_furnished: true,
        amenities: Vec::new(),
        created_at,
        updated_at: created_at,
        listed_date: created_at,
    }
}

/// Three listings in two cities, one of them already sold.
pub fn sample_records() -> Vec<PropertyRecord> {
    let mut sold = sample_record(3, "Chicago, IL", 1_200_000.0);
    sold.status = PropertyStatus::Sold;
    vec![
        sample_record(1, "New York, NY", 450_000.0),
        sample_record(2, "New York, NY", 800_000.0),
        sold,
    ]
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(
        NonZeroUsize::new(1_000).expect("non-zero capacity"),
    ))
}

/// Repository double that counts how often each query reaches it.
pub struct CountingRepo {
    inner: Arc<InMemoryRepositories>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingRepo {
    pub fn new(inner: Arc<InMemoryRepositories>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PropertiesRepo for CountingRepo {
    async fn fetch_all(&self) -> Result<Vec<PropertyRecord>, RepoError> {
        self.enter().await;
        self.inner.fetch_all().await
    }

    async fn fetch_by_location(&self, location: &str) -> Result<Vec<PropertyRecord>, RepoError> {
        self.enter().await;
        self.inner.fetch_by_location(location).await
    }

    async fn fetch_by_price_range(
        &self,
        min_price: f64,
        max_price: f64,
    ) -> Result<Vec<PropertyRecord>, RepoError> {
        self.enter().await;
        self.inner.fetch_by_price_range(min_price, max_price).await
    }

    async fn fetch_by_id(&self, id: PropertyId) -> Result<Option<PropertyRecord>, RepoError> {
        self.enter().await;
        self.inner.fetch_by_id(id).await
    }

    async fn fetch_available(&self) -> Result<Vec<PropertyRecord>, RepoError> {
        self.enter().await;
        self.inner.fetch_available().await
    }
}

/// Memory store whose reads or writes can be switched to fail as if the server went away.
/// Records the key of every `set` it accepts.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    set_keys: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(NonZeroUsize::new(1_000).expect("non-zero capacity")),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            set_keys: Mutex::new(Vec::new()),
        }
    }

    pub fn set_keys(&self) -> Vec<String> {
        self.set_keys.lock().expect("set log").clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.check(&self.fail_reads)?;
        self.inner.get(key).await
    }

    async fn peek(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.check(&self.fail_reads)?;
        self.inner.peek(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check(&self.fail_writes)?;
        self.set_keys.lock().expect("set log").push(key.to_string());
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check(&self.fail_writes)?;
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.check(&self.fail_writes)?;
        self.inner.delete_many(keys).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check(&self.fail_reads)?;
        self.inner.keys(pattern).await
    }

    fn supports_patterns(&self) -> bool {
        self.inner.supports_patterns()
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.check(&self.fail_reads)?;
        self.inner.ttl(key).await
    }

    async fn incr_counter(&self, name: &str) -> Result<i64, StoreError> {
        self.check(&self.fail_writes)?;
        self.inner.incr_counter(name).await
    }

    async fn push_bounded(
        &self,
        key: &str,
        value: Bytes,
        capacity: usize,
    ) -> Result<(), StoreError> {
        self.check(&self.fail_writes)?;
        self.inner.push_bounded(key, value, capacity).await
    }

    async fn list(&self, key: &str) -> Result<Vec<Bytes>, StoreError> {
        self.check(&self.fail_reads)?;
        self.inner.list(key).await
    }

    async fn info(&self) -> Result<StoreInfo, StoreError> {
        self.check(&self.fail_reads)?;
        self.inner.info().await
    }

    async fn reset_stats(&self) -> Result<(), StoreError> {
        self.check(&self.fail_writes)?;
        self.inner.reset_stats().await
    }
}

/// A cache plus write service over an in-memory table.
pub struct Harness {
    pub store: Arc<dyn CacheStore>,
    pub table: Arc<InMemoryRepositories>,
    pub repo: Arc<CountingRepo>,
    pub cache: Arc<PropertyCache>,
    pub properties: Arc<PropertyService>,
}

impl Harness {
    pub fn new(store: Arc<dyn CacheStore>, records: Vec<PropertyRecord>) -> Self {
        Self::with_config(store, records, CacheConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn CacheStore>,
        records: Vec<PropertyRecord>,
        config: CacheConfig,
    ) -> Self {
        let table = Arc::new(InMemoryRepositories::with_records(records));
        let repo = Arc::new(CountingRepo::new(Arc::clone(&table)));
        let cache = Arc::new(PropertyCache::new(
            Arc::clone(&store),
            repo.clone(),
            &config,
        ));
        let properties = Arc::new(PropertyService::new(table.clone(), Arc::clone(&cache)));
        Self {
            store,
            table,
            repo,
            cache,
            properties,
        }
    }
}
