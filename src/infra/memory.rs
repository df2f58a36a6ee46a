//! In-process listing repository.
//!
//! Backs the service when no database URL is configured and doubles as the fixture
//! repository for tests. Each write is staged against a copy of the table and swapped
//! in as its commit; a commit can be forced to fail to exercise rollback.

use std::collections::BTreeMap;
use std::future;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::application::repos::{
    CreatePropertyParams, PropertiesRepo, PropertiesWriteRepo, RepoError, UpdatePropertyParams,
};
use crate::cache::{CommitHooks, CommitListener, MutationAction, PendingMutation};
use crate::domain::entities::{PropertyId, PropertyRecord, generate_reference_number};

#[derive(Debug, Default, Clone)]
struct Table {
    next_id: PropertyId,
    rows: BTreeMap<PropertyId, PropertyRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryRepositories {
    table: Mutex<Table>,
    fail_next_commit: AtomicBool,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing rows; ids continue after the largest one.
    pub fn with_records(records: impl IntoIterator<Item = PropertyRecord>) -> Self {
        let rows: BTreeMap<_, _> = records.into_iter().map(|r| (r.id, r)).collect();
        let next_id = rows.keys().next_back().copied().unwrap_or(0);
        Self {
            table: Mutex::new(Table { next_id, rows }),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    /// Make the next write's commit fail; the staged change is discarded.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Apply `stage` to a copy of the table and swap it in unless the commit is set to fail.
    async fn write<F>(
        &self,
        action: MutationAction,
        listener: &dyn CommitListener,
        stage: F,
    ) -> Result<PropertyRecord, RepoError>
    where
        F: FnOnce(&mut Table, OffsetDateTime) -> Result<PropertyRecord, RepoError>,
    {
        let mut hooks = CommitHooks::new();
        // The lock is released before listeners run.
        let outcome = {
            let mut table = self.table.lock().await;
            let mut staged = table.clone();
            let record = stage(&mut staged, OffsetDateTime::now_utc())?;
            hooks.defer(PendingMutation::for_record(&record, action));

            if self.fail_next_commit.swap(false, Ordering::SeqCst) {
                Err(RepoError::from_persistence("commit failed; transaction rolled back"))
            } else {
                *table = staged;
                Ok(record)
            }
        };

        hooks.commit_then(future::ready(outcome), listener).await
    }
}

fn sorted_newest_first(mut records: Vec<PropertyRecord>) -> Vec<PropertyRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    records
}

#[async_trait]
impl PropertiesRepo for InMemoryRepositories {
    async fn fetch_all(&self) -> Result<Vec<PropertyRecord>, RepoError> {
        let table = self.table.lock().await;
        Ok(sorted_newest_first(table.rows.values().cloned().collect()))
    }

    async fn fetch_by_location(&self, location: &str) -> Result<Vec<PropertyRecord>, RepoError> {
        let needle = location.trim().to_lowercase();
        let table = self.table.lock().await;
        Ok(sorted_newest_first(
            table
                .rows
                .values()
                .filter(|r| r.location.to_lowercase().contains(&needle))
                .cloned()
                .collect(),
        ))
    }

    async fn fetch_by_price_range(
        &self,
        min_price: f64,
        max_price: f64,
    ) -> Result<Vec<PropertyRecord>, RepoError> {
        let table = self.table.lock().await;
        let mut matched: Vec<_> = table
            .rows
            .values()
            .filter(|r| r.price >= min_price && r.price <= max_price)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.price.total_cmp(&b.price).then(a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn fetch_by_id(&self, id: PropertyId) -> Result<Option<PropertyRecord>, RepoError> {
        Ok(self.table.lock().await.rows.get(&id).cloned())
    }

    async fn fetch_available(&self) -> Result<Vec<PropertyRecord>, RepoError> {
        let table = self.table.lock().await;
        Ok(sorted_newest_first(
            table
                .rows
                .values()
                .filter(|r| r.is_available())
                .cloned()
                .collect(),
        ))
    }
}

#[async_trait]
impl PropertiesWriteRepo for InMemoryRepositories {
    async fn create_property(
        &self,
        params: CreatePropertyParams,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError> {
        self.write(MutationAction::Created, listener, |table, now| {
            table.next_id += 1;
            let record = PropertyRecord {
                id: table.next_id,
                reference_number: generate_reference_number(),
                title: params.title,
                description: params.description,
                price: params.price,
                location: params.location,
                property_type: params.property_type,
                bedrooms: params.bedrooms,
                bathrooms: params.bathrooms,
                square_feet: params.square_feet,
                status: params.status,
                has_garage: params.has_garage,
                has_pool: params.has_pool,
                has_garden: params.has_garden,
                is_furnished: params.is_furnished,
                amenities: Vec::new(),
                created_at: now,
                updated_at: now,
                listed_date: now,
            };
            table.rows.insert(record.id, record.clone());
            Ok(record)
        })
        .await
    }

    async fn update_property(
        &self,
        params: UpdatePropertyParams,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError> {
        self.write(MutationAction::Updated, listener, |table, now| {
            let record = table.rows.get_mut(&params.id).ok_or(RepoError::NotFound)?;
            if let Some(title) = params.title {
                record.title = title;
            }
            if let Some(description) = params.description {
                record.description = description;
            }
            if let Some(price) = params.price {
                record.price = price;
            }
            if let Some(location) = params.location {
                record.location = location;
            }
            if let Some(property_type) = params.property_type {
                record.property_type = property_type;
            }
            if let Some(bedrooms) = params.bedrooms {
                record.bedrooms = bedrooms;
            }
            if let Some(bathrooms) = params.bathrooms {
                record.bathrooms = bathrooms;
            }
            if let Some(square_feet) = params.square_feet {
                record.square_feet = square_feet;
            }
            if let Some(status) = params.status {
                record.status = status;
            }
            if let Some(has_garage) = params.has_garage {
                record.has_garage = has_garage;
            }
            if let Some(has_pool) = params.has_pool {
                record.has_pool = has_pool;
            }
            if let Some(has_garden) = params.has_garden {
                record.has_garden = has_garden;
            }
            if let Some(is_furnished) = params.is_furnished {
                record.is_furnished = is_furnished;
            }
            record.updated_at = now;
            Ok(record.clone())
        })
        .await
    }

    async fn delete_property(
        &self,
        id: PropertyId,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError> {
        self.write(MutationAction::Deleted, listener, |table, _| {
            table.rows.remove(&id).ok_or(RepoError::NotFound)
        })
        .await
    }

    async fn replace_amenities(
        &self,
        id: PropertyId,
        amenities: Vec<String>,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError> {
        self.write(MutationAction::RelationChanged, listener, |table, now| {
            let record = table.rows.get_mut(&id).ok_or(RepoError::NotFound)?;
            let mut amenities = amenities;
            amenities.sort();
            record.amenities = amenities;
            record.updated_at = now;
            Ok(record.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::cache::CommittedMutation;
    use crate::domain::types::{PropertyStatus, PropertyType};

    #[derive(Default)]
    struct Recorder {
        seen: StdMutex<Vec<(PropertyId, MutationAction)>>,
    }

    #[async_trait]
    impl CommitListener for Recorder {
        async fn on_committed(&self, mutation: CommittedMutation) {
            self.seen
                .lock()
                .expect("recorder lock")
                .push((mutation.entity_id(), mutation.action()));
        }
    }

    fn params(title: &str, location: &str, price: f64) -> CreatePropertyParams {
        CreatePropertyParams {
            title: title.to_string(),
            description: String::new(),
            price,
            location: location.to_string(),
            property_type: PropertyType::Condo,
            bedrooms: 2,
            bathrooms: 1.0,
            square_feet: Some(900),
            status: PropertyStatus::Available,
            has_garage: false,
            has_pool: false,
            has_garden: false,
            is_furnished: false,
        }
    }

    #[tokio::test]
    async fn writes_notify_after_commit() {
        let repo = InMemoryRepositories::new();
        let recorder = Recorder::default();

        let created = repo
            .create_property(params("Loft", "Austin, TX", 300_000.0), &recorder)
            .await
            .expect("create");
        repo.replace_amenities(created.id, vec!["Pool".into()], &recorder)
            .await
            .expect("amenities");
        repo.delete_property(created.id, &recorder)
            .await
            .expect("delete");

        let seen = recorder.seen.lock().expect("recorder lock").clone();
        assert_eq!(
            seen,
            vec![
                (created.id, MutationAction::Created),
                (created.id, MutationAction::RelationChanged),
                (created.id, MutationAction::Deleted),
            ]
        );
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn failed_commit_discards_change_and_notification() {
        let repo = InMemoryRepositories::new();
        let recorder = Recorder::default();

        repo.fail_next_commit();
        let result = repo
            .create_property(params("Loft", "Austin, TX", 300_000.0), &recorder)
            .await;
        assert!(matches!(result, Err(RepoError::Persistence(_))));
        assert!(repo.is_empty().await);
        assert!(recorder.seen.lock().expect("recorder lock").is_empty());
    }

    #[tokio::test]
    async fn reads_follow_ordering_contract() {
        let repo = InMemoryRepositories::new();
        let recorder = Recorder::default();
        for (title, location, price) in [
            ("A", "Austin, TX", 500_000.0),
            ("B", "Boston, MA", 200_000.0),
            ("C", "austin, tx", 350_000.0),
        ] {
            repo.create_property(params(title, location, price), &recorder)
                .await
                .expect("create");
        }

        let austin = repo.fetch_by_location("AUSTIN").await.expect("location");
        assert_eq!(austin.len(), 2);

        let priced = repo
            .fetch_by_price_range(200_000.0, 350_000.0)
            .await
            .expect("range");
        let titles: Vec<_> = priced.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "C"]);

        let all = repo.fetch_all().await.expect("all");
        assert_eq!(all.first().map(|r| r.title.as_str()), Some("C"));
    }

    #[tokio::test]
    async fn missing_rows_report_not_found() {
        let repo = InMemoryRepositories::new();
        let recorder = Recorder::default();
        let result = repo.delete_property(7, &recorder).await;
        assert!(matches!(result, Err(RepoError::NotFound)));
        assert_eq!(repo.fetch_by_id(7).await.expect("fetch"), None);
    }
}
