//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::CommitListener;
use crate::domain::entities::{PropertyId, PropertyRecord};
use crate::domain::types::{PropertyStatus, PropertyType};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Read side of the listing store.
///
/// Every method returns a fully materialized collection. Ordering contract:
/// newest first for `fetch_all`, `fetch_by_location` and `fetch_available`,
/// cheapest first for `fetch_by_price_range`.
#[async_trait]
pub trait PropertiesRepo: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<PropertyRecord>, RepoError>;

    /// Case-insensitive substring match on the location column.
    async fn fetch_by_location(&self, location: &str) -> Result<Vec<PropertyRecord>, RepoError>;

    /// Inclusive on both bounds.
    async fn fetch_by_price_range(
        &self,
        min_price: f64,
        max_price: f64,
    ) -> Result<Vec<PropertyRecord>, RepoError>;

    async fn fetch_by_id(&self, id: PropertyId) -> Result<Option<PropertyRecord>, RepoError>;

    /// Listings whose status is `available`.
    async fn fetch_available(&self) -> Result<Vec<PropertyRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreatePropertyParams {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub location: String,
    pub property_type: PropertyType,
    pub bedrooms: i32,
    pub bathrooms: f64,
    pub square_feet: Option<i32>,
    pub status: PropertyStatus,
    pub has_garage: bool,
    pub has_pool: bool,
    pub has_garden: bool,
    pub is_furnished: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePropertyParams {
    pub id: PropertyId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub property_type: Option<PropertyType>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<Option<i32>>,
    pub status: Option<PropertyStatus>,
    pub has_garage: Option<bool>,
    pub has_pool: Option<bool>,
    pub has_garden: Option<bool>,
    pub is_furnished: Option<bool>,
}

/// Write side of the listing store.
///
/// Each call runs in its own transaction. `listener` is notified strictly after the
/// transaction commits and never when it rolls back.
#[async_trait]
pub trait PropertiesWriteRepo: Send + Sync {
    async fn create_property(
        &self,
        params: CreatePropertyParams,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError>;

    async fn update_property(
        &self,
        params: UpdatePropertyParams,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError>;

    async fn delete_property(
        &self,
        id: PropertyId,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError>;

    /// Replace the amenity set of a listing (a relation change).
    async fn replace_amenities(
        &self,
        id: PropertyId,
        amenities: Vec<String>,
        listener: &dyn CommitListener,
    ) -> Result<PropertyRecord, RepoError>;
}
