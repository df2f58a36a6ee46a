//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{PropertyStatus, PropertyType};

/// Database-assigned identity of a listing.
pub type PropertyId = i64;

const SHORT_DESCRIPTION_LIMIT: usize = 100;
const REFERENCE_PREFIX: &str = "PROP";

/// A property listing as persisted by the repository.
///
/// The cache layer treats everything except `id` and `updated_at` as opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: PropertyId,
    pub reference_number: String,
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
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub listed_date: OffsetDateTime,
}

impl PropertyRecord {
    pub fn price_per_sqft(&self) -> Option<f64> {
        match self.square_feet {
            Some(sqft) if sqft > 0 => Some(self.price / f64::from(sqft)),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == PropertyStatus::Available
    }

    /// Description truncated to 100 characters with a trailing ellipsis.
    pub fn short_description(&self) -> String {
        if self.description.chars().count() > SHORT_DESCRIPTION_LIMIT {
            let truncated: String = self
                .description
                .chars()
                .take(SHORT_DESCRIPTION_LIMIT)
                .collect();
            format!("{truncated}...")
        } else {
            self.description.clone()
        }
    }

    /// Label used in invalidation logs.
    pub fn label(&self) -> String {
        format!("{} - {}", self.title, self.location)
    }
}

/// Generate a `PROP-XXXXXXXX` reference number.
pub fn generate_reference_number() -> String {
    let unique = Uuid::new_v4().simple().to_string();
    format!("{REFERENCE_PREFIX}-{}", unique[..8].to_uppercase())
}

/// Listing prices never go below zero.
pub fn normalize_price(price: f64) -> f64 {
    if price < 0.0 { 0.0 } else { price }
}
