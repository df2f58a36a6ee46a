//! Listing write path.
//!
//! Validates and normalizes input, then hands the write to the repository with the
//! property cache registered as commit listener.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::application::repos::{
    CreatePropertyParams, PropertiesWriteRepo, RepoError, UpdatePropertyParams,
};
use crate::cache::PropertyCache;
use crate::domain::entities::{PropertyId, PropertyRecord, normalize_price};
use crate::domain::error::DomainError;

const TITLE_MAX_LEN: usize = 200;
const LOCATION_MAX_LEN: usize = 100;
const BATHROOMS_MAX: f64 = 99.9;

#[derive(Debug, Error)]
pub enum PropertyWriteError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct PropertyService {
    writer: Arc<dyn PropertiesWriteRepo>,
    cache: Arc<PropertyCache>,
}

impl PropertyService {
    pub fn new(writer: Arc<dyn PropertiesWriteRepo>, cache: Arc<PropertyCache>) -> Self {
        Self { writer, cache }
    }

    #[instrument(skip(self, params), fields(location = %params.location))]
    pub async fn create(
        &self,
        mut params: CreatePropertyParams,
    ) -> Result<PropertyRecord, PropertyWriteError> {
        params.title = validate_title(&params.title)?;
        params.location = validate_location(&params.location)?;
        validate_rooms(params.bedrooms, params.bathrooms)?;
        validate_square_feet(params.square_feet)?;
        params.price = validate_price(params.price)?;

        let record = self
            .writer
            .create_property(params, self.cache.as_ref())
            .await?;
        info!(id = record.id, reference = %record.reference_number, "Property created");
        Ok(record)
    }

    #[instrument(skip(self, params), fields(id = params.id))]
    pub async fn update(
        &self,
        mut params: UpdatePropertyParams,
    ) -> Result<PropertyRecord, PropertyWriteError> {
        if let Some(title) = params.title.as_deref() {
            params.title = Some(validate_title(title)?);
        }
        if let Some(location) = params.location.as_deref() {
            params.location = Some(validate_location(location)?);
        }
        if let Some(price) = params.price {
            params.price = Some(validate_price(price)?);
        }
        validate_rooms(params.bedrooms.unwrap_or(0), params.bathrooms.unwrap_or(0.0))?;
        if let Some(square_feet) = params.square_feet {
            validate_square_feet(square_feet)?;
        }

        let record = self
            .writer
            .update_property(params, self.cache.as_ref())
            .await?;
        info!(id = record.id, "Property updated");
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: PropertyId) -> Result<PropertyRecord, PropertyWriteError> {
        let record = self
            .writer
            .delete_property(id, self.cache.as_ref())
            .await?;
        info!(id, "Property deleted");
        Ok(record)
    }

    /// Replace amenities; blank entries are dropped and duplicates collapsed.
    #[instrument(skip(self, amenities))]
    pub async fn replace_amenities(
        &self,
        id: PropertyId,
        amenities: Vec<String>,
    ) -> Result<PropertyRecord, PropertyWriteError> {
        let amenities = normalize_amenities(amenities);
        let record = self
            .writer
            .replace_amenities(id, amenities, self.cache.as_ref())
            .await?;
        info!(id, amenities = record.amenities.len(), "Property amenities replaced");
        Ok(record)
    }
}

fn validate_title(title: &str) -> Result<String, DomainError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title must not be empty"));
    }
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(DomainError::validation(format!(
            "title must be at most {TITLE_MAX_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

fn validate_location(location: &str) -> Result<String, DomainError> {
    let location = location.trim();
    if location.is_empty() {
        return Err(DomainError::validation("location must not be empty"));
    }
    if location.chars().count() > LOCATION_MAX_LEN {
        return Err(DomainError::validation(format!(
            "location must be at most {LOCATION_MAX_LEN} characters"
        )));
    }
    Ok(location.to_string())
}

fn validate_price(price: f64) -> Result<f64, DomainError> {
    if !price.is_finite() {
        return Err(DomainError::validation("price must be a finite number"));
    }
    Ok(normalize_price(price))
}

fn validate_rooms(bedrooms: i32, bathrooms: f64) -> Result<(), DomainError> {
    if bedrooms < 0 {
        return Err(DomainError::validation("bedrooms must not be negative"));
    }
    if !bathrooms.is_finite() || !(0.0..=BATHROOMS_MAX).contains(&bathrooms) {
        return Err(DomainError::validation(format!(
            "bathrooms must be between 0 and {BATHROOMS_MAX}"
        )));
    }
    Ok(())
}

fn validate_square_feet(square_feet: Option<i32>) -> Result<(), DomainError> {
    match square_feet {
        Some(value) if value < 0 => Err(DomainError::validation(
            "square_feet must not be negative",
        )),
        _ => Ok(()),
    }
}

fn normalize_amenities(amenities: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(amenities.len());
    for amenity in amenities {
        let amenity = amenity.trim();
        if amenity.is_empty() || out.iter().any(|seen| seen.eq_ignore_ascii_case(amenity)) {
            continue;
        }
        out.push(amenity.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_price_is_clamped() {
        assert_eq!(validate_price(-5.0).expect("valid"), 0.0);
        assert!(validate_price(f64::NAN).is_err());
    }

    #[test]
    fn title_is_trimmed_and_required() {
        assert_eq!(validate_title("  Loft ").expect("valid"), "Loft");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }

    #[test]
    fn rooms_reject_negative_values() {
        assert!(validate_rooms(-1, 1.0).is_err());
        assert!(validate_rooms(2, -0.5).is_err());
        assert!(validate_rooms(0, 0.0).is_ok());
    }

    #[test]
    fn amenities_drop_blanks_and_duplicates() {
        let normalized = normalize_amenities(vec![
            "Pool".to_string(),
            " ".to_string(),
            "pool".to_string(),
            " Gym ".to_string(),
        ]);
        assert_eq!(normalized, vec!["Pool", "Gym"]);
    }
}
