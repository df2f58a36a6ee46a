use serde::{Deserialize, Deserializer, Serialize};

use crate::application::repos::{CreatePropertyParams, UpdatePropertyParams};
use crate::domain::entities::PropertyId;
use crate::domain::types::{PropertyStatus, PropertyType};

#[derive(Debug, Deserialize)]
pub struct PropertyCreateRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub location: String,
    #[serde(default)]
    pub property_type: PropertyType,
    #[serde(default = "default_bedrooms")]
    pub bedrooms: i32,
    #[serde(default = "default_bathrooms")]
    pub bathrooms: f64,
    #[serde(default)]
    pub square_feet: Option<i32>,
    #[serde(default)]
    pub status: PropertyStatus,
    #[serde(default)]
    pub has_garage: bool,
    #[serde(default)]
    pub has_pool: bool,
    #[serde(default)]
    pub has_garden: bool,
    #[serde(default)]
    pub is_furnished: bool,
}

fn default_bedrooms() -> i32 {
    1
}

fn default_bathrooms() -> f64 {
    1.0
}

impl From<PropertyCreateRequest> for CreatePropertyParams {
    fn from(request: PropertyCreateRequest) -> Self {
        Self {
            title: request.title,
            description: request.description,
            price: request.price,
            location: request.location,
            property_type: request.property_type,
            bedrooms: request.bedrooms,
            bathrooms: request.bathrooms,
            square_feet: request.square_feet,
            status: request.status,
            has_garage: request.has_garage,
            has_pool: request.has_pool,
            has_garden: request.has_garden,
            is_furnished: request.is_furnished,
        }
    }
}

/// Partial update; absent fields stay unchanged and `"square_feet": null` clears the area.
#[derive(Debug, Default, Deserialize)]
pub struct PropertyUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub property_type: Option<PropertyType>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub square_feet: Option<Option<i32>>,
    pub status: Option<PropertyStatus>,
    pub has_garage: Option<bool>,
    pub has_pool: Option<bool>,
    pub has_garden: Option<bool>,
    pub is_furnished: Option<bool>,
}

fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl PropertyUpdateRequest {
    pub fn into_params(self, id: PropertyId) -> UpdatePropertyParams {
        UpdatePropertyParams {
            id,
            title: self.title,
            description: self.description,
            price: self.price,
            location: self.location,
            property_type: self.property_type,
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            square_feet: self.square_feet,
            status: self.status,
            has_garage: self.has_garage,
            has_pool: self.has_pool,
            has_garden: self.has_garden,
            is_furnished: self.is_furnished,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AmenitiesRequest {
    pub amenities: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriceRangeQuery {
    #[serde(alias = "min")]
    pub min_price: Option<f64>,
    #[serde(alias = "max")]
    pub max_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cache_backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
