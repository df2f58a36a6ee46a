//! Sample listings for local development.
//!
//! Generation is deterministic in the index so repeated runs produce the same data set.

use tracing::{info, warn};

use crate::application::properties::PropertyService;
use crate::application::repos::CreatePropertyParams;
use crate::domain::types::{PropertyStatus, PropertyType};

pub const DEFAULT_SEED_COUNT: usize = 50;

const LOCATIONS: [&str; 10] = [
    "New York, NY",
    "Los Angeles, CA",
    "Chicago, IL",
    "Houston, TX",
    "Miami, FL",
    "Seattle, WA",
    "Boston, MA",
    "Denver, CO",
    "Atlanta, GA",
    "Phoenix, AZ",
];

const NAMES: [&str; 8] = [
    "Maple", "Harbor", "Cedar", "Summit", "Willow", "Granite", "Meadow", "Bayview",
];

const KINDS: [&str; 4] = ["House", "Apartment", "Villa", "Condo"];

/// Status mix skewed towards available listings.
const STATUSES: [PropertyStatus; 5] = [
    PropertyStatus::Available,
    PropertyStatus::Available,
    PropertyStatus::Available,
    PropertyStatus::Sold,
    PropertyStatus::Pending,
];

pub fn sample_listing(index: usize) -> CreatePropertyParams {
    // Spread neighbouring indices across the tables.
    let mix = index.wrapping_mul(7919).wrapping_add(17);
    let title = format!(
        "{} {}",
        NAMES[mix % NAMES.len()],
        KINDS[(mix / 3) % KINDS.len()]
    );
    let location = LOCATIONS[index % LOCATIONS.len()];

    CreatePropertyParams {
        description: format!("{title} in {location}. Sample listing #{}.", index + 1),
        title,
        price: (100_000 + (mix % 18) * 50_000) as f64,
        location: location.to_string(),
        property_type: PropertyType::ALL[mix % PropertyType::ALL.len()],
        bedrooms: 1 + (mix % 5) as i32,
        bathrooms: (10 + mix % 25) as f64 / 10.0,
        square_feet: Some(800 + ((mix % 32) * 100) as i32),
        status: STATUSES[mix % STATUSES.len()],
        has_garage: mix % 2 == 0,
        has_pool: mix % 3 == 0,
        has_garden: mix % 5 < 2,
        is_furnished: mix % 7 < 3,
    }
}

/// Create `count` sample listings; failures are logged and skipped.
pub async fn seed_properties(service: &PropertyService, count: usize) -> usize {
    info!(count, "Creating sample properties");
    let mut created = 0;
    for index in 0..count {
        match service.create(sample_listing(index)).await {
            Ok(_) => {
                created += 1;
                if created % 10 == 0 {
                    info!(created, "Sample properties created so far");
                }
            }
            Err(err) => warn!(index, error = %err, "Failed to create sample property"),
        }
    }
    info!(created, "Sample properties created");
    created
}
