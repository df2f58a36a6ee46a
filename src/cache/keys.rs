//! Cache key definitions.
//!
//! Every query shape maps to exactly one canonical string key. Invalidation works on
//! these strings plus a fixed list of glob patterns.

use std::fmt;

use crate::domain::entities::PropertyId;

const ALL_KEY: &str = "all_properties";
const LIST_KEY: &str = "properties_list";
const LOCATION_PREFIX: &str = "properties_location_";
const PRICE_PREFIX: &str = "properties_price_";
const ENTITY_PREFIX: &str = "property_";
const META_SUFFIX: &str = "_meta";

/// Glob patterns swept whenever any listing changes.
///
/// Range and location entries cannot be matched to a single listing without
/// re-evaluating their predicates, so every one of them is cleared.
pub const INVALIDATION_PATTERNS: [&str; 5] = [
    "all_properties",
    "all_properties_meta",
    "properties_location_*",
    "properties_price_*",
    "property_*",
];

/// Patterns counted when reporting how much listing data is cached.
pub const INSPECTION_PATTERNS: [&str; 3] = ["all_properties*", "property_*", "properties_*"];

/// Patterns removed by a manual full clear.
pub const CLEAR_ALL_PATTERNS: [&str; 2] = ["properties_*", "property_*"];

/// The query shapes served by the read-through cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    All,
    Location,
    PriceRange,
    Detail,
    ListView,
}

impl QueryShape {
    /// Fixed TTL per shape. Broad aggregate queries live longest.
    pub const fn ttl_seconds(self) -> u64 {
        match self {
            QueryShape::All => 3600,
            QueryShape::Location => 1800,
            QueryShape::PriceRange => 900,
            QueryShape::Detail => 900,
            QueryShape::ListView => 300,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            QueryShape::All => "all",
            QueryShape::Location => "location",
            QueryShape::PriceRange => "price_range",
            QueryShape::Detail => "detail",
            QueryShape::ListView => "list_view",
        }
    }
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn all_key() -> String {
    ALL_KEY.to_string()
}

pub fn list_key() -> String {
    LIST_KEY.to_string()
}

/// `properties_location_<normalized>`; lower-cased with whitespace runs replaced by `_`.
pub fn location_key(location: &str) -> String {
    format!("{LOCATION_PREFIX}{}", normalize_location(location))
}

/// `properties_price_<min>_<max>` using the canonical decimal text of each bound.
pub fn price_range_key(min_price: f64, max_price: f64) -> String {
    format!(
        "{PRICE_PREFIX}{}_{}",
        canonical_decimal(min_price),
        canonical_decimal(max_price)
    )
}

pub fn entity_key(id: PropertyId) -> String {
    format!("{ENTITY_PREFIX}{id}")
}

/// Sidecar key holding fetch metadata for `key`.
pub fn meta_key(key: &str) -> String {
    format!("{key}{META_SUFFIX}")
}

fn normalize_location(location: &str) -> String {
    location
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Shortest decimal text that round-trips, so `500000` and `500000.0` agree.
fn canonical_decimal(value: f64) -> String {
    if value == 0.0 {
        // Folds -0.0 into 0.
        return "0".to_string();
    }
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_keys() {
        assert_eq!(all_key(), "all_properties");
        assert_eq!(list_key(), "properties_list");
        assert_eq!(entity_key(42), "property_42");
        assert_eq!(meta_key(&all_key()), "all_properties_meta");
    }

    #[test]
    fn price_range_key_is_stable() {
        let first = price_range_key(0.0, 500_000.0);
        let second = price_range_key(0.0, 500_000.0);
        assert_eq!(first, second);
        assert_eq!(first, "properties_price_0_500000");
    }

    #[test]
    fn price_range_key_canonicalizes_equal_values() {
        assert_eq!(
            price_range_key(-0.0, 500_000.00),
            price_range_key(0.0, 500_000.0)
        );
        assert_eq!(
            price_range_key(99.5, 1_250.25),
            "properties_price_99.5_1250.25"
        );
    }

    #[test]
    fn location_key_is_case_insensitive() {
        assert_eq!(location_key("New York"), location_key("new york"));
        assert_eq!(location_key("New York"), "properties_location_new_york");
    }

    #[test]
    fn location_key_collapses_whitespace() {
        assert_eq!(
            location_key("  Los\tAngeles   CA "),
            "properties_location_los_angeles_ca"
        );
    }

    #[test]
    fn ttl_tiers() {
        assert_eq!(QueryShape::All.ttl_seconds(), 3600);
        assert_eq!(QueryShape::Location.ttl_seconds(), 1800);
        assert_eq!(QueryShape::PriceRange.ttl_seconds(), 900);
        assert_eq!(QueryShape::Detail.ttl_seconds(), 900);
        assert_eq!(QueryShape::ListView.ttl_seconds(), 300);
    }

    #[test]
    fn invalidation_patterns_cover_every_shape_but_the_list_view() {
        assert_eq!(
            INVALIDATION_PATTERNS,
            [
                "all_properties",
                "all_properties_meta",
                "properties_location_*",
                "properties_price_*",
                "property_*",
            ]
        );
    }
}
