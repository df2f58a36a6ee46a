//! Casale: property listings served through a read-through cache with commit-driven
//! invalidation and hit-ratio analysis.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
