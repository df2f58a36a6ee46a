//! Application layer: repository contracts and listing services.

pub mod error;
pub mod properties;
pub mod repos;
pub mod seed;
