//! axum JSON API over the property cache and the listing write path.

pub mod error;
mod handlers;
mod middleware;
mod models;

pub use handlers::CACHE_SOURCE_HEADER;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::application::properties::PropertyService;
use crate::cache::PropertyCache;

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub cache: Arc<PropertyCache>,
    pub properties: Arc<PropertyService>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route(
            "/properties",
            get(handlers::list_properties).post(handlers::create_property),
        )
        .route("/properties/available", get(handlers::list_available))
        .route(
            "/properties/location/{location}",
            get(handlers::list_by_location),
        )
        .route("/properties/price", get(handlers::list_by_price))
        .route(
            "/properties/{id}",
            get(handlers::get_property)
                .patch(handlers::update_property)
                .delete(handlers::delete_property),
        )
        .route(
            "/properties/{id}/amenities",
            put(handlers::replace_amenities),
        )
        .route("/cache", axum::routing::delete(handlers::clear_cache))
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/invalidations", get(handlers::invalidation_stats))
        .route("/cache/metrics", get(handlers::cache_metrics))
        .route("/cache/metrics/trend", get(handlers::metrics_trend))
        .route("/cache/metrics/reset", post(handlers::reset_metrics))
        .route("/cache/analysis", get(handlers::cache_analysis))
        .route("/cache/warm", post(handlers::warm_cache))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
