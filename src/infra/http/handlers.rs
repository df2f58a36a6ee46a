//! JSON handlers for listing reads, writes and cache operations.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::cache::Fetched;
use crate::domain::entities::PropertyId;

use super::HttpState;
use super::error::ApiError;
use super::models::{
    AmenitiesRequest, ClearQuery, ClearResponse, HealthResponse, PriceRangeQuery,
    PropertyCreateRequest, PropertyUpdateRequest,
};

/// Reports whether a body came from the cache, the repository, or a direct fallback.
pub const CACHE_SOURCE_HEADER: HeaderName = HeaderName::from_static("x-cache-source");

/// Serve the stored payload as-is instead of re-encoding the value.
fn cached_json<T>(fetched: Fetched<T>) -> Response {
    let mut response = (
        [(header::CONTENT_TYPE, "application/json")],
        fetched.payload,
    )
        .into_response();
    response.headers_mut().insert(
        CACHE_SOURCE_HEADER,
        HeaderValue::from_static(fetched.source.as_str()),
    );
    response
}

pub async fn list_properties(State(state): State<HttpState>) -> Result<Response, ApiError> {
    let fetched = state.cache.get_all_cached().await?;
    Ok(cached_json(fetched))
}

pub async fn list_available(State(state): State<HttpState>) -> Result<Response, ApiError> {
    let fetched = state.cache.get_list_cached().await?;
    Ok(cached_json(fetched))
}

pub async fn list_by_location(
    State(state): State<HttpState>,
    Path(location): Path<String>,
) -> Result<Response, ApiError> {
    let fetched = state.cache.get_by_location_cached(&location).await?;
    Ok(cached_json(fetched))
}

pub async fn list_by_price(
    State(state): State<HttpState>,
    Query(query): Query<PriceRangeQuery>,
) -> Result<Response, ApiError> {
    let (Some(min_price), Some(max_price)) = (query.min_price, query.max_price) else {
        return Err(ApiError::bad_request(
            "min_price and max_price are required",
            None,
        ));
    };
    let fetched = state
        .cache
        .get_by_price_range_cached(min_price, max_price)
        .await?;
    Ok(cached_json(fetched))
}

pub async fn get_property(
    State(state): State<HttpState>,
    Path(id): Path<PropertyId>,
) -> Result<Response, ApiError> {
    let fetched = state.cache.get_by_id_cached(id).await?;
    Ok(cached_json(fetched))
}

pub async fn create_property(
    State(state): State<HttpState>,
    Json(payload): Json<PropertyCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.properties.create(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_property(
    State(state): State<HttpState>,
    Path(id): Path<PropertyId>,
    Json(payload): Json<PropertyUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.properties.update(payload.into_params(id)).await?;
    Ok(Json(record))
}

pub async fn delete_property(
    State(state): State<HttpState>,
    Path(id): Path<PropertyId>,
) -> Result<impl IntoResponse, ApiError> {
    state.properties.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn replace_amenities(
    State(state): State<HttpState>,
    Path(id): Path<PropertyId>,
    Json(payload): Json<AmenitiesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .properties
        .replace_amenities(id, payload.amenities)
        .await?;
    Ok(Json(record))
}

pub async fn cache_stats(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.cache.cache_stats().await?))
}

pub async fn invalidation_stats(
    State(state): State<HttpState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.cache.invalidation_stats().await?))
}

pub async fn cache_metrics(State(state): State<HttpState>) -> impl IntoResponse {
    let metrics = state.cache.collect_metrics().await;
    let status = if metrics.is_success() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(metrics))
}

pub async fn metrics_trend(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.cache.metrics_trend().await)
}

pub async fn cache_analysis(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.cache.analysis().await)
}

pub async fn reset_metrics(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.cache.reset_metrics().await)
}

pub async fn warm_cache(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.cache.warm().await?))
}

pub async fn clear_cache(
    State(state): State<HttpState>,
    Query(query): Query<ClearQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = match query.pattern.as_deref() {
        Some(pattern) => state.cache.clear_pattern(pattern).await?,
        None => state.cache.clear_all().await?,
    };
    Ok(Json(ClearResponse {
        removed,
        pattern: query.pattern,
    }))
}

pub async fn health(State(state): State<HttpState>) -> Response {
    match state.cache.store().info().await {
        Ok(info) => Json(HealthResponse {
            status: "ok",
            cache_backend: info.backend,
            detail: None,
        })
        .into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded",
                cache_backend: "unreachable".to_string(),
                detail: Some(err.to_string()),
            }),
        )
            .into_response(),
    }
}
