mod common;

use std::num::NonZeroUsize;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use casale::cache::{CacheStore, MemoryStore};
use casale::infra::http::{CACHE_SOURCE_HEADER, HttpState, build_router};

use common::{FlakyStore, Harness, memory_store, sample_records};

fn router_for(harness: &Harness) -> Router {
    build_router(HttpState {
        cache: Arc::clone(&harness.cache),
        properties: Arc::clone(&harness.properties),
    })
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn json_body(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be json")
}

fn cache_source(response: &Response) -> &str {
    response
        .headers()
        .get(&CACHE_SOURCE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn listing_reads_report_their_source() {
    let harness = Harness::new(memory_store(), sample_records());
    let router = router_for(&harness);

    let first = send(&router, Method::GET, "/properties", None).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(cache_source(&first), "database");
    assert_eq!(
        first.headers().get(CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(&b"application/json"[..])
    );
    let listings = json_body(first).await;
    assert_eq!(listings.as_array().map(Vec::len), Some(3));

    let second = send(&router, Method::GET, "/properties", None).await;
    assert_eq!(cache_source(&second), "cache");
    assert_eq!(json_body(second).await, listings);
}

#[tokio::test]
async fn filtered_reads() {
    let harness = Harness::new(memory_store(), sample_records());
    let router = router_for(&harness);

    let available = send(&router, Method::GET, "/properties/available", None).await;
    assert_eq!(available.status(), StatusCode::OK);
    assert_eq!(json_body(available).await.as_array().map(Vec::len), Some(2));

    let location = send(&router, Method::GET, "/properties/location/Chicago", None).await;
    assert_eq!(location.status(), StatusCode::OK);
    let body = json_body(location).await;
    assert_eq!(body[0]["location"], "Chicago, IL");

    let price = send(
        &router,
        Method::GET,
        "/properties/price?min_price=400000&max_price=900000",
        None,
    )
    .await;
    assert_eq!(price.status(), StatusCode::OK);
    let body = json_body(price).await;
    assert_eq!(body[0]["price"], 450_000.0);
    assert_eq!(body[1]["price"], 800_000.0);

    let detail = send(&router, Method::GET, "/properties/2", None).await;
    assert_eq!(detail.status(), StatusCode::OK);
    assert_eq!(json_body(detail).await["id"], 2);
}

#[tokio::test]
async fn bad_price_queries_are_rejected() {
    let harness = Harness::new(memory_store(), sample_records());
    let router = router_for(&harness);

    let missing = send(&router, Method::GET, "/properties/price?min_price=1", None).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(missing).await["error"]["code"], "bad_request");

    let inverted = send(
        &router,
        Method::GET,
        "/properties/price?min=500&max=100",
        None,
    )
    .await;
    assert_eq!(inverted.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.repo.calls(), 0);
}

#[tokio::test]
async fn unknown_listing_is_404() {
    let harness = Harness::new(memory_store(), sample_records());
    let router = router_for(&harness);

    let response = send(&router, Method::GET, "/properties/999", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "not_found");
}

#[tokio::test]
async fn writes_invalidate_cached_listings() {
    let harness = Harness::new(memory_store(), sample_records());
    let router = router_for(&harness);
    send(&router, Method::GET, "/properties", None).await;

    let created = send(
        &router,
        Method::POST,
        "/properties",
        Some(json!({
            "title": "Harbor view condo",
            "price": 615000,
            "location": "Seattle, WA",
            "property_type": "condo",
            "bedrooms": 2,
            "bathrooms": 2.0
        })),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = json_body(created).await;
    assert_eq!(created["id"], 4);
    assert!(
        created["reference_number"]
            .as_str()
            .is_some_and(|reference| reference.starts_with("PROP-"))
    );

    let listings = send(&router, Method::GET, "/properties", None).await;
    assert_eq!(cache_source(&listings), "database");
    assert_eq!(json_body(listings).await.as_array().map(Vec::len), Some(4));

    let patched = send(
        &router,
        Method::PATCH,
        "/properties/4",
        Some(json!({ "square_feet": null, "price": 599000 })),
    )
    .await;
    assert_eq!(patched.status(), StatusCode::OK);
    let patched = json_body(patched).await;
    assert_eq!(patched["square_feet"], Value::Null);
    assert_eq!(patched["price"], 599_000.0);

    let amenities = send(
        &router,
        Method::PUT,
        "/properties/4/amenities",
        Some(json!({ "amenities": ["Gym", " gym ", "Roof deck"] })),
    )
    .await;
    assert_eq!(amenities.status(), StatusCode::OK);
    assert_eq!(
        json_body(amenities).await["amenities"],
        json!(["Gym", "Roof deck"])
    );

    let deleted = send(&router, Method::DELETE, "/properties/4", None).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let gone = send(&router, Method::GET, "/properties/4", None).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    let stats = send(&router, Method::GET, "/cache/invalidations", None).await;
    assert_eq!(stats.status(), StatusCode::OK);
    let stats = json_body(stats).await;
    assert_eq!(stats["total_invalidations"], 4);
    assert_eq!(stats["last_invalidation"]["action"], "deleted");
}

#[tokio::test]
async fn invalid_listing_is_rejected_without_invalidation() {
    let harness = Harness::new(memory_store(), sample_records());
    let router = router_for(&harness);

    let response = send(
        &router,
        Method::POST,
        "/properties",
        Some(json!({ "title": "   ", "price": 100, "location": "Austin, TX" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let stats = json_body(send(&router, Method::GET, "/cache/invalidations", None).await).await;
    assert_eq!(stats["total_invalidations"], 0);
}

#[tokio::test]
async fn cache_operations() {
    let harness = Harness::new(memory_store(), sample_records());
    let router = router_for(&harness);

    let warmed = send(&router, Method::POST, "/cache/warm", None).await;
    assert_eq!(warmed.status(), StatusCode::OK);
    assert_eq!(json_body(warmed).await["loaded"], 9);

    let stats = json_body(send(&router, Method::GET, "/cache/stats", None).await).await;
    assert_eq!(stats["all_properties"]["cached"], true);
    assert_eq!(stats["all_properties"]["metadata"]["row_count"], 3);
    assert_eq!(stats["list_view"]["cached"], false);

    let metrics = send(&router, Method::GET, "/cache/metrics", None).await;
    assert_eq!(metrics.status(), StatusCode::OK);
    assert_eq!(json_body(metrics).await["status"], "success");

    let trend = json_body(send(&router, Method::GET, "/cache/metrics/trend", None).await).await;
    assert_eq!(trend["status"], "insufficient_data");

    let analysis = json_body(send(&router, Method::GET, "/cache/analysis", None).await).await;
    assert_eq!(analysis["property_cache_info"]["main_cache_exists"], true);

    let cleared = send(
        &router,
        Method::DELETE,
        "/cache?pattern=properties_location_*",
        None,
    )
    .await;
    assert_eq!(cleared.status(), StatusCode::OK);
    let cleared = json_body(cleared).await;
    assert_eq!(cleared["removed"], 10);
    assert_eq!(cleared["pattern"], "properties_location_*");

    let cleared_all = json_body(send(&router, Method::DELETE, "/cache", None).await).await;
    assert!(cleared_all["removed"].as_u64().is_some_and(|removed| removed > 0));
    assert!(
        harness
            .store
            .ttl("all_properties")
            .await
            .expect("ttl")
            .is_none()
    );

    let reset = send(&router, Method::POST, "/cache/metrics/reset", None).await;
    assert_eq!(json_body(reset).await["status"], "success");
}

#[tokio::test]
async fn pattern_clear_without_enumeration_is_501() {
    let store = Arc::new(
        MemoryStore::new(NonZeroUsize::new(100).expect("non-zero")).without_pattern_support(),
    );
    let harness = Harness::new(store, sample_records());
    let router = router_for(&harness);

    let response = send(&router, Method::DELETE, "/cache?pattern=property_*", None).await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(
        json_body(response).await["error"]["code"],
        "pattern_sweep_unsupported"
    );
}

#[tokio::test]
async fn health_reflects_store_reachability() {
    let healthy = Harness::new(memory_store(), sample_records());
    let response = send(&router_for(&healthy), Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache_backend"], "memory");

    let store = Arc::new(FlakyStore::new());
    store.fail_reads(true);
    let broken = Harness::new(store, sample_records());
    let router = router_for(&broken);

    let response = send(&router, Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["status"], "degraded");

    let listings = send(&router, Method::GET, "/properties", None).await;
    assert_eq!(listings.status(), StatusCode::OK);
    assert_eq!(cache_source(&listings), "direct_fallback");

    let metrics = send(&router, Method::GET, "/cache/metrics", None).await;
    assert_eq!(metrics.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(metrics).await["status"], "error");
}
