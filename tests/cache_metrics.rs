use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    http::{Method, Request, StatusCode},
    middleware,
    routing::get,
};
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use storegate::cache::{
    CacheState, CacheStore, MemoryStore, RouteCacheConfig, StoreError, invalidate_on_write,
    response_cache_layer,
};
use tower::ServiceExt;

struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::backend("connection reset by peer"))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::backend("connection reset by peer"))
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::backend("connection reset by peer"))
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::backend("connection reset by peer"))
    }
}

fn app(state: CacheState) -> Router {
    Router::new()
        .route(
            "/api/products",
            get(|| async { Json(json!({"id": "1"})) }).post(|| async { StatusCode::CREATED }),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            response_cache_layer,
        ))
        .layer(middleware::from_fn_with_state(state, invalidate_on_write))
}

async fn send(app: &Router, method: Method) -> StatusCode {
    let request = Request::builder()
        .method(method)
        .uri("/api/products")
        .body(Body::empty())
        .expect("request should build");
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should stream");
    status
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store = Arc::new(MemoryStore::new());
    let state = CacheState::new(
        RouteCacheConfig::new("products", "products:cache:"),
        store.clone(),
    );
    let products = app(state.clone());

    // miss + write
    assert_eq!(send(&products, Method::GET).await, StatusCode::OK);
    for _ in 0..100 {
        if state.stats.snapshot().writes == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // hit
    assert_eq!(send(&products, Method::GET).await, StatusCode::OK);
    // bypass + invalidation
    assert_eq!(send(&products, Method::POST).await, StatusCode::CREATED);

    // store error on lookup
    let broken = app(CacheState::new(
        RouteCacheConfig::new("inventory", "inventory:cache:"),
        Arc::new(BrokenStore),
    ));
    assert_eq!(send(&broken, Method::GET).await, StatusCode::OK);

    let snapshot = state.stats.snapshot();
    assert_eq!(snapshot.hits, 1);
    assert_eq!(snapshot.misses, 1);
    assert_eq!(snapshot.bypassed, 1);
    assert_eq!(snapshot.writes, 1);
    assert_eq!(snapshot.invalidated, 1);

    let entries = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = entries
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "storegate_cache_hit_total",
        "storegate_cache_miss_total",
        "storegate_cache_bypass_total",
        "storegate_cache_write_total",
        "storegate_cache_store_error_total",
        "storegate_cache_invalidated_total",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let labelled_by_route = entries.iter().any(|(composite_key, _, _, _)| {
        composite_key.key().name() == "storegate_cache_store_error_total"
            && composite_key
                .key()
                .labels()
                .any(|label| label.key() == "cache" && label.value() == "inventory")
    });
    assert!(labelled_by_route, "store errors should carry the route label");
}
