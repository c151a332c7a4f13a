//! Router-level tests for the cross-cutting middleware chain. The database
//! pool is lazy and unreachable, so anything that needs Postgres surfaces as
//! a scrubbed 500 envelope; everything under test here resolves before that.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;
use uuid::Uuid;
use verdura::application::catalog::ProductCatalogService;
use verdura::application::orders::OrderService;
use verdura::application::trash::TrashService;
use verdura::cache::{CacheConfig, TieredCache};
use verdura::config::{RateLimitSettings, WindowSettings};
use verdura::infra::db::{PgStore, SoftDeleteStore};
use verdura::infra::http::{ApiState, build_api_router};
use verdura::security::csrf::CsrfGuard;
use verdura::security::rate_limit::{PolicySet, RateLimiter};

const TEST_SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";

fn window(max_requests: u32, window_secs: u64) -> WindowSettings {
    WindowSettings {
        max_requests: NonZeroU32::new(max_requests).expect("non-zero"),
        window: Duration::from_secs(window_secs),
    }
}

fn test_state(api_limit: u32) -> ApiState {
    let pool = PgStore::connect_lazy(
        "postgres://verdura@127.0.0.1:9/verdura",
        Duration::from_millis(200),
    )
    .expect("lazy pool");
    let db = Arc::new(PgStore::new(pool));

    let cache = Arc::new(TieredCache::new(&CacheConfig::default(), None));
    let soft_delete = SoftDeleteStore::new(db.pool_handle());
    let trash = Arc::new(TrashService::new(
        soft_delete.clone(),
        Duration::from_secs(30 * 86_400),
    ));
    let catalog = Arc::new(ProductCatalogService::new(
        db.clone(),
        soft_delete,
        cache.clone(),
    ));
    let orders = Arc::new(OrderService::new(db.clone(), db.clone()));

    let settings = RateLimitSettings {
        auth: window(5, 900),
        api: window(api_limit, 60),
        search: window(30, 10),
    };

    ApiState {
        users: db.clone(),
        farmers: db.clone(),
        subscriptions: db.clone(),
        catalog,
        orders,
        trash,
        csrf: Arc::new(CsrfGuard::new(TEST_SECRET.to_vec(), Duration::from_secs(3600))),
        limiter: Arc::new(RateLimiter::new(cache.clone())),
        policies: Arc::new(PolicySet::from(&settings)),
        db,
        cache,
        started_at: Instant::now(),
    }
}

fn router(api_limit: u32) -> (Router, ApiState) {
    let state = test_state(api_limit);
    (build_api_router(state.clone()), state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn csrf_token_issuance_and_enforcement() {
    let (router, _state) = router(100);

    let response = router
        .clone()
        .oneshot(Request::get("/api/csrf").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    let token = body["data"]["csrf_token"].as_str().expect("token").to_string();

    // A mutation without the token is rejected with the missing-token code.
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/products")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "csrf_token_missing");

    // A garbage token is rejected with the validation-failed code.
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/products")
                .header("x-csrf-token", "garbage")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "csrf_validation_failed");

    // The real token passes the guard; the anonymous caller then fails the
    // role gate, proving the request reached the handler.
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/products")
                .header("x-csrf-token", token)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "farmer_id": Uuid::new_v4(),
                        "name": "Rainbow chard",
                        "slug": "rainbow-chard",
                        "price_cents": 450,
                        "unit": "bunch",
                        "stock": 10,
                        "category": "vegetables"
                    })
                    .to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn version_header_beats_query_parameter() {
    let (router, _state) = router(100);

    let response = router
        .clone()
        .oneshot(
            Request::get("/api/products?version=v2")
                .header("x-api-version", "v1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(
        response
            .headers()
            .get("x-api-version")
            .and_then(|v| v.to_str().ok()),
        Some("v1")
    );
    assert_eq!(
        response
            .headers()
            .get("x-api-current-version")
            .and_then(|v| v.to_str().ok()),
        Some("v2")
    );
}

#[tokio::test]
async fn unsupported_version_is_rejected_with_the_supported_list() {
    let (router, _state) = router(100);

    let response = router
        .clone()
        .oneshot(
            Request::get("/api/products")
                .header("x-api-version", "v9")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "unsupported_api_version");
    assert!(
        body["error"]["details"]
            .as_str()
            .expect("details")
            .contains("v1, v2")
    );
}

#[tokio::test]
async fn v1_callers_get_501_for_v2_only_endpoints() {
    let (router, state) = router(100);

    let admin_id = Uuid::new_v4();
    let token = state.csrf.issue(&admin_id.to_string());

    let response = router
        .clone()
        .oneshot(
            Request::post(format!("/api/orders/{}/status", Uuid::new_v4()))
                .header("x-api-version", "v1")
                .header("x-session-user", admin_id.to_string())
                .header("x-session-role", "admin")
                .header("x-csrf-token", token)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"status":"confirmed"}"#))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "version_not_implemented");
}

#[tokio::test]
async fn rate_limit_headers_and_429_on_exhaustion() {
    let (router, _state) = router(2);

    for expected_remaining in ["1", "0"] {
        let response = router
            .clone()
            .oneshot(Request::get("/api/csrf").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok()),
            Some(expected_remaining)
        );
        assert_eq!(
            response
                .headers()
                .get("x-ratelimit-limit")
                .and_then(|v| v.to_str().ok()),
            Some("2")
        );
    }

    let response = router
        .clone()
        .oneshot(Request::get("/api/csrf").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("Retry-After header");
    assert!(retry_after <= 60);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "rate_limited");
}

#[tokio::test]
async fn health_reports_unhealthy_when_the_database_is_down() {
    let (router, _state) = router(100);

    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "unhealthy");
    assert_eq!(body["data"]["checks"]["database"]["ok"], false);
    // No remote tier configured: the cache serves local-only and is healthy.
    assert_eq!(body["data"]["checks"]["cache"]["healthy"], true);
}

#[tokio::test]
async fn database_failures_surface_as_scrubbed_envelopes() {
    let (router, _state) = router(100);

    let response = router
        .clone()
        .oneshot(Request::get("/api/farmers").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "database_error");
    // Production scrubbing: no connection detail reaches the wire.
    let message = body["error"]["message"].as_str().expect("message");
    assert!(!message.contains("127.0.0.1"));
}
