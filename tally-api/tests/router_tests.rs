//! In-process tests of the HTTP surface.
//!
//! Drives the full axum `Router` with `tower::ServiceExt::oneshot` against a
//! broker rooted in a temporary directory.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tally_api::{create_router, ApiConfig, AppState, CidrTable, GeoIpLookup, NoGeoIp};
use tally_test_utils::fixtures::{store, TempBroker};
use tally_test_utils::BrokerConfig;
use tower::ServiceExt;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

struct TestApp {
    router: Router,
    fixture: TempBroker,
}

impl TestApp {
    fn new() -> Self {
        Self::with(BrokerConfig::default(), Arc::new(NoGeoIp))
    }

    fn with(config: BrokerConfig, geoip: Arc<dyn GeoIpLookup>) -> Self {
        let fixture = TempBroker::with_config(config, 1024);
        let state = AppState::new(Arc::clone(&fixture.broker), geoip);
        let router = create_router(state, &ApiConfig::default());
        Self { router, fixture }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .expect("request should build");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        (status, bytes.to_vec())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let (status, bytes) = self.send(Method::GET, uri, None).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn post(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        let (status, bytes) = self
            .send(Method::POST, uri, Some(&body.to_string()))
            .await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

fn pageview(time: &str, ip: &str) -> Value {
    json!({
        "time": time,
        "event": "pageview",
        "path": "/a",
        "ip": ip,
        "headers": {
            "user-agent": "Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0",
            "referer": "https://news.ycombinator.com/item?id=1"
        }
    })
}

// ============================================================================
// SERVICE ROUTES
// ============================================================================

#[tokio::test]
async fn test_welcome() {
    let app = TestApp::new();
    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Welcome to analytics !");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = TestApp::new();
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["open_stores"], 0);
    assert_eq!(body["cache"]["capacity"], 1024);

    let (status, bytes) = app.send(Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&bytes).contains("tally_http_requests_total"));
}

// ============================================================================
// VALIDATION
// ============================================================================

#[tokio::test]
async fn test_missing_store_is_404() {
    let app = TestApp::new();
    let (status, body) = app.get("/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "STORE_NOT_FOUND");
}

#[tokio::test]
async fn test_unsupported_property_fails_without_opening_store() {
    let app = TestApp::new();
    let (status, body) = app.get("/S/unsupported_property").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PROPERTY");
    assert_eq!(app.fixture.broker.registry().open_count(), 0);
    assert_eq!(app.fixture.broker.held_names(), 0);
}

#[tokio::test]
async fn test_parameter_errors() {
    let app = TestApp::new();
    let cases = [
        ("/site?start=yesterday", "INVALID_TIME_FORMAT"),
        (
            "/site?start=2024-01-01T00:00:00Z&end=2023-01-01T00:00:00Z",
            "INVALID_TIME_RANGE",
        ),
        ("/site/time?interval=0", "INVALID_INTERVAL"),
        ("/site/time?interval=hourly", "INVALID_INTERVAL"),
        (
            "/site/time?interval=1&start=2000-01-01T00:00:00Z&end=2024-01-01T00:00:00Z",
            "INVALID_INTERVAL",
        ),
        ("/.hidden", "INVALID_STORE_NAME"),
    ];
    for (uri, code) in cases {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {uri}");
        assert_eq!(body["code"], code, "uri {uri}");
    }
    assert_eq!(app.fixture.broker.registry().open_count(), 0);
}

#[tokio::test]
async fn test_undecodable_parameters_use_error_body() {
    let app = TestApp::new();
    for uri in ["/site?start=&start=", "/site/events?unique=a&unique=b", "/%FF"] {
        let (status, bytes) = app.send(Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {uri}");
        let body: Value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| panic!("uri {uri} answered a non-JSON body"));
        assert_eq!(body["code"], "INVALID_PARAMETER", "uri {uri}");
        assert!(body["message"].is_string());
    }
    assert_eq!(app.fixture.broker.registry().open_count(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_rejected_without_creating_store() {
    let app = TestApp::new();
    let (status, bytes) = app.send(Method::POST, "/site", Some("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "INVALID_JSON");
    assert!(!app.fixture.broker.exists(&store("site")).unwrap());

    let (status, body) = app
        .post("/site", &json!({"time": "not-a-time", "event": "pageview"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TIME_FORMAT");
}

// ============================================================================
// INGEST AND QUERY
// ============================================================================

#[tokio::test]
async fn test_insert_then_query_all_views() {
    let app = TestApp::new();
    let (status, body) = app
        .post("/site", &pageview("2024-03-10T15:00:00Z", "1.2.3.4"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (_, totals) = app.get("/site").await;
    assert_eq!(totals, json!({"total": 1, "unique": 1}));

    let (_, platforms) = app.get("/site/platforms").await;
    assert_eq!(platforms, json!({"list": [{"value": "linux", "count": 1}]}));

    let (_, domains) = app.get("/site/domains").await;
    assert_eq!(
        domains,
        json!({"list": [{"value": "news.ycombinator.com", "count": 1}]})
    );

    let (_, events) = app.get("/site/events").await;
    assert_eq!(events["list"][0]["value"], "pageview");

    let (_, series) = app.get("/site/time").await;
    assert_eq!(series["interval"], 86400);
    assert_eq!(series["list"].as_array().map(Vec::len), Some(1));
    assert_eq!(series["list"][0]["start"], "2024-03-10T00:00:00Z");
    assert_eq!(series["list"][0]["count"], 1);
}

#[tokio::test]
async fn test_unique_and_windowed_queries() {
    let app = TestApp::new();
    for (time, ip) in [
        ("2024-03-10T08:00:00Z", "1.1.1.1"),
        ("2024-03-10T09:00:00Z", "1.1.1.1"),
        ("2024-03-12T09:00:00Z", "2.2.2.2"),
    ] {
        let (status, _) = app.post("/site", &pageview(time, ip)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, plain) = app.get("/site/events").await;
    assert_eq!(plain["list"][0]["count"], 3);
    let (_, unique) = app.get("/site/events?unique=true").await;
    assert_eq!(unique["list"][0]["count"], 2);

    let (_, window) = app
        .get("/site?start=2024-03-11T00:00:00Z&end=2024-03-13T00:00:00Z")
        .await;
    assert_eq!(window, json!({"total": 1, "unique": 1}));

    let (_, series) = app
        .get("/site/time?start=2024-03-10T00:00:00Z&end=2024-03-13T00:00:00Z")
        .await;
    let counts: Vec<u64> = series["list"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["count"].as_u64().unwrap())
        .collect();
    assert_eq!(counts, vec![2, 0, 1]);
}

#[tokio::test]
async fn test_special_insert_keeps_fields_as_is() {
    let app = TestApp::new();
    let (status, _) = app
        .post(
            "/site/special",
            &json!({
                "time": 1704067200,
                "event": "download",
                "path": "/file",
                "ip": "9.9.9.9",
                "platform": "chromeos",
                "refererDomain": "example.org",
                "countryCode": "NZ"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, countries) = app.get("/site/countries").await;
    assert_eq!(countries, json!({"list": [{"value": "NZ", "count": 1}]}));
    let (_, series) = app.get("/site/time").await;
    assert_eq!(series["list"][0]["start"], "2024-01-01T00:00:00Z");
}

#[tokio::test]
async fn test_geoip_enriches_country() {
    let table = CidrTable::parse("1.2.0.0/16,FR").unwrap();
    let app = TestApp::with(BrokerConfig::default(), Arc::new(table));
    app.post("/site", &pageview("2024-03-10T15:00:00Z", "1.2.3.4"))
        .await;
    app.post("/site", &pageview("2024-03-10T16:00:00Z", "5.5.5.5"))
        .await;

    let (_, countries) = app.get("/site/countries").await;
    assert_eq!(
        countries,
        json!({"list": [{"value": "", "count": 1}, {"value": "FR", "count": 1}]})
    );
}

// ============================================================================
// CACHE BEHAVIOR
// ============================================================================

#[tokio::test]
async fn test_repeated_query_is_byte_identical_from_cache() {
    let app = TestApp::new();
    app.post("/site", &pageview("2024-03-10T15:00:00Z", "1.2.3.4"))
        .await;

    let (_, first) = app.send(Method::GET, "/site/platforms?unique=true", None).await;
    let hits_before = app.fixture.broker.cache().stats().hits;
    let (_, second) = app.send(Method::GET, "/site/platforms?unique=true", None).await;
    assert_eq!(first, second);
    assert_eq!(app.fixture.broker.cache().stats().hits, hits_before + 1);
}

#[tokio::test]
async fn test_insert_invalidates_cached_totals() {
    let app = TestApp::new();
    app.post("/site", &pageview("2024-03-10T15:00:00Z", "1.2.3.4"))
        .await;
    let (_, before) = app.get("/site").await;
    assert_eq!(before["total"], 1);

    app.post("/site", &pageview("2024-03-10T16:00:00Z", "1.2.3.4"))
        .await;
    let (_, after) = app.get("/site").await;
    assert_eq!(after["total"], 2);
}

#[tokio::test]
async fn test_stale_reads_when_invalidation_disabled() {
    let app = TestApp::with(
        BrokerConfig::new().with_invalidate_on_write(false),
        Arc::new(NoGeoIp),
    );
    app.post("/site", &pageview("2024-03-10T15:00:00Z", "1.2.3.4"))
        .await;
    let (_, before) = app.get("/site").await;
    app.post("/site", &pageview("2024-03-10T16:00:00Z", "1.2.3.4"))
        .await;
    let (_, after) = app.get("/site").await;
    assert_eq!(before, after);
}

// ============================================================================
// DELETION
// ============================================================================

#[tokio::test]
async fn test_delete_store() {
    let app = TestApp::new();
    app.post("/site", &pageview("2024-03-10T15:00:00Z", "1.2.3.4"))
        .await;
    app.get("/site").await;

    let (status, bytes) = app.send(Method::DELETE, "/site", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"{}");

    let (status, body) = app.get("/site").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "STORE_NOT_FOUND");

    let (status, _) = app.send(Method::DELETE, "/site", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
