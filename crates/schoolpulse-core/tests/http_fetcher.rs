use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schoolpulse_core::{
    ContentStore, ContentStoreConfig, DataSource, Fetch, FetchError, HttpFetcher, RequestOptions,
    RetryPolicy, Section,
};

async fn mount_json(server: &MockServer, route: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn get_unwraps_success_envelope() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/api/public/events",
        200,
        json!({"success": true, "data": [{"title": "Sports day"}]}),
    )
    .await;

    let fetcher = HttpFetcher::new(format!("{}/api", server.uri())).expect("client");
    let envelope = fetcher
        .get("/public/events", &RequestOptions::default())
        .await
        .expect("request");

    assert!(envelope.success);
    assert_eq!(envelope.into_data().expect("data"), json!([{"title": "Sports day"}]));
}

#[tokio::test]
async fn polling_requests_bypass_caches() {
    let server = MockServer::start().await;
    mount_json(&server, "/public/notices", 200, json!({"success": true, "data": []})).await;

    let fetcher = HttpFetcher::new(server.uri()).expect("client");
    fetcher
        .get("public/notices", &RequestOptions::polling(Duration::from_secs(10)))
        .await
        .expect("request");

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let header = |name: &str| {
        request
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    assert_eq!(
        header("cache-control").as_deref(),
        Some("no-cache, no-store, must-revalidate")
    );
    assert_eq!(header("pragma").as_deref(), Some("no-cache"));
    assert_eq!(header("expires").as_deref(), Some("0"));
    assert!(request.url.query_pairs().any(|(key, _)| key == "_t"));
}

#[tokio::test]
async fn plain_requests_carry_no_cache_buster() {
    let server = MockServer::start().await;
    mount_json(&server, "/public/content", 200, json!({"success": true, "data": {}})).await;

    let fetcher = HttpFetcher::new(server.uri()).expect("client");
    fetcher
        .get("/public/content", &RequestOptions::default())
        .await
        .expect("request");

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests[0].url.query().is_none());
    assert!(requests[0].headers.get("pragma").is_none());
}

#[tokio::test]
async fn server_errors_map_to_fetch_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/public/stats"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;
    mount_json(&server, "/public/missing", 404, json!({"success": false})).await;

    let fetcher = HttpFetcher::new(server.uri()).expect("client");

    let err = fetcher
        .get("/public/stats", &RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::ServerError(ref body) if body.contains("upstream unavailable")));
    assert!(err.is_transient());

    let err = fetcher
        .get("/public/missing", &RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NotFound(_)));
}

#[tokio::test]
async fn rejected_envelope_is_an_error_once_unwrapped() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/public/landing",
        200,
        json!({"success": false, "message": "Site under maintenance"}),
    )
    .await;

    let fetcher = HttpFetcher::new(server.uri()).expect("client");
    let envelope = fetcher
        .get("/public/landing", &RequestOptions::default())
        .await
        .expect("request");

    let err = envelope.into_data().unwrap_err();
    assert!(matches!(err, FetchError::Rejected(ref message) if message == "Site under maintenance"));
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/public/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "data": []}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(server.uri()).expect("client");
    let err = fetcher
        .get("/public/events", &RequestOptions::polling(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Timeout(timeout) if timeout == Duration::from_millis(100)));
}

#[tokio::test]
async fn content_store_falls_back_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/public/content"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;
    mount_json(
        &server,
        "/public/landing",
        200,
        json!({
            "success": true,
            "data": {
                "settings": {"schoolName": "Riverside High"},
                "eventsNotices": [{"title": "Exams begin"}],
                "stats": {"totalStudents": 700}
            }
        }),
    )
    .await;

    let fetcher = Arc::new(HttpFetcher::new(server.uri()).expect("client"));
    let config = ContentStoreConfig {
        min_display_time: Duration::ZERO,
        retry: RetryPolicy::new(1, Duration::from_millis(10)),
        ..ContentStoreConfig::default()
    };
    let store = ContentStore::new(fetcher, config);

    let snapshot = store.load(false).await;

    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.source, Some(DataSource::Fallback));
    assert_eq!(
        snapshot.section(Section::Events),
        Some(&json!([{"title": "Exams begin"}]))
    );
    assert_eq!(snapshot.stats().total_students, 700);
    assert!(snapshot.is_section_loading(Section::Gallery));
    server.verify().await;
}
