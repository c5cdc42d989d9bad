//! HTTP surface behavior: envelopes, auth, status mapping, and the intake
//! flow against in-memory ports.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use beacon_application::testing::{
    CannedAnalyzer, EmptyArchive, FixedResolver, MemAggregationRepo, MemErrorLogRepo, MemLogStore,
    MemProjectRepo, MemSourceCodeRepo, RecordingQueue,
};
use beacon_application::{DiagnosisService, IngestionService, RetentionService};
use beacon_server::{AppState, router};

const TOKEN: &str = "test-token";

struct Harness {
    app: Router,
    aggregations: Arc<MemAggregationRepo>,
    logs: Arc<MemErrorLogRepo>,
}

fn harness() -> Harness {
    let logs = Arc::new(MemErrorLogRepo::default());
    let aggregations = Arc::new(MemAggregationRepo::default());
    let projects = Arc::new(MemProjectRepo::with_project("p1", 100, 1.0));
    let queues = Arc::new(RecordingQueue::default());
    let log_store = Arc::new(MemLogStore::default());
    let source_code = Arc::new(MemSourceCodeRepo::empty());
    let resolver = Arc::new(FixedResolver {
        position: None,
        context: None,
    });
    let archive = Arc::new(EmptyArchive);
    let analyzer = Arc::new(CannedAnalyzer::json("diag"));

    let ingestion = Arc::new(IngestionService::new(
        logs.clone(),
        log_store.clone(),
        queues.clone(),
        projects.clone(),
    ));
    let diagnosis = Arc::new(DiagnosisService::new(
        aggregations.clone(),
        logs.clone(),
        archive.clone(),
        resolver.clone(),
        source_code.clone(),
        analyzer,
    ));
    let retention = Arc::new(RetentionService::new(
        std::env::temp_dir().join("beacon-http-test"),
        Duration::from_secs(3600),
        log_store.clone(),
    ));

    let state = AppState {
        ingestion,
        diagnosis,
        retention,
        error_logs: logs.clone(),
        aggregations: aggregations.clone(),
        log_store,
        queues,
        archive,
        source_code,
        resolver,
        projects,
        auth_token: Some(Arc::from(TOKEN)),
    };
    Harness {
        app: router(state),
        aggregations,
        logs,
    }
}

fn report_body(user: &str) -> serde_json::Value {
    serde_json::json!({
        "projectId": "p1",
        "type": "jsError",
        "errorMessage": "TypeError: x is undefined",
        "errorStack": "at foo (a.js:10:5)",
        "userId": user,
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn authed(request: axum::http::request::Builder) -> axum::http::request::Builder {
    request.header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
}

#[tokio::test]
async fn monitor_report_accepts_with_valid_api_key() {
    let h = harness();
    let request = Request::post("/monitor/report")
        .header("x-api-key", "key-p1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(report_body("u1").to_string()))
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], 1);
    assert_eq!(h.logs.rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn monitor_report_rejects_bad_or_mismatched_keys() {
    let h = harness();

    let request = Request::post("/monitor/report")
        .header("x-api-key", "wrong")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(report_body("u1").to_string()))
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let mut mismatched = report_body("u1");
    mismatched["projectId"] = serde_json::json!("someone-else");
    let request = Request::post("/monitor/report")
        .header("x-api-key", "key-p1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(mismatched.to_string()))
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn management_routes_require_the_bearer_token() {
    let h = harness();

    let request = Request::get("/error-logs?projectId=p1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::get("/error-logs?projectId=p1")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = authed(Request::get("/error-logs?projectId=p1"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn batch_of_501_is_a_bad_request() {
    let h = harness();
    let batch: Vec<serde_json::Value> = (0..501).map(|i| report_body(&format!("u{i}"))).collect();
    let request = authed(Request::post("/error-logs/batch"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!(batch).to_string()))
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "BadRequest");
    assert!(h.logs.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn illegal_status_transition_is_a_conflict() {
    let h = harness();
    // seed one aggregation through the repo
    let upsert = beacon_domain::entities::AggregationUpsert {
        project_id: "p1".to_owned(),
        error_hash: "h".to_owned(),
        error_type: beacon_domain::entities::ErrorType::JsError,
        error_message: "boom".to_owned(),
        error_stack: None,
        source_file: None,
        source_line: None,
        source_column: None,
        batch_count: 1,
        user_ids: vec![],
        error_level: 2,
        newest_seen: chrono::Utc::now(),
    };
    use beacon_domain::ports::AggregationRepository;
    let outcome = h.aggregations.upsert(&upsert).await.unwrap();

    // open -> resolved is legal
    let request = authed(Request::put(format!("/error-aggregations/{}", outcome.id)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"status": 1}"#))
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);

    // resolved -> ignored is not
    let request = authed(Request::put(format!("/error-aggregations/{}", outcome.id)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"status": 2}"#))
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    // resolved -> open reopens
    let request = authed(Request::put(format!("/error-aggregations/{}", outcome.id)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"status": 0}"#))
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_aggregation_maps_to_not_found() {
    let h = harness();
    let request = authed(Request::get("/error-aggregations/9999"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn health_is_reachable_without_auth() {
    let h = harness();
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["clickhouse"]["ok"], true);
}

#[tokio::test]
async fn unknown_queue_name_is_not_found() {
    let h = harness();
    let request = authed(Request::post("/queues/no-such-queue/pause"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
