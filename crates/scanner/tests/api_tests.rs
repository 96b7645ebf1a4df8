//! Integration tests for the scanner API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use price_scanner::api::{create_router, AppState};
use scanner_lib::{
    catalog::{default_catalog, MemoryBackend, OverrideStore},
    classifier::{Classifier, ScriptedClassifier},
    frames::StaticFrameSource,
    health::{components, HealthRegistry},
    models::{Prediction, PriceRecord},
    observability::{ScannerMetrics, StructuredLogger},
    publisher::ResultPublisher,
    resolver::{Detection, RecordSource, ResolvedResult},
    scan::ScanLoopBuilder,
};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    backend: Arc<MemoryBackend>,
}

async fn setup_test_app() -> TestApp {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::CLASSIFIER).await;
    health_registry.register(components::FRAME_SOURCE).await;
    health_registry.register(components::OVERRIDE_STORE).await;

    let labels: Vec<String> = default_catalog().keys().cloned().collect();
    let classifier = Arc::new(ScriptedClassifier::new(
        labels,
        vec![Prediction::new("Hollandia 50g", 0.97)],
    ));
    classifier
        .load(Path::new("model.onnx"), Path::new("metadata.json"))
        .await
        .unwrap();

    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(OverrideStore::open(
        default_catalog(),
        Box::new(backend.clone()),
    ));
    let publisher = ResultPublisher::new();

    // The loop itself is never run; the handle is enough for pause/resume
    let (_scan_loop, scan) = ScanLoopBuilder::new()
        .classifier(classifier.clone())
        .frame_source(Arc::new(StaticFrameSource::blank()))
        .store(store.clone())
        .publisher(publisher.clone())
        .build()
        .unwrap();

    let state = Arc::new(AppState {
        health_registry,
        metrics: ScannerMetrics::new(),
        logger: StructuredLogger::new("api-test"),
        store,
        publisher,
        scan,
        classifier: classifier as Arc<dyn Classifier>,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        backend,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let app = setup_test_app().await;

    let (status, health) = send(&app.router, "GET", "/healthz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["classifier"].is_object());
    assert!(health["components"]["override_store"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_503_when_classifier_unhealthy() {
    let app = setup_test_app().await;
    app.state
        .health_registry
        .set_unhealthy(components::CLASSIFIER, "model unreadable")
        .await;

    let (status, health) = send(&app.router, "GET", "/healthz", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_classifier_load() {
    let app = setup_test_app().await;

    let (status, readiness) = send(&app.router, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    app.state.health_registry.set_ready(true).await;

    let (status, readiness) = send(&app.router, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_test_app().await;
    app.state.metrics.observe_tick_latency(0.02);
    app.state.metrics.observe_predict_latency(0.015);

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("price_scanner_tick_latency_seconds_bucket"));
    assert!(metrics_text.contains("price_scanner_predict_latency_seconds_count"));
    assert!(metrics_text.contains("price_scanner_detections_total"));
}

#[tokio::test]
async fn test_result_reflects_latest_publication() {
    let app = setup_test_app().await;

    let (status, publication) = send(&app.router, "GET", "/api/v1/result", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(publication["generation"], 0);
    assert_eq!(publication["result"]["status"], "empty");

    app.state
        .publisher
        .publish_at(7, ResolvedResult::Detected(Detection {
            label: "Hollandia 50g".to_string(),
            confidence: 0.97,
            record: PriceRecord::new("Hollandia Evaporated Milk (50g)", "₦250"),
            source: RecordSource::Catalog,
        }));

    let (_, publication) = send(&app.router, "GET", "/api/v1/result", None).await;
    assert_eq!(publication["generation"], 7);
    assert_eq!(publication["result"]["status"], "detected");
    assert_eq!(publication["result"]["label"], "Hollandia 50g");
    assert_eq!(publication["result"]["record"]["price"], "₦250");
    assert!(publication["publishedAt"].is_string());
}

#[tokio::test]
async fn test_pause_and_resume() {
    let app = setup_test_app().await;

    let (status, body) = send(&app.router, "POST", "/api/v1/scan/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert_eq!(body["status"]["paused"], true);

    let (_, body) = send(&app.router, "POST", "/api/v1/scan/pause", None).await;
    assert_eq!(body["changed"], false);

    let (_, body) = send(&app.router, "POST", "/api/v1/scan/resume", None).await;
    assert_eq!(body["changed"], true);
    assert_eq!(body["status"]["paused"], false);

    let (_, status_body) = send(&app.router, "GET", "/api/v1/scan", None).await;
    assert_eq!(status_body["state"], "idle");
    assert_eq!(status_body["tickCount"], 0);
}

#[tokio::test]
async fn test_labels_lists_classifier_labels_with_layers() {
    let app = setup_test_app().await;
    app.state
        .store
        .set_override("Class 1", PriceRecord::new("Loose Sugar", "₦100"))
        .unwrap();

    let (status, body) = send(&app.router, "GET", "/api/v1/labels", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["classifierReady"], true);
    let labels = body["labels"].as_array().unwrap();
    assert_eq!(labels.len(), 5);

    let class_1 = labels.iter().find(|e| e["label"] == "Class 1").unwrap();
    assert_eq!(class_1["layer"], "override");
    assert_eq!(class_1["record"]["price"], "₦100");

    let crackers = labels
        .iter()
        .find(|e| e["label"] == "Beloxxi Cream cracker")
        .unwrap();
    assert_eq!(crackers["layer"], "default");
}

#[tokio::test]
async fn test_catalog_entry_lookup() {
    let app = setup_test_app().await;

    let (status, entry) = send(
        &app.router,
        "GET",
        "/api/v1/catalog/Hollandia%20Evap%20120g",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["record"]["displayName"], "Hollandia Evaporated Milk (120g)");
    assert_eq!(entry["layer"], "default");

    let (status, body) = send(&app.router, "GET", "/api/v1/catalog/Unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("Unknown"));
}

#[tokio::test]
async fn test_put_override_persists() {
    let app = setup_test_app().await;

    let (status, body) = send(
        &app.router,
        "PUT",
        "/api/v1/overrides/Hollandia%20Evap%20120g",
        Some(serde_json::json!({
            "displayName": "Hollandia Evaporated Milk (120g)",
            "price": "₦700",
            "category": "Dairy"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["persisted"], true);
    assert_eq!(body["record"]["price"], "₦700");

    let stored: serde_json::Value =
        serde_json::from_str(&app.backend.contents().unwrap()).unwrap();
    assert_eq!(stored["Hollandia Evap 120g"]["price"], "₦700");

    let (_, entry) = send(
        &app.router,
        "GET",
        "/api/v1/catalog/Hollandia%20Evap%20120g",
        None,
    )
    .await;
    assert_eq!(entry["layer"], "override");
}

#[tokio::test]
async fn test_put_override_accepts_name_alias() {
    let app = setup_test_app().await;

    let (status, body) = send(
        &app.router,
        "PUT",
        "/api/v1/overrides/New%20Label",
        Some(serde_json::json!({ "name": "Zobo Drink", "price": "₦200" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["displayName"], "Zobo Drink");
}

#[tokio::test]
async fn test_put_override_storage_failure_keeps_in_memory_record() {
    let app = setup_test_app().await;
    app.backend.set_fail_writes(true);

    let (status, body) = send(
        &app.router,
        "PUT",
        "/api/v1/overrides/Class%201",
        Some(serde_json::json!({ "displayName": "Generic Item", "price": "₦50" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["persisted"], false);
    assert_eq!(body["record"]["price"], "₦50");
    assert!(body["error"].is_string());
    assert_eq!(
        app.state.store.get_effective("Class 1").unwrap().price,
        "₦50"
    );

    let (status, health) = send(&app.router, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["components"]["override_store"]["status"], "degraded");
}

#[tokio::test]
async fn test_put_override_rejects_empty_price() {
    let app = setup_test_app().await;

    let (status, _) = send(
        &app.router,
        "PUT",
        "/api/v1/overrides/Class%201",
        Some(serde_json::json!({ "displayName": "Generic Item", "price": "  " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.state.store.overrides().is_empty());
}

#[tokio::test]
async fn test_delete_override_restores_default() {
    let app = setup_test_app().await;
    app.state
        .store
        .set_override("Hollandia 50g", PriceRecord::new("Hollandia 50g", "₦300"))
        .unwrap();

    let (status, body) = send(
        &app.router,
        "DELETE",
        "/api/v1/overrides/Hollandia%2050g",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["persisted"], true);
    assert_eq!(body["record"]["price"], "₦250");

    let (status, _) = send(
        &app.router,
        "DELETE",
        "/api/v1/overrides/Hollandia%2050g",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
