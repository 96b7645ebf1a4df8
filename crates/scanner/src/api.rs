//! HTTP API: current result, settings workflow, health checks and metrics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use scanner_lib::{
    catalog::{Layer, OverrideStore},
    classifier::Classifier,
    health::{components, ComponentStatus, HealthRegistry},
    models::{Label, PriceRecord},
    observability::{ScannerMetrics, StructuredLogger},
    publisher::ResultPublisher,
    scan::{ScanHandle, ScanStatus},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ScannerMetrics,
    pub logger: StructuredLogger,
    pub store: Arc<OverrideStore>,
    pub publisher: ResultPublisher,
    pub scan: ScanHandle,
    pub classifier: Arc<dyn Classifier>,
}

/// Effective record for one label, with the layer it came from
#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    pub label: Label,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<PriceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelsResponse {
    pub classifier_ready: bool,
    pub labels: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize)]
pub struct OverrideResponse {
    pub label: Label,
    /// Effective record after the change, already applied in memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<PriceRecord>,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanControlResponse {
    /// Whether the request changed the pause flag
    pub changed: bool,
    pub status: ScanStatus,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

impl AppState {
    fn catalog_entry(&self, label: &str) -> CatalogEntry {
        let mapping = self.store.effective();
        let found = mapping.get_with_layer(label);
        CatalogEntry {
            label: label.to_string(),
            record: found.map(|(record, _)| record.clone()),
            layer: found.map(|(_, layer)| layer),
        }
    }

    /// Record the outcome of an override write in health, metrics and logs
    async fn note_persist(&self, label: &str, price: &str, persisted: bool) {
        self.metrics.set_overrides(self.store.overrides().len());
        self.logger.log_override_saved(label, price, persisted);
        if persisted {
            self.health_registry
                .set_healthy(components::OVERRIDE_STORE)
                .await;
        } else {
            self.metrics.inc_persist_errors();
            self.health_registry
                .set_degraded(
                    components::OVERRIDE_STORE,
                    "Last override save did not reach storage",
                )
                .await;
        }
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Current published result
async fn current_result(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.publisher.latest())
}

async fn scan_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scan.status())
}

async fn pause_scan(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let changed = state.scan.pause();
    Json(ScanControlResponse {
        changed,
        status: state.scan.status(),
    })
}

async fn resume_scan(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let changed = state.scan.resume();
    Json(ScanControlResponse {
        changed,
        status: state.scan.status(),
    })
}

/// Labels the classifier can produce, each with its effective record
async fn list_labels(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let labels = state
        .classifier
        .list_labels()
        .iter()
        .map(|label| state.catalog_entry(label))
        .collect();

    Json(LabelsResponse {
        classifier_ready: state.classifier.is_ready(),
        labels,
    })
}

async fn get_catalog_entry(
    State(state): State<Arc<AppState>>,
    Path(label): Path<String>,
) -> Response {
    let entry = state.catalog_entry(&label);
    if entry.record.is_none() {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("No catalog entry for label '{}'", label),
        );
    }
    Json(entry).into_response()
}

/// Replace the record for a label. A failed save still applies in memory.
async fn put_override(
    State(state): State<Arc<AppState>>,
    Path(label): Path<String>,
    Json(record): Json<PriceRecord>,
) -> Response {
    if record.display_name.trim().is_empty() || record.price.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "displayName and price must not be empty",
        );
    }

    let price = record.price.clone();
    let result = state.store.set_override(label.clone(), record);
    let persisted = result.is_ok();
    state.note_persist(&label, &price, persisted).await;

    let response = OverrideResponse {
        record: state.store.get_effective(&label),
        label,
        persisted,
        error: result.err().map(|e| e.to_string()),
    };

    let status = if persisted {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(response)).into_response()
}

/// Drop a label's override so its default applies again
async fn delete_override(
    State(state): State<Arc<AppState>>,
    Path(label): Path<String>,
) -> Response {
    let result = state.store.clear_override(&label);
    let (status, persisted, error) = match result {
        Ok(false) => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("No override for label '{}'", label),
            )
        }
        Ok(true) => (StatusCode::OK, true, None),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, false, Some(e.to_string())),
    };

    let record = state.store.get_effective(&label);
    let price = record
        .as_ref()
        .map(|r| r.price.clone())
        .unwrap_or_default();
    state.note_persist(&label, &price, persisted).await;

    (
        status,
        Json(OverrideResponse {
            label,
            record,
            persisted,
            error,
        }),
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/result", get(current_result))
        .route("/api/v1/scan", get(scan_status))
        .route("/api/v1/scan/pause", post(pause_scan))
        .route("/api/v1/scan/resume", post(resume_scan))
        .route("/api/v1/labels", get(list_labels))
        .route("/api/v1/catalog/:label", get(get_catalog_entry))
        .route(
            "/api/v1/overrides/:label",
            put(put_override).delete(delete_override),
        )
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
