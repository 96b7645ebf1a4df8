//! Price Scanner - real-time product price lookup
//!
//! Classifies camera frames, resolves confident detections to catalog
//! prices and serves the current result and the price settings over HTTP.

use anyhow::{Context, Result};
use price_scanner::{api, config::ScannerConfig};
use scanner_lib::{
    catalog::{default_catalog, FileBackend, OverrideStore},
    classifier::{Classifier, OnnxClassifier},
    frames::DirectoryFrameSource,
    health::{components, HealthRegistry},
    observability::{ScannerMetrics, StructuredLogger},
    publisher::ResultPublisher,
    scan::ScanLoopBuilder,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SCANNER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting price-scanner");

    let config = ScannerConfig::load().context("Failed to load configuration")?;
    info!(
        instance = %config.instance,
        model = %config.model_path.display(),
        frames_dir = %config.frames_dir.display(),
        storage_dir = %config.storage_dir.display(),
        "Scanner configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CLASSIFIER).await;
    health_registry.register(components::FRAME_SOURCE).await;
    health_registry.register(components::OVERRIDE_STORE).await;

    let metrics = ScannerMetrics::new();
    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(SCANNER_VERSION, &config.model_path.display().to_string());

    let store = Arc::new(OverrideStore::open(
        default_catalog(),
        Box::new(FileBackend::new(&config.storage_dir, &config.override_key)),
    ));
    metrics.set_overrides(store.overrides().len());

    let classifier: Arc<dyn Classifier> = Arc::new(OnnxClassifier::new());
    let publisher = ResultPublisher::new();

    let (scan_loop, scan) = ScanLoopBuilder::new()
        .classifier(classifier.clone())
        .frame_source(Arc::new(DirectoryFrameSource::new(&config.frames_dir)))
        .store(store.clone())
        .publisher(publisher.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .config(config.scan_config())
        .build()
        .context("Failed to build scan loop")?;

    let app_state = Arc::new(api::AppState {
        health_registry: health_registry.clone(),
        metrics: metrics.clone(),
        logger: logger.clone(),
        store,
        publisher,
        scan: scan.clone(),
        classifier,
    });

    // Start API server; it keeps serving health and the fatal state even
    // if the classifier never loads
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));
    let mut scan_task = tokio::spawn(scan_loop.run());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut scan_task => {
            match result {
                Ok(Err(e)) => error!(error = %e, "Scan loop stopped: classifier unavailable"),
                Ok(Ok(())) => warn!("Scan loop exited"),
                Err(e) => error!(error = %e, "Scan loop task panicked"),
            }
            // Keep serving so the failure stays visible until shutdown
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received after scan loop stopped");
        }
    }

    scan.stop();
    if !scan_task.is_finished() {
        let _ = scan_task.await;
    }
    api_handle.abort();

    info!("Shutting down");
    Ok(())
}
