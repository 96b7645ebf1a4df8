//! Price scanner library
//!
//! This crate provides the core functionality for:
//! - Classifying camera frames against a fixed set of product labels
//! - Resolving confident classifications to priced catalog entries
//! - Layering durable user price overrides over built-in defaults
//! - Driving the scan loop and publishing the current result
//! - Health checks and observability

pub mod catalog;
pub mod classifier;
pub mod error;
pub mod frames;
pub mod health;
pub mod models;
pub mod observability;
pub mod publisher;
pub mod resolver;
pub mod scan;

pub use catalog::{CatalogMapping, Layer, OverrideStore};
pub use classifier::{Classifier, OnnxClassifier, ScriptedClassifier};
pub use error::{LoadError, PersistError, PredictError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScannerMetrics, StructuredLogger};
pub use publisher::{Publication, ResultPublisher, SubscriptionId};
pub use resolver::{resolve, Detection, RecordSource, ResolvedResult};
pub use scan::{LoopState, ScanConfig, ScanHandle, ScanLoop, ScanLoopBuilder, ScanStatus};
