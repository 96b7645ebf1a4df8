//! Health tracking for the scanner's components
//!
//! Backs the liveness and readiness endpoints. The scanner is ready once
//! the classifier has loaded and stays ready while no component is
//! unhealthy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but something needs attention (e.g. last save failed)
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: Utc::now(),
        }
    }
}

/// Overall health: the worst component status, plus every component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const CLASSIFIER: &str = "classifier";
    pub const FRAME_SOURCE: &str = "frame_source";
    pub const OVERRIDE_STORE: &str = "override_store";
}

#[derive(Debug, Default)]
struct State {
    components: BTreeMap<String, ComponentHealth>,
    classifier_loaded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    async fn set(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), ComponentHealth::new(status, message));
    }

    pub async fn set_healthy(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Mark whether the classifier has finished loading
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.classifier_loaded = ready;
    }

    /// Status of a single component, if registered
    pub async fn component(&self, name: &str) -> Option<ComponentHealth> {
        self.state.read().await.components.get(name).cloned()
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if !state.classifier_loaded {
            Some("Classifier not loaded".to_string())
        } else {
            let unhealthy: Vec<&str> = state
                .components
                .iter()
                .filter(|(_, c)| !c.status.is_operational())
                .map(|(name, _)| name.as_str())
                .collect();
            (!unhealthy.is_empty()).then(|| format!("Unhealthy: {}", unhealthy.join(", ")))
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Classifier not loaded"));
    }

    #[tokio::test]
    async fn test_degraded_store_keeps_overall_operational() {
        let registry = HealthRegistry::new();
        registry.register(components::CLASSIFIER).await;
        registry.register(components::OVERRIDE_STORE).await;
        registry.set_ready(true).await;

        registry
            .set_degraded(components::OVERRIDE_STORE, "last save failed")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.status.is_operational());
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_readiness_names_unhealthy_component() {
        let registry = HealthRegistry::new();
        registry.register(components::CLASSIFIER).await;
        registry.register(components::FRAME_SOURCE).await;
        registry.set_ready(true).await;
        registry
            .set_unhealthy(components::CLASSIFIER, "model unreadable")
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Unhealthy: classifier"));
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_component_lookup() {
        let registry = HealthRegistry::new();
        registry.register(components::FRAME_SOURCE).await;
        registry
            .set_degraded(components::FRAME_SOURCE, "No frame available")
            .await;

        let frame_source = registry.component(components::FRAME_SOURCE).await.unwrap();
        assert_eq!(frame_source.status, ComponentStatus::Degraded);
        assert_eq!(frame_source.message.as_deref(), Some("No frame available"));
        assert!(registry.component("missing").await.is_none());
    }

    #[test]
    fn test_component_health_serializes_camel_case() {
        let health = ComponentHealth::new(ComponentStatus::Healthy, None);
        let json = serde_json::to_value(&health).unwrap();

        assert_eq!(json["status"], "healthy");
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("message").is_none());
    }
}
