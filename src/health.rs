use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::{
    backend::ModelBackend,
    config::AssistantConfig,
    models::ModelInfo,
    selector::{build_preferred, SelectedBackend},
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unavailable,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub status: HealthStatus,
    pub backend: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BackendHealth {
    pub async fn probe(backend: &dyn ModelBackend) -> Self {
        if backend.is_available().await {
            Self {
                status: HealthStatus::Healthy,
                backend: backend.name().to_owned(),
                models: backend.list_models().await,
                detail: None,
            }
        } else {
            Self {
                status: HealthStatus::Unavailable,
                backend: backend.name().to_owned(),
                models: Vec::new(),
                detail: Some("liveness probe failed".to_owned()),
            }
        }
    }

    pub fn error(backend: &str, detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            backend: backend.to_owned(),
            models: Vec::new(),
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub preferred: BackendHealth,
    pub active_backend: String,
    pub active_model: String,
    pub timestamp: u64,
}

impl HealthReport {
    /// Probes the configured preferred backend, independent of the active one.
    pub async fn collect(config: &AssistantConfig, active: &SelectedBackend) -> Self {
        let preferred = if config.use_mock {
            BackendHealth::probe(active.backend.as_ref()).await
        } else {
            match build_preferred(config) {
                Ok(backend) => BackendHealth::probe(backend.as_ref()).await,
                Err(error) => BackendHealth::error("preferred", error.to_string()),
            }
        };

        Self {
            status: preferred.status,
            preferred,
            active_backend: active.description.clone(),
            active_model: active.model.clone(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{backend::mock::MockBackend, config::Provider};

    #[tokio::test]
    async fn mock_backend_reports_healthy_with_models() {
        let health = BackendHealth::probe(&MockBackend::with_latency(Duration::ZERO)).await;

        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.models.len(), 2);
    }

    #[tokio::test]
    async fn configuration_failure_is_reported_as_error() {
        let config = AssistantConfig {
            provider: Provider::OpenAi,
            openai_api_key: None,
            ..AssistantConfig::default()
        };
        let active = SelectedBackend {
            backend: Arc::new(MockBackend::with_latency(Duration::ZERO)),
            model: "gpt-4".to_owned(),
            description: "mock (configuration error)".to_owned(),
        };

        let report = HealthReport::collect(&config, &active).await;

        assert_eq!(report.status, HealthStatus::Error);
        assert!(report.preferred.detail.is_some());
        let json = serde_json::to_value(&report).expect("report serializes");
        assert_eq!(json["status"], "error");
    }
}
