use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    backend::{
        mock::MockBackend, ollama::OllamaBackend, openai::OpenAiBackend, BackendError,
        BackendKind, ModelBackend,
    },
    config::{AssistantConfig, Provider},
};

/// The backend handed to callers, plus the model to request from it.
#[derive(Clone)]
pub struct SelectedBackend {
    pub backend: Arc<dyn ModelBackend>,
    pub model: String,
    pub description: String,
}

impl SelectedBackend {
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

impl std::fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("description", &self.description)
            .finish()
    }
}

/// Resolves the active backend once and hands out the cached choice afterwards.
pub struct BackendSelector {
    config: AssistantConfig,
    resolved: OnceCell<SelectedBackend>,
}

impl BackendSelector {
    pub fn new(config: AssistantConfig) -> Self {
        Self {
            config,
            resolved: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub async fn resolve(&self) -> SelectedBackend {
        self.resolved
            .get_or_init(|| select_backend(&self.config))
            .await
            .clone()
    }
}

/// Picks the preferred backend when it answers its liveness probe, otherwise
/// the mock backend. Never fails.
pub async fn select_backend(config: &AssistantConfig) -> SelectedBackend {
    if config.use_mock {
        info!("mock services requested by configuration");
        return mock_selection(config, "mock (configured)");
    }

    let backend = match build_preferred(config) {
        Ok(backend) => backend,
        Err(error) => {
            warn!(error = %error, "failed to initialize preferred backend, falling back to mock");
            return mock_selection(config, "mock (configuration error)");
        }
    };

    if !backend.is_available().await {
        warn!(
            backend = backend.name(),
            "preferred backend unavailable, falling back to mock"
        );
        return mock_selection(config, "mock (backend unavailable)");
    }

    let model = choose_model(config, backend.as_ref()).await;
    info!(backend = backend.name(), model = %model, "using real model backend");
    SelectedBackend {
        description: format!("{} ({model})", backend.name()),
        backend,
        model,
    }
}

pub fn build_preferred(config: &AssistantConfig) -> Result<Arc<dyn ModelBackend>, BackendError> {
    let backend: Arc<dyn ModelBackend> = match config.provider {
        Provider::Ollama => Arc::new(OllamaBackend::from_config(config)?),
        Provider::OpenAi => Arc::new(OpenAiBackend::from_config(config)?),
    };
    Ok(backend)
}

async fn choose_model(config: &AssistantConfig, backend: &dyn ModelBackend) -> String {
    let preferred = config.preferred_model_for(config.provider).to_owned();
    if config.provider != Provider::Ollama {
        return preferred;
    }

    let installed = backend.list_models().await;
    let has = |name: &str| installed.iter().any(|model| model.name == name);
    if installed.is_empty() || has(&preferred) {
        return preferred;
    }

    if has(&config.fallback_model) {
        warn!(
            preferred = %preferred,
            fallback = %config.fallback_model,
            "preferred model not installed, using fallback model"
        );
        return config.fallback_model.clone();
    }

    debug!(preferred = %preferred, "preferred model not listed, keeping it");
    preferred
}

fn mock_selection(config: &AssistantConfig, description: &str) -> SelectedBackend {
    SelectedBackend {
        backend: Arc::new(MockBackend::with_latency(config.mock_latency)),
        model: config.preferred_model_for(config.provider).to_owned(),
        description: description.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn unreachable_config() -> AssistantConfig {
        AssistantConfig {
            ollama_url: "http://127.0.0.1:9".to_owned(),
            probe_timeout: Duration::from_millis(500),
            mock_latency: Duration::ZERO,
            ..AssistantConfig::default()
        }
    }

    #[tokio::test]
    async fn mock_flag_short_circuits_probing() {
        let config = AssistantConfig {
            use_mock: true,
            ..unreachable_config()
        };

        let selected = select_backend(&config).await;

        assert_eq!(selected.kind(), BackendKind::Mock);
        assert_eq!(selected.model, "llama3:8b");
    }

    #[tokio::test]
    async fn unreachable_backend_resolves_to_mock_every_time() {
        let first = select_backend(&unreachable_config()).await;
        let second = select_backend(&unreachable_config()).await;

        assert_eq!(first.kind(), BackendKind::Mock);
        assert_eq!(second.kind(), BackendKind::Mock);
    }

    #[tokio::test]
    async fn cached_resolution_is_idempotent() {
        let selector = BackendSelector::new(unreachable_config());

        let first = selector.resolve().await;
        let second = selector.resolve().await;

        assert_eq!(first.kind(), BackendKind::Mock);
        assert!(Arc::ptr_eq(&first.backend, &second.backend));
    }

    #[tokio::test]
    async fn missing_hosted_credentials_fall_back_to_mock() {
        let config = AssistantConfig {
            provider: Provider::OpenAi,
            openai_api_key: None,
            ..unreachable_config()
        };

        let selected = select_backend(&config).await;

        assert_eq!(selected.kind(), BackendKind::Mock);
        assert_eq!(selected.description, "mock (configuration error)");
    }
}
