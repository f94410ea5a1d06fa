use std::{sync::Arc, time::Duration};

use crate::{
    analysis::AnalysisService,
    backend::ModelBackend,
    config::AssistantConfig,
    email::EmailService,
    metrics::AppMetrics,
    orchestrator::ChatOrchestrator,
    selector::SelectedBackend,
    translation::TranslationService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AssistantConfig>,
    pub selected: SelectedBackend,
    pub orchestrator: ChatOrchestrator,
    pub translation: TranslationService,
    pub email: EmailService,
    pub analysis: AnalysisService,
    pub metrics: Arc<AppMetrics>,
}

impl AppState {
    pub fn new(config: AssistantConfig, selected: SelectedBackend) -> Self {
        let orchestrator = ChatOrchestrator::new(selected.backend.clone(), selected.model.as_str())
            .with_max_concurrency(config.max_concurrency);
        Self {
            config: Arc::new(config),
            selected,
            translation: TranslationService::new(orchestrator.clone()),
            email: EmailService::new(orchestrator.clone()),
            analysis: AnalysisService::new(orchestrator.clone()),
            orchestrator,
            metrics: Arc::new(AppMetrics::new()),
        }
    }

    /// State around an injected backend; health reports probe that backend directly.
    pub fn new_for_tests<B>(backend: Arc<B>) -> Self
    where
        B: ModelBackend + 'static,
    {
        let backend: Arc<dyn ModelBackend> = backend;
        let config = AssistantConfig {
            use_mock: true,
            mock_latency: Duration::ZERO,
            ..AssistantConfig::default()
        };
        let selected = SelectedBackend {
            model: config.preferred_model.clone(),
            description: format!("{} (injected)", backend.name()),
            backend,
        };
        Self::new(config, selected)
    }
}
