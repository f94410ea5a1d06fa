use std::{sync::Arc, time::Instant};

use futures_util::{stream, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
    backend::{FragmentStream, ModelBackend},
    models::{CompletionRequest, CompletionResult, ConversationHistory, StreamFragment},
    prompts::{ContextType, PromptRegistry},
};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Assembles system prompt, history and message into one backend request.
/// The backend's result is returned unmodified.
#[derive(Clone)]
pub struct ChatOrchestrator {
    backend: Arc<dyn ModelBackend>,
    model: String,
    prompts: Arc<PromptRegistry>,
    permits: Option<Arc<Semaphore>>,
}

impl ChatOrchestrator {
    pub fn new(backend: Arc<dyn ModelBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            prompts: Arc::new(PromptRegistry::default()),
            permits: None,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptRegistry) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    /// Bounds how many backend completions run at once.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.permits = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }

    fn build_request(
        &self,
        message: &str,
        context: ContextType,
        history: Option<ConversationHistory>,
        temperature: f32,
    ) -> CompletionRequest {
        let system = self.prompts.system_prompt(context);
        match history.filter(|history| !history.is_empty()) {
            Some(history) => {
                CompletionRequest::chat(self.model.as_str(), system, history, message, temperature)
            }
            None => CompletionRequest::single_shot(
                self.model.as_str(),
                Some(system),
                message,
                temperature,
            ),
        }
    }

    pub async fn get_response(
        &self,
        message: &str,
        context: ContextType,
        history: Option<ConversationHistory>,
        temperature: f32,
    ) -> CompletionResult {
        if !self.backend.is_available().await {
            warn!(
                backend = self.backend.name(),
                context = %context,
                "backend unavailable, skipping completion"
            );
            return CompletionResult::service_unavailable();
        }

        let request = self.build_request(message, context, history, temperature);
        debug!(
            backend = self.backend.name(),
            context = %context,
            shape = ?request.shape,
            messages = request.messages.len(),
            "dispatching completion"
        );

        let _permit = match &self.permits {
            Some(permits) => match permits.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return CompletionResult::service_unavailable(),
            },
            None => None,
        };

        let started = Instant::now();
        let result = self.backend.complete(request).await;
        info!(
            backend = self.backend.name(),
            context = %context,
            ok = result.is_ok(),
            latency_ms = started.elapsed().as_millis() as u64,
            "completion returned"
        );
        result
    }

    /// Streaming counterpart of `get_response`. Failures become a single
    /// terminal fragment carrying fallback text.
    pub async fn stream_response(
        &self,
        message: &str,
        context: ContextType,
        history: Option<ConversationHistory>,
        temperature: f32,
    ) -> FragmentStream {
        if !self.backend.is_available().await {
            warn!(backend = self.backend.name(), "backend unavailable, skipping stream");
            return failed_stream(CompletionResult::service_unavailable());
        }

        let request = self
            .build_request(message, context, history, temperature)
            .streaming();
        match self.backend.stream(request).await {
            Ok(fragments) => fragments,
            Err(error) => {
                warn!(backend = self.backend.name(), error = %error, "stream failed to open");
                failed_stream(CompletionResult::from(error))
            }
        }
    }
}

fn failed_stream(result: CompletionResult) -> FragmentStream {
    stream::once(async move { StreamFragment::failed(result) }).boxed()
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        backend::{mock::MockBackend, BackendError, BackendKind},
        models::{
            HistoryEntry, HistoryRole, ModelInfo, ModelMeta, RequestShape, UNAVAILABLE_FALLBACK,
        },
    };

    #[derive(Default)]
    struct CountingBackend {
        available: bool,
        completions: AtomicUsize,
        last_shape: std::sync::Mutex<Option<RequestShape>>,
        last_system: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl ModelBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Local
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn list_models(&self) -> Vec<ModelInfo> {
            Vec::new()
        }

        async fn complete(&self, request: CompletionRequest) -> CompletionResult {
            self.completions.fetch_add(1, Ordering::SeqCst);
            *self.last_shape.lock().expect("shape lock") = Some(request.shape);
            *self.last_system.lock().expect("system lock") =
                request.system_message().map(ToOwned::to_owned);
            CompletionResult::Ok {
                content: format!("{} messages", request.messages.len()),
                meta: ModelMeta::default(),
            }
        }

        async fn stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<FragmentStream, BackendError> {
            Err(BackendError::Transport("connection refused".to_owned()))
        }
    }

    #[tokio::test]
    async fn unavailable_backend_is_never_called() {
        let backend = Arc::new(CountingBackend::default());
        let orchestrator = ChatOrchestrator::new(backend.clone(), "llama3:8b");

        let result = orchestrator
            .get_response("hello", ContextType::General, None, DEFAULT_TEMPERATURE)
            .await;

        assert_eq!(backend.completions.load(Ordering::SeqCst), 0);
        assert_eq!(result.text(), UNAVAILABLE_FALLBACK);
        assert!(!result.text().is_empty());
    }

    #[tokio::test]
    async fn history_selects_chat_shape() {
        let backend = Arc::new(CountingBackend {
            available: true,
            ..CountingBackend::default()
        });
        let orchestrator = ChatOrchestrator::new(backend.clone(), "llama3:8b");
        let history = ConversationHistory::new(vec![HistoryEntry {
            role: HistoryRole::User,
            content: "earlier".to_owned(),
        }]);

        let result = orchestrator
            .get_response("now", ContextType::Translation, Some(history), 0.3)
            .await;

        assert_eq!(result.text(), "3 messages");
        assert_eq!(
            *backend.last_shape.lock().expect("shape lock"),
            Some(RequestShape::Chat)
        );
    }

    #[tokio::test]
    async fn empty_history_uses_single_shot() {
        let backend = Arc::new(CountingBackend {
            available: true,
            ..CountingBackend::default()
        });
        let orchestrator =
            ChatOrchestrator::new(backend.clone(), "llama3:8b").with_max_concurrency(1);

        orchestrator
            .get_response("now", ContextType::General, Some(ConversationHistory::default()), 0.7)
            .await;

        assert_eq!(
            *backend.last_shape.lock().expect("shape lock"),
            Some(RequestShape::SingleShot)
        );
        assert_eq!(backend.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_prompts_replace_the_defaults() {
        let backend = Arc::new(CountingBackend {
            available: true,
            ..CountingBackend::default()
        });
        let prompts = PromptRegistry::default()
            .with_prompt(ContextType::EmailAssistance, "Write short emails.");
        let orchestrator = ChatOrchestrator::new(backend.clone(), "llama3:8b").with_prompts(prompts);

        orchestrator
            .get_response("reply to Anna", ContextType::EmailAssistance, None, 0.7)
            .await;

        assert_eq!(orchestrator.model(), "llama3:8b");
        assert_eq!(
            orchestrator.prompts().system_prompt(ContextType::EmailAssistance),
            "Write short emails."
        );
        assert_eq!(
            backend.last_system.lock().expect("system lock").as_deref(),
            Some("Write short emails.")
        );
    }

    #[tokio::test]
    async fn failed_stream_open_yields_single_fallback_fragment() {
        let backend = Arc::new(CountingBackend {
            available: true,
            ..CountingBackend::default()
        });
        let orchestrator = ChatOrchestrator::new(backend, "llama3:8b");

        let fragments = orchestrator
            .stream_response("hello", ContextType::General, None, 0.7)
            .await
            .collect::<Vec<_>>()
            .await;

        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].done);
        assert!(fragments[0].error.is_some());
        assert_eq!(fragments[0].content, crate::models::TRANSPORT_FALLBACK);
    }

    #[tokio::test]
    async fn german_translation_request_hits_canned_translation() {
        let orchestrator = ChatOrchestrator::new(
            Arc::new(MockBackend::with_latency(Duration::from_millis(1))),
            "llama3:8b",
        );

        let result = orchestrator
            .get_response(
                "Translate 'Thank you' to German",
                ContextType::Translation,
                None,
                DEFAULT_TEMPERATURE,
            )
            .await;

        assert_eq!(
            result.text(),
            "Vielen Dank für Ihren Kauf. Ihre Bestellung wird innerhalb von 2 Werktagen versandt."
        );
    }

    #[tokio::test]
    async fn complaint_context_returns_complaint_report() {
        let orchestrator = ChatOrchestrator::new(
            Arc::new(MockBackend::with_latency(Duration::from_millis(1))),
            "llama3:8b",
        );

        let result = orchestrator
            .get_response(
                "The handle came loose after a week and I am dissatisfied",
                ContextType::ComplaintHandling,
                None,
                DEFAULT_TEMPERATURE,
            )
            .await;

        assert!(result.is_ok());
        assert!(result.text().contains("Complaint Analysis Report"));
    }
}
