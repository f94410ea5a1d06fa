use std::{convert::Infallible, time::Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware::Next,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    analysis::{ComplaintAnalysis, DocumentAnalysis},
    email::{EmailRequest, EmailTemplate, GeneratedEmail},
    errors::AppError,
    health::{HealthReport, HealthStatus},
    models::{
        clamp_temperature, ConversationHistory, ErrorKind, HistoryEntry, StreamFragment,
        HISTORY_LIMIT,
    },
    orchestrator::DEFAULT_TEMPERATURE,
    prompts::ContextType,
    state::AppState,
    translation::Translation,
};

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn health(State(state): State<AppState>) -> Response {
    let report = HealthReport::collect(&state.config, &state.selected).await;
    let status = match report.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unavailable | HealthStatus::Error => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report)).into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => AppError::Internal(format!("metrics render failed: {error}")).into_response(),
    }
}

/// Records request count, latency and in-flight gauge for every routed request.
pub async fn track_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let _inflight = state.metrics.inflight_guard();

    let response = next.run(request).await;

    state
        .metrics
        .observe_request(&path, &method, response.status().as_u16(), started.elapsed());
    response
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context_type: ContextType,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response: String,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message content is required".to_owned()));
    }

    let request_id = Uuid::new_v4();
    let context = request.context_type;
    let history = ConversationHistory::bounded(request.history, HISTORY_LIMIT);
    let temperature = clamp_temperature(request.temperature.unwrap_or(DEFAULT_TEMPERATURE));
    info!(
        %request_id,
        context = %context,
        history = history.len(),
        stream = request.stream,
        "chat request accepted"
    );

    if request.stream {
        let fragments = state
            .orchestrator
            .stream_response(message, context, Some(history), temperature)
            .await;
        let metrics = state.metrics.clone();
        let backend = state.selected.backend.name().to_owned();
        let fragments = fragments
            .inspect(move |fragment| {
                if fragment.done {
                    metrics.observe_completion(context, &backend, fragment.outcome());
                }
            })
            .boxed();
        return Ok(stream_fragments(fragments).into_response());
    }

    let result = state
        .orchestrator
        .get_response(message, context, Some(history), temperature)
        .await;
    state
        .metrics
        .observe_completion(context, state.selected.backend.name(), result.outcome());

    let payload = ChatResponse {
        error: result.error_message().map(ToOwned::to_owned),
        response: result.into_text(),
    };
    Ok(Json(payload).into_response())
}

fn stream_fragments(fragments: crate::backend::FragmentStream) -> Response {
    let events = fragments
        .map(|fragment| Ok::<Event, Infallible>(fragment_event(&fragment)))
        .chain(stream::once(async {
            Ok::<Event, Infallible>(Event::default().data("[DONE]"))
        }));

    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(10)))
        .into_response()
}

fn fragment_event(fragment: &StreamFragment) -> Event {
    let payload = serde_json::json!({
        "content": fragment.content,
        "done": fragment.done,
        "error": fragment.error,
    });
    if let Some(error) = &fragment.error {
        warn!(error = %error, "stream ended with fallback fragment");
    }
    Event::default().data(payload.to_string())
}

fn default_source_language() -> String {
    "auto".to_owned()
}

fn default_target_language() -> String {
    "en".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

pub async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslateRequest>,
) -> Result<Json<Translation>, AppError> {
    let result = state
        .translation
        .translate(&request.text, &request.source_language, &request.target_language)
        .await;
    record(&state, ContextType::Translation, &result);
    Ok(Json(result?))
}

#[derive(Debug, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

pub async fn languages(State(state): State<AppState>) -> Json<Vec<Language>> {
    let languages = state
        .translation
        .supported_languages()
        .iter()
        .map(|&(code, name)| Language { code, name })
        .collect();
    Json(languages)
}

pub async fn generate_email(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<GeneratedEmail>, AppError> {
    let result = state.email.generate(&request).await;
    record(&state, ContextType::EmailAssistance, &result);
    Ok(Json(result?))
}

pub async fn email_templates(State(state): State<AppState>) -> Json<&'static [EmailTemplate]> {
    Json(state.email.templates())
}

fn default_filename() -> String {
    "document.txt".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    #[serde(default = "default_filename")]
    pub filename: String,
    pub text: String,
}

pub async fn analyze_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<DocumentAnalysis>, AppError> {
    let result = state
        .analysis
        .analyze_document(&request.filename, &request.text)
        .await;
    record(&state, ContextType::PdfAnalysis, &result);
    Ok(Json(result?))
}

#[derive(Debug, Deserialize)]
pub struct ComplaintRequest {
    pub complaint_text: String,
    #[serde(default)]
    pub current_response: Option<String>,
}

pub async fn analyze_complaint(
    State(state): State<AppState>,
    Json(request): Json<ComplaintRequest>,
) -> Result<Json<ComplaintAnalysis>, AppError> {
    let result = state
        .analysis
        .analyze_complaint(&request.complaint_text, request.current_response.as_deref())
        .await;
    record(&state, ContextType::ComplaintHandling, &result);
    Ok(Json(result?))
}

/// Counts a service call that reached the model; input validation failures are not counted.
fn record<T, E>(state: &AppState, context: ContextType, result: &Result<T, E>)
where
    E: BackendFailure,
{
    let outcome = match result {
        Ok(_) => "ok",
        Err(error) => match error.failure_kind() {
            Some(kind) => kind.outcome(),
            None => return,
        },
    };
    state
        .metrics
        .observe_completion(context, state.selected.backend.name(), outcome);
}

trait BackendFailure {
    fn failure_kind(&self) -> Option<ErrorKind>;
}

impl BackendFailure for crate::translation::TranslationError {
    fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Backend { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl BackendFailure for crate::email::EmailError {
    fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Backend { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl BackendFailure for crate::analysis::AnalysisError {
    fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Backend { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
