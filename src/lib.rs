pub mod analysis;
pub mod backend;
pub mod config;
pub mod email;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod sections;
pub mod selector;
pub mod state;
pub mod translation;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use config::AssistantConfig;
use selector::BackendSelector;
use tracing::info;

/// Resolves the active backend once and wires every service around it.
pub async fn build_state(config: AssistantConfig) -> state::AppState {
    let selector = BackendSelector::new(config);
    let selected = selector.resolve().await;
    info!(
        backend = %selected.description,
        kind = %selected.kind(),
        model = %selected.model,
        "model backend selected"
    );
    state::AppState::new(selector.config().clone(), selected)
}

pub fn build_app(state: state::AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/chat", post(handlers::chat))
        .route("/api/translate", post(handlers::translate))
        .route("/api/languages", get(handlers::languages))
        .route("/api/email/generate", post(handlers::generate_email))
        .route("/api/email/templates", get(handlers::email_templates))
        .route("/api/documents/analyze", post(handlers::analyze_document))
        .route("/api/complaints/analyze", post(handlers::analyze_complaint))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::track_requests,
        ))
        .with_state(state)
}
