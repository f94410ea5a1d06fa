pub mod mock;
pub mod ndjson;
pub mod ollama;
pub mod openai;

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::models::{CompletionRequest, CompletionResult, ModelInfo, StreamFragment};

pub type FragmentStream = BoxStream<'static, StreamFragment>;

/// A model-serving backend. Every call returns a well-formed value; transport
/// faults surface as `CompletionResult::Err`, never as panics or raw errors.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Bounded liveness probe. Any failure reads as `false`.
    async fn is_available(&self) -> bool;

    /// Installed models, empty on failure.
    async fn list_models(&self) -> Vec<ModelInfo>;

    async fn complete(&self, request: CompletionRequest) -> CompletionResult;

    /// Lazily decoded partial results. Malformed upstream fragments are skipped.
    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Local,
    Hosted,
    Mock,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Hosted => "hosted",
            BackendKind::Mock => "mock",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend transport failure: {0}")]
    Transport(String),
    #[error("backend timeout: {0}")]
    Timeout(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend invalid response: {0}")]
    InvalidResponse(String),
    #[error("backend configuration error: {0}")]
    Configuration(String),
}

impl BackendError {
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            BackendError::Timeout(error.to_string())
        } else if error.is_decode() {
            BackendError::InvalidResponse(error.to_string())
        } else {
            BackendError::Transport(error.to_string())
        }
    }

    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown backend error".to_owned())
            .chars()
            .take(400)
            .collect::<String>();
        BackendError::Status { status, body }
    }
}

impl From<BackendError> for CompletionResult {
    fn from(error: BackendError) -> Self {
        CompletionResult::transport_failure(error.to_string())
    }
}
