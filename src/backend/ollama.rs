//! Client for a locally hosted model server speaking the Ollama HTTP API
//! (`/api/tags`, `/api/generate`, `/api/chat`).

use std::{
    fmt,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{
        ndjson::{decode_fragment, LineBuffer},
        BackendError, BackendKind, FragmentStream, ModelBackend,
    },
    config::AssistantConfig,
    models::{
        ChatMessage, CompletionRequest, CompletionResult, ModelInfo, ModelMeta, RequestShape,
        StreamFragment,
    },
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    probe_timeout: Duration,
    completion_timeout: Duration,
}

impl OllamaBackend {
    pub fn new(
        base_url: impl Into<String>,
        probe_timeout: Duration,
        completion_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(BackendError::Configuration(
                "local model server url is empty".to_owned(),
            ));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(probe_timeout)
            .build()
            .map_err(|error| {
                BackendError::Configuration(format!("failed to build HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            base_url,
            probe_timeout,
            completion_timeout,
        })
    }

    pub fn from_config(config: &AssistantConfig) -> Result<Self, BackendError> {
        Self::new(
            config.ollama_url.clone(),
            config.probe_timeout,
            config.completion_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn fetch_tags(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(BackendError::from_response(response).await);
        }

        let tags: TagsResponse = response.json().await.map_err(BackendError::from_reqwest)?;
        Ok(tags.models)
    }

    async fn post(
        &self,
        path: &str,
        payload: &OllamaPayload<'_>,
    ) -> Result<reqwest::Response, BackendError> {
        let response = self
            .client
            .post(self.url(path))
            .timeout(self.completion_timeout)
            .json(payload)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !response.status().is_success() {
            let error = BackendError::from_response(response).await;
            error!(backend = self.name(), error = %error, "model server rejected request");
            return Err(error);
        }

        Ok(response)
    }

    async fn try_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, BackendError> {
        let (path, payload) = build_payload(request, false);
        let response = self.post(path, &payload).await?;
        let envelope: OllamaEnvelope = response
            .json()
            .await
            .map_err(|error| BackendError::InvalidResponse(error.to_string()))?;

        if !envelope.done {
            warn!(backend = self.name(), "model server reported incomplete generation");
        }

        Ok(envelope.into_result())
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn is_available(&self) -> bool {
        let result = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                let available = response.status().is_success();
                debug!(backend = self.name(), available, "availability probe finished");
                available
            }
            Err(error) => {
                debug!(backend = self.name(), error = %error, "availability probe failed");
                false
            }
        }
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        match self.fetch_tags().await {
            Ok(models) => models,
            Err(error) => {
                error!(backend = self.name(), error = %error, "failed to list models");
                Vec::new()
            }
        }
    }

    async fn complete(&self, request: CompletionRequest) -> CompletionResult {
        if let Err(error) = request.validate() {
            warn!(backend = self.name(), error = %error, "refusing invalid completion request");
            return CompletionResult::transport_failure(error.to_string());
        }

        let started = Instant::now();
        match self.try_complete(&request).await {
            Ok(result) => {
                info!(
                    backend = self.name(),
                    model = %request.model,
                    shape = ?request.shape,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "completion finished"
                );
                result
            }
            Err(error) => {
                error!(
                    backend = self.name(),
                    model = %request.model,
                    error = %error,
                    "completion failed"
                );
                CompletionResult::from(error)
            }
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, BackendError> {
        request
            .validate()
            .map_err(|error| BackendError::InvalidResponse(error.to_string()))?;

        let (path, payload) = build_payload(&request, true);
        let response = self.post(path, &payload).await?;
        let mut upstream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = LineBuffer::default();
            let mut finished = false;

            while let Some(next) = upstream.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        let error = BackendError::from_reqwest(error);
                        warn!(error = %error, "stream interrupted");
                        yield StreamFragment::failed(CompletionResult::from(error));
                        finished = true;
                        break;
                    }
                };

                for line in buffer.push(&bytes) {
                    if let Some(fragment) = decode_fragment(&line) {
                        let done = fragment.done;
                        yield fragment;
                        if done {
                            finished = true;
                            break;
                        }
                    }
                }

                if finished {
                    break;
                }
            }

            if !finished {
                if let Some(fragment) = buffer.finish().as_deref().and_then(decode_fragment) {
                    yield fragment;
                }
            }
        };

        debug!(backend = self.name(), model = %request.model, "stream prepared");
        Ok(stream.boxed())
    }
}

impl fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("base_url", &self.base_url)
            .field("probe_timeout", &self.probe_timeout)
            .field("completion_timeout", &self.completion_timeout)
            .finish()
    }
}

fn build_payload(request: &CompletionRequest, stream: bool) -> (&'static str, OllamaPayload<'_>) {
    let options = Options {
        temperature: request.temperature,
    };
    match request.shape {
        RequestShape::SingleShot => (
            "/api/generate",
            OllamaPayload::Generate {
                model: &request.model,
                prompt: request.last_user_message().unwrap_or_default(),
                system: request.system_message(),
                stream,
                options,
            },
        ),
        RequestShape::Chat => (
            "/api/chat",
            OllamaPayload::Chat {
                model: &request.model,
                messages: &request.messages,
                stream,
                options,
            },
        ),
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OllamaPayload<'a> {
    Generate {
        model: &'a str,
        prompt: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        system: Option<&'a str>,
        stream: bool,
        options: Options,
    },
    Chat {
        model: &'a str,
        messages: &'a [ChatMessage],
        stream: bool,
        options: Options,
    },
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct OllamaEnvelope {
    #[serde(default)]
    model: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<EnvelopeMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    load_duration: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_duration: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    eval_duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMessage {
    #[serde(default)]
    content: String,
}

impl OllamaEnvelope {
    fn into_result(self) -> CompletionResult {
        let content = self
            .response
            .or_else(|| self.message.map(|message| message.content))
            .unwrap_or_default();

        CompletionResult::Ok {
            content,
            meta: ModelMeta {
                model: self.model,
                created_at: self.created_at,
                done: self.done,
                total_duration: self.total_duration,
                load_duration: self.load_duration,
                prompt_eval_count: self.prompt_eval_count,
                prompt_eval_duration: self.prompt_eval_duration,
                eval_count: self.eval_count,
                eval_duration: self.eval_duration,
            },
        }
    }
}
