use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::{
    backend::{ndjson::LineBuffer, BackendError, BackendKind, FragmentStream, ModelBackend},
    config::AssistantConfig,
    models::{CompletionRequest, CompletionResult, ModelInfo, ModelMeta, StreamFragment},
};

/// Hosted chat-completions API (OpenAI and compatible providers).
#[derive(Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    probe_timeout: Duration,
    completion_timeout: Duration,
}

impl OpenAiBackend {
    pub fn from_config(config: &AssistantConfig) -> Result<Self, BackendError> {
        let api_key = config
            .openai_api_key
            .clone()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| BackendError::Configuration("OPENAI_API_KEY is not set".to_owned()))?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.probe_timeout)
            .build()
            .map_err(|error| {
                BackendError::Configuration(format!("failed to build OpenAI HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: config.openai_base_url.trim_end_matches('/').to_owned(),
            probe_timeout: config.probe_timeout,
            completion_timeout: config.completion_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn payload(request: &CompletionRequest, stream: bool) -> serde_json::Value {
        json!({
            "model": request.model,
            "messages": request
                .messages
                .iter()
                .map(|message| json!({"role": message.role.as_str(), "content": message.content}))
                .collect::<Vec<_>>(),
            "temperature": request.temperature,
            "stream": stream
        })
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let response = self
            .client
            .get(self.url("/models"))
            .bearer_auth(&self.api_key)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(BackendError::from_response(response).await);
        }

        let parsed: OpenAiModelList = response.json().await.map_err(BackendError::from_reqwest)?;
        Ok(parsed
            .data
            .into_iter()
            .map(|model| ModelInfo::named(model.id))
            .collect())
    }

    async fn send(&self, payload: &serde_json::Value) -> Result<reqwest::Response, BackendError> {
        let response = self
            .client
            .post(self.url("/chat/completions"))
            .bearer_auth(&self.api_key)
            .timeout(self.completion_timeout)
            .json(payload)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(BackendError::from_response(response).await);
        }

        Ok(response)
    }

    async fn try_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, BackendError> {
        let response = self.send(&Self::payload(request, false)).await?;
        let parsed: OpenAiChatResponse = response
            .json()
            .await
            .map_err(|error| BackendError::InvalidResponse(error.to_string()))?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            BackendError::InvalidResponse("missing choices in response".to_owned())
        })?;

        Ok(CompletionResult::Ok {
            content: choice.message.content.unwrap_or_default(),
            meta: ModelMeta {
                model: parsed.model.unwrap_or_else(|| request.model.clone()),
                done: true,
                prompt_eval_count: parsed.usage.as_ref().map(|usage| usage.prompt_tokens),
                eval_count: parsed.usage.as_ref().map(|usage| usage.completion_tokens),
                ..ModelMeta::default()
            },
        })
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Hosted
    }

    async fn is_available(&self) -> bool {
        match self.fetch_models().await {
            Ok(_) => true,
            Err(error) => {
                debug!(backend = self.name(), error = %error, "availability probe failed");
                false
            }
        }
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        match self.fetch_models().await {
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
                debug!(
                    backend = self.name(),
                    model = %request.model,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "completion finished"
                );
                result
            }
            Err(error) => {
                error!(backend = self.name(), error = %error, "completion failed");
                CompletionResult::from(error)
            }
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, BackendError> {
        request
            .validate()
            .map_err(|error| BackendError::InvalidResponse(error.to_string()))?;

        let response = self.send(&Self::payload(&request, true)).await?;
        let mut upstream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = LineBuffer::default();
            let mut done_emitted = false;

            while let Some(next) = upstream.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        let error = BackendError::from_reqwest(error);
                        warn!(error = %error, "stream interrupted");
                        yield StreamFragment::failed(CompletionResult::from(error));
                        done_emitted = true;
                        break;
                    }
                };

                for line in buffer.push(&bytes) {
                    match decode_event(&line) {
                        Some(SseEvent::Done) => {
                            if !done_emitted {
                                yield StreamFragment::finished("");
                                done_emitted = true;
                            }
                        }
                        Some(SseEvent::Fragment(fragment)) => {
                            done_emitted |= fragment.done;
                            yield fragment;
                        }
                        None => continue,
                    }
                }

                if done_emitted {
                    break;
                }
            }

            if !done_emitted {
                yield StreamFragment::finished("");
            }
        };

        debug!(backend = self.name(), "stream prepared");
        Ok(stream.boxed())
    }
}

enum SseEvent {
    Fragment(StreamFragment),
    Done,
}

fn decode_event(line: &str) -> Option<SseEvent> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let parsed: OpenAiStreamResponse = match serde_json::from_str(payload) {
        Ok(parsed) => parsed,
        Err(error) => {
            debug!(error = %error, "skipping malformed stream event");
            return None;
        }
    };

    let choice = parsed.choices.into_iter().next()?;
    Some(SseEvent::Fragment(StreamFragment {
        content: choice.delta.content.unwrap_or_default(),
        done: choice.finish_reason.is_some(),
        error: None,
        kind: None,
    }))
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}
