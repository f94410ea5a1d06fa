use std::{env, net::SocketAddr, time::Duration};

use crate::backend::ollama::DEFAULT_BASE_URL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
}

impl Provider {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Provider::OpenAi,
            _ => Provider::Ollama,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub use_mock: bool,
    pub provider: Provider,
    pub ollama_url: String,
    pub preferred_model: String,
    pub fallback_model: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub probe_timeout: Duration,
    pub completion_timeout: Duration,
    pub mock_latency: Duration,
    pub max_concurrency: usize,
    pub bind_addr: SocketAddr,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            use_mock: false,
            provider: Provider::Ollama,
            ollama_url: DEFAULT_BASE_URL.to_owned(),
            preferred_model: "llama3:8b".to_owned(),
            fallback_model: "mistral:7b".to_owned(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_owned(),
            openai_model: "gpt-4".to_owned(),
            probe_timeout: Duration::from_secs(5),
            completion_timeout: Duration::from_secs(60),
            mock_latency: Duration::from_millis(500),
            max_concurrency: 8,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            use_mock: read_bool("USE_MOCK_SERVICES", defaults.use_mock),
            provider: env::var("AI_PROVIDER")
                .map(|value| Provider::parse(&value))
                .unwrap_or(defaults.provider),
            ollama_url: read_string("OLLAMA_URL", defaults.ollama_url),
            preferred_model: read_string("OLLAMA_MODEL", defaults.preferred_model),
            fallback_model: read_string("OLLAMA_FALLBACK_MODEL", defaults.fallback_model),
            openai_api_key: env::var("OPENAI_API_KEY")
                .ok()
                .filter(|value| !value.is_empty()),
            openai_base_url: read_string("OPENAI_API_BASE", defaults.openai_base_url),
            openai_model: read_string("OPENAI_MODEL", defaults.openai_model),
            probe_timeout: Duration::from_secs(read_u64("ASSISTANT_PROBE_TIMEOUT_SECS", 5)),
            completion_timeout: Duration::from_secs(read_u64(
                "ASSISTANT_COMPLETION_TIMEOUT_SECS",
                60,
            )),
            mock_latency: Duration::from_millis(read_u64("ASSISTANT_MOCK_LATENCY_MS", 500)),
            max_concurrency: read_u64("ASSISTANT_MAX_CONCURRENCY", 8).max(1) as usize,
            bind_addr: env::var("ASSISTANT_BIND_ADDR")
                .ok()
                .and_then(|value| value.parse::<SocketAddr>().ok())
                .unwrap_or(defaults.bind_addr),
        }
    }

    /// Model requested from the preferred backend before any fallback.
    pub fn preferred_model_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::Ollama => &self.preferred_model,
            Provider::OpenAi => &self.openai_model,
        }
    }
}

fn read_string(name: &str, default: String) -> String {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
}

fn read_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn read_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}
