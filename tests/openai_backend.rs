use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use business_assistant::{
    backend::{openai::OpenAiBackend, BackendKind, ModelBackend},
    config::{AssistantConfig, Provider},
    models::{CompletionRequest, CompletionResult, ErrorKind, TRANSPORT_FALLBACK},
    selector::select_backend,
};
use futures_util::StreamExt;
use serde_json::{json, Value};

const API_KEY: &str = "test-key";

const STREAM_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hal\"}}]}\n\n",
    "data: {not json\n\n",
    ": keep-alive\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
    "data: [DONE]\n\n",
);

const FINISHING_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"end\"},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

const TRUNCATED_BODY: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {API_KEY}"))
}

async fn models(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    Json(json!({
        "object": "list",
        "data": [
            { "id": "gpt-4", "object": "model" },
            { "id": "gpt-4o-mini", "object": "model" }
        ]
    }))
    .into_response()
}

fn event_stream(body: &'static str) -> Response {
    ([(CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn chat_completions(headers: HeaderMap, Json(payload): Json<Value>) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }

    let model = payload["model"].as_str().unwrap_or_default();
    if payload["stream"] == true {
        return match model {
            "finishing" => event_stream(FINISHING_BODY),
            "truncated" => event_stream(TRUNCATED_BODY),
            _ => event_stream(STREAM_BODY),
        };
    }

    match model {
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
        "empty" => Json(json!({ "model": "empty", "choices": [] })).into_response(),
        _ => {
            let messages = payload["messages"].as_array().cloned().unwrap_or_default();
            let last = messages
                .last()
                .and_then(|message| message["content"].as_str())
                .unwrap_or_default()
                .to_owned();
            Json(json!({
                "model": "gpt-4-0613",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": format!("echo: {last} ({} messages)", messages.len())
                    },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
            }))
            .into_response()
        }
    }
}

async fn spawn_stub() -> String {
    let app = Router::new()
        .route("/models", get(models))
        .route("/chat/completions", post(chat_completions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub server");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    format!("http://{addr}")
}

fn config(url: &str, key: &str) -> AssistantConfig {
    AssistantConfig {
        provider: Provider::OpenAi,
        openai_api_key: Some(key.to_owned()),
        openai_base_url: url.to_owned(),
        probe_timeout: Duration::from_secs(2),
        completion_timeout: Duration::from_secs(5),
        ..AssistantConfig::default()
    }
}

fn backend(url: &str) -> OpenAiBackend {
    OpenAiBackend::from_config(&config(url, API_KEY)).expect("backend")
}

async fn stream_contents(backend: &OpenAiBackend, model: &str) -> Vec<(String, bool)> {
    let request = CompletionRequest::single_shot(model, None, "hello", 0.7).streaming();
    backend
        .stream(request)
        .await
        .expect("stream opens")
        .map(|fragment| {
            assert!(fragment.error.is_none());
            (fragment.content, fragment.done)
        })
        .collect::<Vec<_>>()
        .await
}

#[tokio::test]
async fn probe_and_model_list_use_bearer_auth() {
    let url = spawn_stub().await;
    let backend = backend(&url);

    assert!(backend.is_available().await);
    let names = backend
        .list_models()
        .await
        .into_iter()
        .map(|model| model.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["gpt-4", "gpt-4o-mini"]);

    let rejected = OpenAiBackend::from_config(&config(&url, "wrong-key")).expect("backend");
    assert!(!rejected.is_available().await);
    assert!(rejected.list_models().await.is_empty());
}

#[tokio::test]
async fn completion_takes_first_choice_and_maps_usage() {
    let backend = backend(&spawn_stub().await);
    let request = CompletionRequest::single_shot("gpt-4", Some("be brief"), "hello", 0.2);

    match backend.complete(request).await {
        CompletionResult::Ok { content, meta } => {
            assert_eq!(content, "echo: hello (2 messages)");
            assert_eq!(meta.model, "gpt-4-0613");
            assert!(meta.done);
            assert_eq!(meta.prompt_eval_count, Some(12));
            assert_eq!(meta.eval_count, Some(3));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn empty_choices_become_fallback_text() {
    let backend = backend(&spawn_stub().await);

    let result = backend
        .complete(CompletionRequest::single_shot("empty", None, "hello", 0.7))
        .await;

    assert_eq!(result.text(), TRANSPORT_FALLBACK);
    assert_eq!(result.error_kind(), Some(ErrorKind::Transport));
    assert!(result
        .error_message()
        .is_some_and(|message| message.contains("missing choices")));
}

#[tokio::test]
async fn non_success_status_becomes_fallback_text() {
    let url = spawn_stub().await;

    let result = backend(&url)
        .complete(CompletionRequest::single_shot("broken", None, "hello", 0.7))
        .await;
    assert_eq!(result.text(), TRANSPORT_FALLBACK);
    assert!(result
        .error_message()
        .is_some_and(|message| message.contains("500")));

    let unauthorized = OpenAiBackend::from_config(&config(&url, "wrong-key"))
        .expect("backend")
        .complete(CompletionRequest::single_shot("gpt-4", None, "hello", 0.7))
        .await;
    assert!(unauthorized
        .error_message()
        .is_some_and(|message| message.contains("401")));
}

#[tokio::test]
async fn stream_skips_malformed_events_and_ends_at_done_marker() {
    let backend = backend(&spawn_stub().await);

    let fragments = stream_contents(&backend, "gpt-4").await;

    assert_eq!(
        fragments,
        vec![
            ("Hal".to_owned(), false),
            ("lo".to_owned(), false),
            (String::new(), true),
        ]
    );
}

#[tokio::test]
async fn finish_reason_ends_the_stream_once() {
    let backend = backend(&spawn_stub().await);

    let fragments = stream_contents(&backend, "finishing").await;

    assert_eq!(fragments, vec![("end".to_owned(), true)]);
}

#[tokio::test]
async fn stream_without_terminal_event_gets_synthetic_end() {
    let backend = backend(&spawn_stub().await);

    let fragments = stream_contents(&backend, "truncated").await;

    assert_eq!(
        fragments,
        vec![("partial".to_owned(), false), (String::new(), true)]
    );
}

#[tokio::test]
async fn stream_open_failure_is_an_error() {
    let url = spawn_stub().await;
    let rejected = OpenAiBackend::from_config(&config(&url, "wrong-key")).expect("backend");

    let stream = rejected
        .stream(CompletionRequest::single_shot("gpt-4", None, "hello", 0.7).streaming())
        .await;

    assert!(stream.is_err());
}

#[tokio::test]
async fn selector_uses_hosted_backend_when_reachable() {
    let selected = select_backend(&config(&spawn_stub().await, API_KEY)).await;

    assert_eq!(selected.kind(), BackendKind::Hosted);
    assert_eq!(selected.model, "gpt-4");
}
