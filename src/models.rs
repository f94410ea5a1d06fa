use serde::{Deserialize, Serialize};

pub const TRANSPORT_FALLBACK: &str =
    "I'm sorry, I'm having trouble connecting to the AI service. Please try again later.";
pub const UNAVAILABLE_FALLBACK: &str =
    "I'm sorry, the AI service is currently unavailable. Please check that the model service is running and try again.";

/// Entries kept from a persisted conversation when it is replayed to the model.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

/// A prior conversation turn. History can never carry a system message.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

impl From<HistoryEntry> for ChatMessage {
    fn from(entry: HistoryEntry) -> Self {
        let role = match entry.role {
            HistoryRole::User => MessageRole::User,
            HistoryRole::Assistant => MessageRole::Assistant,
        };
        ChatMessage {
            role,
            content: entry.content,
        }
    }
}

/// Ordered conversation turns, most recent last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    entries: Vec<HistoryEntry>,
}

impl ConversationHistory {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }

    /// Keeps only the last `limit` entries.
    pub fn bounded(mut entries: Vec<HistoryEntry>, limit: usize) -> Self {
        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn into_messages(self) -> impl Iterator<Item = ChatMessage> {
        self.entries.into_iter().map(ChatMessage::from)
    }
}

/// Which upstream call shape a request maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    /// Prompt plus optional system string.
    SingleShot,
    /// Full message sequence.
    Chat,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("model is required")]
    MissingModel,
    #[error("a request must contain a user message")]
    MissingUserMessage,
    #[error("system message must be unique and placed first")]
    MisplacedSystemMessage,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub stream: bool,
    pub shape: RequestShape,
}

impl CompletionRequest {
    pub fn single_shot(
        model: impl Into<String>,
        system: Option<&str>,
        prompt: impl Into<String>,
        temperature: f32,
    ) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        Self {
            model: model.into(),
            messages,
            temperature: clamp_temperature(temperature),
            stream: false,
            shape: RequestShape::SingleShot,
        }
    }

    pub fn chat(
        model: impl Into<String>,
        system: &str,
        history: ConversationHistory,
        message: impl Into<String>,
        temperature: f32,
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.into_messages());
        messages.push(ChatMessage::user(message));
        Self {
            model: model.into(),
            messages,
            temperature: clamp_temperature(temperature),
            stream: false,
            shape: RequestShape::Chat,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.model.trim().is_empty() {
            return Err(RequestError::MissingModel);
        }
        let misplaced_system = self
            .messages
            .iter()
            .enumerate()
            .any(|(index, message)| message.role == MessageRole::System && index != 0);
        if misplaced_system {
            return Err(RequestError::MisplacedSystemMessage);
        }
        if self.last_user_message().is_none() {
            return Err(RequestError::MissingUserMessage);
        }
        Ok(())
    }

    pub fn system_message(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|message| message.role == MessageRole::System)
            .map(|message| message.content.as_str())
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .map(|message| message.content.as_str())
    }
}

pub fn clamp_temperature(value: f32) -> f32 {
    if value.is_nan() {
        return 0.7;
    }
    value.clamp(0.0, 1.0)
}

/// Timing and token accounting reported by the model service.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ModelMeta {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
}

/// Why a completion produced fallback text instead of model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The backend was called and failed: connection, timeout, status or decoding.
    Transport,
    /// The availability probe failed, so the backend was never called.
    Unavailable,
}

impl ErrorKind {
    /// Metrics label for this failure.
    pub fn outcome(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "error",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

/// Outcome of a completion. Both variants carry displayable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    Ok {
        content: String,
        meta: ModelMeta,
    },
    Err {
        kind: ErrorKind,
        message: String,
        fallback: String,
    },
}

impl CompletionResult {
    pub fn transport_failure(message: impl Into<String>) -> Self {
        CompletionResult::Err {
            kind: ErrorKind::Transport,
            message: message.into(),
            fallback: TRANSPORT_FALLBACK.to_owned(),
        }
    }

    pub fn service_unavailable() -> Self {
        CompletionResult::Err {
            kind: ErrorKind::Unavailable,
            message: "AI service is not available".to_owned(),
            fallback: UNAVAILABLE_FALLBACK.to_owned(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CompletionResult::Ok { .. })
    }

    /// User-facing text: model output or the fallback sentence.
    pub fn text(&self) -> &str {
        match self {
            CompletionResult::Ok { content, .. } => content,
            CompletionResult::Err { fallback, .. } => fallback,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            CompletionResult::Ok { .. } => None,
            CompletionResult::Err { kind, .. } => Some(*kind),
        }
    }

    /// Metrics label: `ok`, `unavailable` for the availability short-circuit, else `error`.
    pub fn outcome(&self) -> &'static str {
        self.error_kind().map_or("ok", |kind| kind.outcome())
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            CompletionResult::Ok { .. } => None,
            CompletionResult::Err { message, .. } => Some(message),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            CompletionResult::Ok { content, .. } => content,
            CompletionResult::Err { fallback, .. } => fallback,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

impl ModelInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            modified_at: None,
        }
    }
}

/// One piece of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub content: String,
    pub done: bool,
    pub error: Option<String>,
    pub kind: Option<ErrorKind>,
}

impl StreamFragment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
            error: None,
            kind: None,
        }
    }

    pub fn finished(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: true,
            error: None,
            kind: None,
        }
    }

    /// Terminal fragment carrying fallback text in place of model output.
    pub fn failed(result: CompletionResult) -> Self {
        let error = result.error_message().map(ToOwned::to_owned);
        let kind = result.error_kind();
        Self {
            content: result.into_text(),
            done: true,
            error,
            kind,
        }
    }

    /// Metrics label for a stream ending in this fragment.
    pub fn outcome(&self) -> &'static str {
        self.kind.map_or("ok", |kind| kind.outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded_to_most_recent_entries() {
        let entries = (0..14)
            .map(|index| HistoryEntry {
                role: if index % 2 == 0 {
                    HistoryRole::User
                } else {
                    HistoryRole::Assistant
                },
                content: format!("turn {index}"),
            })
            .collect::<Vec<_>>();

        let history = ConversationHistory::bounded(entries, HISTORY_LIMIT);

        assert_eq!(history.len(), 10);
        assert_eq!(history.entries()[0].content, "turn 4");
        assert_eq!(history.entries()[9].content, "turn 13");
    }

    #[test]
    fn chat_request_places_single_system_message_first() {
        let history = ConversationHistory::new(vec![
            HistoryEntry {
                role: HistoryRole::User,
                content: "hi".to_owned(),
            },
            HistoryEntry {
                role: HistoryRole::Assistant,
                content: "hello".to_owned(),
            },
        ]);

        let request = CompletionRequest::chat("llama3:8b", "be nice", history, "next", 0.7);

        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.system_message(), Some("be nice"));
        assert_eq!(request.last_user_message(), Some("next"));
        assert_eq!(request.shape, RequestShape::Chat);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn validation_rejects_late_system_message() {
        let mut request = CompletionRequest::single_shot("m", None, "hi", 0.5);
        request.messages.push(ChatMessage::system("late"));

        assert_eq!(
            request.validate(),
            Err(RequestError::MisplacedSystemMessage)
        );
    }

    #[test]
    fn temperature_is_clamped_to_unit_range() {
        assert_eq!(clamp_temperature(1.8), 1.0);
        assert_eq!(clamp_temperature(-0.2), 0.0);
        assert_eq!(clamp_temperature(0.3), 0.3);
    }

    #[test]
    fn error_result_always_exposes_fallback_text() {
        let result = CompletionResult::transport_failure("connection refused");

        assert!(!result.is_ok());
        assert_eq!(result.text(), TRANSPORT_FALLBACK);
        assert_eq!(result.error_message(), Some("connection refused"));
    }

    #[test]
    fn outcome_separates_short_circuit_from_failure() {
        assert_eq!(CompletionResult::service_unavailable().outcome(), "unavailable");
        assert_eq!(CompletionResult::transport_failure("timeout").outcome(), "error");
        assert_eq!(
            CompletionResult::service_unavailable().error_kind(),
            Some(ErrorKind::Unavailable)
        );
    }

    #[test]
    fn failure_kind_does_not_depend_on_fallback_text() {
        let result = CompletionResult::Err {
            kind: ErrorKind::Unavailable,
            message: "probe failed".to_owned(),
            fallback: "Try again soon.".to_owned(),
        };

        assert_eq!(result.outcome(), "unavailable");
        assert_eq!(result.text(), "Try again soon.");
    }
}
