use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    models::{CompletionResult, ErrorKind},
    orchestrator::ChatOrchestrator,
    prompts::ContextType,
};

const TRANSLATION_TEMPERATURE: f32 = 0.3;

pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("de", "German"),
    ("fr", "French"),
    ("auto", "Auto-detect"),
];

const INDICATORS: &[(&str, &[&str])] = &[
    (
        "en",
        &["the", "and", "is", "with", "for", "of", "on", "to", "i", "you", "we", "they"],
    ),
    (
        "de",
        &["der", "die", "das", "und", "ist", "mit", "für", "von", "auf", "zu", "ich", "sie", "wir"],
    ),
    (
        "fr",
        &["le", "la", "les", "et", "est", "avec", "pour", "de", "sur", "à", "je", "il", "nous"],
    ),
];

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Empty text provided")]
    EmptyText,
    #[error("Unsupported target language: {0}")]
    UnsupportedTarget(String),
    #[error("Unsupported source language: {0}")]
    UnsupportedSource(String),
    #[error("{message}")]
    Backend {
        kind: ErrorKind,
        message: String,
        fallback: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMethod {
    Ai,
    NoTranslationNeeded,
}

#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub translated_text: String,
    pub source_language: String,
    pub target_language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
    pub method: TranslationMethod,
}

pub fn language_name(code: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, name)| *name)
}

/// Scores common function words per language; no hits reads as English.
pub fn detect_language(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    let words = lowered
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();

    let mut best = ("en", 0usize);
    for (code, indicators) in INDICATORS {
        let score = indicators
            .iter()
            .filter(|indicator| words.contains(*indicator))
            .count();
        if score > best.1 {
            best = (*code, score);
        }
    }
    best.0
}

#[derive(Clone)]
pub struct TranslationService {
    orchestrator: ChatOrchestrator,
}

impl TranslationService {
    pub fn new(orchestrator: ChatOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn supported_languages(&self) -> &'static [(&'static str, &'static str)] {
        SUPPORTED_LANGUAGES
    }

    pub async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<Translation, TranslationError> {
        if text.trim().is_empty() {
            return Err(TranslationError::EmptyText);
        }

        if source == target {
            return Ok(Translation {
                translated_text: text.to_owned(),
                source_language: source.to_owned(),
                target_language: target.to_owned(),
                detected_language: None,
                method: TranslationMethod::NoTranslationNeeded,
            });
        }

        let target_name = language_name(target)
            .filter(|_| target != "auto")
            .ok_or_else(|| TranslationError::UnsupportedTarget(target.to_owned()))?;
        let source_name = language_name(source)
            .ok_or_else(|| TranslationError::UnsupportedSource(source.to_owned()))?;

        let (source_name, detected) = if source == "auto" {
            let detected = detect_language(text);
            debug!(detected, "detected source language");
            (language_name(detected).unwrap_or("English"), Some(detected.to_owned()))
        } else {
            (source_name, None)
        };

        let prompt = format!(
            "Translate the following text from {source_name} to {target_name}.\n\
             Maintain professional tone and business context.\n\
             Preserve any technical terms related to cutlery, kitchenware, or business.\n\n\
             Text to translate:\n{text}\n\nTranslation:"
        );

        let result = self
            .orchestrator
            .get_response(&prompt, ContextType::Translation, None, TRANSLATION_TEMPERATURE)
            .await;

        match result {
            CompletionResult::Ok { content, .. } => Ok(Translation {
                translated_text: clean_translation(&content),
                source_language: source.to_owned(),
                target_language: target.to_owned(),
                detected_language: detected,
                method: TranslationMethod::Ai,
            }),
            CompletionResult::Err {
                kind,
                message,
                fallback,
            } => {
                warn!(error = %message, "translation failed");
                Err(TranslationError::Backend {
                    kind,
                    message,
                    fallback,
                })
            }
        }
    }
}

/// Keeps the first line that is not a label or preamble.
fn clean_translation(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty() && !line.starts_with("Translation:") && !line.starts_with("Here")
        })
        .unwrap_or_else(|| raw.trim())
        .to_owned()
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::backend::mock::{MockBackend, GERMAN_REPLY};

    fn service() -> TranslationService {
        TranslationService::new(ChatOrchestrator::new(
            Arc::new(MockBackend::with_latency(Duration::from_millis(1))),
            "llama3:8b",
        ))
    }

    #[test]
    fn detects_common_languages() {
        assert_eq!(detect_language("Der Kunde ist mit der Lieferung zufrieden"), "de");
        assert_eq!(detect_language("Nous avons reçu la commande et le paiement"), "fr");
        assert_eq!(detect_language("The order is on the way to you"), "en");
        assert_eq!(detect_language("12345"), "en");
    }

    #[test]
    fn cleanup_drops_preamble_lines() {
        let raw = "Here is the translation:\n\nTranslation: \nBonjour tout le monde\nextra";
        assert_eq!(clean_translation(raw), "Bonjour tout le monde");
    }

    #[tokio::test]
    async fn same_language_is_returned_unchanged() {
        let translation = service()
            .translate("Hello", "en", "en")
            .await
            .expect("no translation needed");

        assert_eq!(translation.translated_text, "Hello");
        assert_eq!(translation.method, TranslationMethod::NoTranslationNeeded);
    }

    #[tokio::test]
    async fn rejects_empty_and_unsupported_input() {
        let service = service();

        assert!(matches!(
            service.translate("   ", "en", "de").await,
            Err(TranslationError::EmptyText)
        ));
        assert!(matches!(
            service.translate("Hello", "en", "es").await,
            Err(TranslationError::UnsupportedTarget(_))
        ));
        assert!(matches!(
            service.translate("Hello", "xx", "de").await,
            Err(TranslationError::UnsupportedSource(_))
        ));
    }

    #[tokio::test]
    async fn translates_through_the_backend() {
        let translation = service()
            .translate("Thank you for your purchase.", "auto", "de")
            .await
            .expect("translation succeeds");

        assert_eq!(translation.translated_text, GERMAN_REPLY);
        assert_eq!(translation.detected_language.as_deref(), Some("en"));
        assert_eq!(translation.method, TranslationMethod::Ai);
    }
}
