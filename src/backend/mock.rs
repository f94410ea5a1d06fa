use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::{sync::mpsc, time::sleep};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::{
    backend::{BackendError, BackendKind, FragmentStream, ModelBackend},
    models::{CompletionRequest, CompletionResult, ModelInfo, ModelMeta, StreamFragment},
};

const MOCK_CREATED_AT: &str = "2025-01-30T12:00:00Z";

pub const GENERAL_REPLY: &str = "I'm a helpful AI assistant for Wiko cutlery employees. I can help with document analysis, translations, email responses, and complaint handling. How can I assist you today?";

pub const GERMAN_REPLY: &str =
    "Vielen Dank für Ihren Kauf. Ihre Bestellung wird innerhalb von 2 Werktagen versandt.";
pub const FRENCH_REPLY: &str =
    "Merci pour votre achat. Votre commande sera expédiée dans les 2 jours ouvrables.";
pub const ENGLISH_REPLY: &str =
    "Thank you for your purchase. Your order will be shipped within 2 business days.";

pub const ANALYSIS_REPLY: &str = "SUMMARY: This appears to be a business report containing sales data, customer feedback, and contact information for Wiko Cutlery.

KEY POINTS:
- Revenue performance shows strong Q4 results at $125,000
- Low complaint rate (only 3 complaints) indicates good product quality
- Premium Chef Knife Set launch

BUSINESS INSIGHTS:
- New product launch suggests business expansion
- Positive customer feedback highlights product durability

ACTION ITEMS:
1. Continue monitoring customer feedback for the new product line
2. Investigate the 3 complaints to prevent future issues
3. Leverage positive testimonials in marketing materials
4. Consider expanding the premium product line based on Q4 success

RISK ASSESSMENT: Low. Complaint volume is small but should be tracked after the launch.";

pub const EMAIL_REPLY: &str = "Subject: Re: Your Recent Experience with Wiko Cutlery

Dear Valued Customer,

Thank you for taking the time to share your concerns about your recent Wiko Cutlery purchase. We sincerely apologize for any inconvenience you've experienced.

To resolve this matter promptly, I would like to offer the following solutions:

1. Immediate Replacement: We'll send you a replacement product at no charge
2. Quality Inspection: Our team will review your specific product batch
3. Care Instructions: We'll provide detailed maintenance guidelines

Please reply with your order number and preferred shipping address, and we'll process your replacement within 24 hours.

Best regards,

Customer Service Team
Wiko Cutlery Inc.";

pub const COMPLAINT_REPLY: &str = "**Complaint Analysis Report**

COMPLAINT ANALYSIS: Product quality concern, medium severity.
- Knife becoming dull quickly
- Loose handle

RESPONSE STRATEGY: Respond within 2 hours, acknowledge the frustration and offer a replacement.

EMPATHY IMPROVEMENTS: Acknowledge the inconvenience caused and validate the customer's expectations for quality.

ESCALATION GUIDANCE: If the customer remains unsatisfied after replacement, escalate to a manager.

PREVENTION MEASURES: Run a quality control review of the product batch and update care instructions.

IMPROVED RESPONSE: We are sorry your knife did not meet your expectations. A replacement is on its way and we will follow up in one week.";

struct CannedRoute {
    keywords: &'static [&'static str],
    reply: CannedReply,
}

enum CannedReply {
    Fixed(&'static str),
    Translation,
}

/// Checked in order; the first route whose keyword appears wins.
const ROUTES: &[CannedRoute] = &[
    CannedRoute {
        keywords: &["translate", "german", "french", "übersetzen"],
        reply: CannedReply::Translation,
    },
    CannedRoute {
        keywords: &["analyze", "document", "pdf", "business"],
        reply: CannedReply::Fixed(ANALYSIS_REPLY),
    },
    CannedRoute {
        keywords: &["email", "response", "customer", "letter"],
        reply: CannedReply::Fixed(EMAIL_REPLY),
    },
    CannedRoute {
        keywords: &["complaint", "issue", "problem", "dissatisfied"],
        reply: CannedReply::Fixed(COMPLAINT_REPLY),
    },
];

const TRANSLATIONS: &[(&[&str], &str)] = &[
    (&["german", "deutsch"], GERMAN_REPLY),
    (&["french", "français"], FRENCH_REPLY),
];

/// Picks the canned reply for a prompt by keyword containment.
pub fn canned_reply(prompt: &str) -> &'static str {
    let lowered = prompt.to_lowercase();

    let Some(route) = ROUTES
        .iter()
        .find(|route| contains_any(&lowered, route.keywords))
    else {
        return GENERAL_REPLY;
    };

    match route.reply {
        CannedReply::Fixed(text) => text,
        CannedReply::Translation => TRANSLATIONS
            .iter()
            .find(|(keywords, _)| contains_any(&lowered, keywords))
            .map(|(_, text)| *text)
            .unwrap_or(ENGLISH_REPLY),
    }
}

/// Network-free backend returning canned replies after an artificial delay.
#[derive(Debug, Clone)]
pub struct MockBackend {
    name: String,
    latency: Duration,
    token_delay: Duration,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            name: "mock-backend".to_owned(),
            latency: Duration::from_millis(500),
            token_delay: Duration::from_millis(35),
        }
    }
}

impl MockBackend {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            token_delay: latency.min(Duration::from_millis(35)),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        vec![
            ModelInfo {
                name: "llama3:8b".to_owned(),
                size: Some(4_661_224_676),
                modified_at: None,
            },
            ModelInfo {
                name: "mistral:7b".to_owned(),
                size: Some(4_109_865_159),
                modified_at: None,
            },
        ]
    }

    async fn complete(&self, request: CompletionRequest) -> CompletionResult {
        sleep(self.latency).await;

        let prompt = request.last_user_message().unwrap_or_default();
        let content = canned_reply(prompt);
        let prompt_words = word_count(prompt);
        debug!(backend = %self.name, shape = ?request.shape, "mock completion served");

        CompletionResult::Ok {
            content: content.to_owned(),
            meta: ModelMeta {
                model: request.model,
                created_at: Some(MOCK_CREATED_AT.to_owned()),
                done: true,
                total_duration: Some(500_000_000),
                load_duration: Some(100_000_000),
                prompt_eval_count: Some(prompt_words),
                prompt_eval_duration: Some(50_000_000),
                eval_count: Some(word_count(content)),
                eval_duration: Some(400_000_000),
            },
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, BackendError> {
        let content = canned_reply(request.last_user_message().unwrap_or_default());
        let delay = self.token_delay;
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            for token in split_for_stream(content) {
                if tx.send(StreamFragment::text(token)).await.is_err() {
                    return;
                }
                sleep(delay).await;
            }

            let _ = tx.send(StreamFragment::finished("")).await;
        });

        debug!(backend = %self.name, "stream prepared");
        Ok(ReceiverStream::new(rx).boxed())
    }
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| haystack.contains(keyword))
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn split_for_stream(text: &str) -> Vec<String> {
    let tokens: Vec<String> = text.split_whitespace().map(ToString::to_string).collect();
    let len = tokens.len();

    tokens
        .into_iter()
        .enumerate()
        .map(|(index, token)| {
            if index + 1 == len {
                token
            } else {
                format!("{token} ")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_keywords_win_over_later_routes() {
        assert_eq!(canned_reply("Translate this customer email to German"), GERMAN_REPLY);
        assert_eq!(canned_reply("please translate into French"), FRENCH_REPLY);
        assert_eq!(canned_reply("translate this"), ENGLISH_REPLY);
    }

    #[test]
    fn classification_order_is_analysis_email_complaint_general() {
        assert_eq!(canned_reply("Analyze the complaint"), ANALYSIS_REPLY);
        assert_eq!(canned_reply("Write a customer letter about the problem"), EMAIL_REPLY);
        assert_eq!(canned_reply("The handle is loose and I'm dissatisfied"), COMPLAINT_REPLY);
        assert_eq!(canned_reply("hello there"), GENERAL_REPLY);
    }

    #[tokio::test]
    async fn identical_requests_yield_identical_output() {
        let backend = MockBackend::with_latency(Duration::from_millis(1));
        let request =
            CompletionRequest::single_shot("llama3:8b", Some("sys"), "What is a PDF?", 0.7);

        let first = backend.complete(request.clone()).await;
        let second = backend.complete(request).await;

        assert_eq!(first, second);
        assert_eq!(first.text(), ANALYSIS_REPLY);
    }

    #[tokio::test]
    async fn stream_reassembles_canned_reply() {
        let backend = MockBackend::with_latency(Duration::ZERO);
        let request = CompletionRequest::single_shot("llama3:8b", None, "hello", 0.7);

        let fragments = backend
            .stream(request)
            .await
            .expect("mock stream opens")
            .collect::<Vec<_>>()
            .await;

        let text = fragments
            .iter()
            .map(|fragment| fragment.content.as_str())
            .collect::<String>();
        assert_eq!(text, GENERAL_REPLY);
        assert!(fragments.last().is_some_and(|fragment| fragment.done));
    }
}
