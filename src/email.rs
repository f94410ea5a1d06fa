use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    models::{CompletionResult, ErrorKind},
    orchestrator::{ChatOrchestrator, DEFAULT_TEMPERATURE},
    prompts::ContextType,
    sections::{extract_sections, EMAIL_LABELS},
};

pub const GENERAL_RESPONSE: &str = "general_response";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EmailTemplate {
    pub email_type: &'static str,
    pub subject: &'static str,
    pub tone: &'static str,
    pub description: &'static str,
}

pub const EMAIL_TEMPLATES: &[EmailTemplate] = &[
    EmailTemplate {
        email_type: "complaint_response",
        subject: "Re: Your Recent Experience with Wiko Cutlery",
        tone: "empathetic and solution-oriented",
        description: "Response to customer complaints with empathy and solutions",
    },
    EmailTemplate {
        email_type: "warranty_inquiry",
        subject: "Wiko Cutlery Warranty Information",
        tone: "informative and helpful",
        description: "Information about product warranties and coverage",
    },
    EmailTemplate {
        email_type: "product_inquiry",
        subject: "Wiko Cutlery Product Information",
        tone: "enthusiastic and informative",
        description: "Details about products, features, and specifications",
    },
    EmailTemplate {
        email_type: "order_status",
        subject: "Your Wiko Cutlery Order Status",
        tone: "professional and reassuring",
        description: "Updates on order processing and shipping",
    },
    EmailTemplate {
        email_type: "thank_you",
        subject: "Thank You for Choosing Wiko Cutlery",
        tone: "grateful and warm",
        description: "Appreciation messages for purchases and loyalty",
    },
];

static GENERIC_TEMPLATE: EmailTemplate = EmailTemplate {
    email_type: GENERAL_RESPONSE,
    subject: "Re: Your Inquiry",
    tone: "professional and helpful",
    description: "General customer service response",
};

pub fn template_for(email_type: &str) -> &'static EmailTemplate {
    EMAIL_TEMPLATES
        .iter()
        .find(|template| template.email_type == email_type)
        .unwrap_or(&GENERIC_TEMPLATE)
}

fn default_email_type() -> String {
    GENERAL_RESPONSE.to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub customer_message: String,
    #[serde(default = "default_email_type")]
    pub email_type: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub order_number: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub context: String,
}

impl EmailRequest {
    pub fn new(customer_message: impl Into<String>, email_type: impl Into<String>) -> Self {
        Self {
            customer_message: customer_message.into(),
            email_type: email_type.into(),
            customer_name: String::new(),
            order_number: String::new(),
            product_name: String::new(),
            context: String::new(),
        }
    }

    fn requires_customer_message(&self) -> bool {
        matches!(self.email_type.as_str(), "complaint_response" | GENERAL_RESPONSE)
    }

    fn context_block(&self) -> String {
        let parts = [
            ("Customer name", &self.customer_name),
            ("Order number", &self.order_number),
            ("Product", &self.product_name),
            ("Additional context", &self.context),
        ]
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(label, value)| format!("{label}: {}", value.trim()))
        .collect::<Vec<_>>();

        if parts.is_empty() {
            "No additional context provided".to_owned()
        } else {
            parts.join("\n")
        }
    }
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Customer message is required for responses")]
    MissingCustomerMessage,
    #[error("{message}")]
    Backend {
        kind: ErrorKind,
        message: String,
        fallback: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedEmail {
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<String>,
    pub full_email: String,
    pub email_type: String,
    pub tone: String,
}

#[derive(Clone)]
pub struct EmailService {
    orchestrator: ChatOrchestrator,
}

impl EmailService {
    pub fn new(orchestrator: ChatOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn templates(&self) -> &'static [EmailTemplate] {
        EMAIL_TEMPLATES
    }

    pub async fn generate(&self, request: &EmailRequest) -> Result<GeneratedEmail, EmailError> {
        if request.requires_customer_message() && request.customer_message.trim().is_empty() {
            return Err(EmailError::MissingCustomerMessage);
        }

        let template = template_for(&request.email_type);
        let prompt = build_prompt(request, template);
        debug!(email_type = %request.email_type, tone = template.tone, "generating email");

        let content = match self
            .orchestrator
            .get_response(&prompt, ContextType::EmailAssistance, None, DEFAULT_TEMPERATURE)
            .await
        {
            CompletionResult::Ok { content, .. } => content,
            CompletionResult::Err {
                kind,
                message,
                fallback,
            } => {
                warn!(error = %message, "email generation failed");
                return Err(EmailError::Backend {
                    kind,
                    message,
                    fallback,
                });
            }
        };

        let (subject, body, suggestions) = split_email(&content, template.subject);
        Ok(GeneratedEmail {
            subject,
            body,
            suggestions,
            full_email: content,
            email_type: request.email_type.clone(),
            tone: template.tone.to_owned(),
        })
    }
}

fn build_prompt(request: &EmailRequest, template: &EmailTemplate) -> String {
    format!(
        "Write a professional email reply for Wiko Cutlery customer service.\n\n\
         Customer Message:\n{message}\n\n\
         Context Information:\n{context}\n\n\
         Email Type: {email_type}\n\
         Tone: {tone}\n\
         Suggested Subject: {subject}\n\n\
         Requirements:\n\
         1. Address the customer's specific concerns\n\
         2. Maintain a {tone} tone\n\
         3. Provide clear next steps or solutions\n\
         4. Close with a signature for Wiko Cutlery\n\n\
         Format as:\n\
         SUBJECT: [subject line]\n\
         BODY: [greeting, body and closing]\n\
         SUGGESTIONS: [optional notes for the employee]",
        message = request.customer_message.trim(),
        context = request.context_block(),
        email_type = request.email_type,
        tone = template.tone,
        subject = template.subject,
    )
}

/// Labelled output when a BODY section exists, otherwise a plain
/// `Subject:` line followed by the body.
fn split_email(content: &str, default_subject: &str) -> (String, String, Option<String>) {
    let sections = extract_sections(content, EMAIL_LABELS);
    if let Some(body) = sections.found("BODY") {
        let subject = sections
            .found("SUBJECT")
            .and_then(|subject| subject.lines().next())
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .unwrap_or(default_subject);
        return (
            subject.to_owned(),
            body.to_owned(),
            sections.found("SUGGESTIONS").map(str::to_owned),
        );
    }

    let mut subject = None;
    let mut body = Vec::new();
    for line in content.lines() {
        match line.trim().strip_prefix("Subject:") {
            Some(rest) if subject.is_none() => subject = Some(rest.trim().to_owned()),
            _ => body.push(line),
        }
    }

    (
        subject
            .filter(|subject| !subject.is_empty())
            .unwrap_or_else(|| default_subject.to_owned()),
        body.join("\n").trim().to_owned(),
        None,
    )
}
