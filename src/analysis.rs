//! Document and complaint analysis on top of the chat orchestrator.
//!
//! Documents are pre-scanned for business data (dates, amounts, contacts,
//! companies, product terms) which is folded into the prompt; the model's
//! answer is split into the labelled sections the prompt asks for.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    models::{CompletionResult, ErrorKind},
    orchestrator::{ChatOrchestrator, DEFAULT_TEMPERATURE},
    prompts::{ContextType, PromptRegistry},
    sections::{extract_sections, COMPLAINT_LABELS, PDF_ANALYSIS_LABELS},
};

const PREVIEW_CHARS: usize = 4000;

const COMPLAINT_REPORT_FORMAT: &str = "Structure your answer as a Complaint Analysis Report \
with these headings:
COMPLAINT ANALYSIS: severity (Low/Medium/High/Critical) and main concerns
RESPONSE STRATEGY:
EMPATHY IMPROVEMENTS:
ESCALATION GUIDANCE:
PREVENTION MEASURES:
IMPROVED RESPONSE:";

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",
        r"\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b",
        r"(?i)\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]* \d{1,2},? \d{4}\b",
    ])
});

static AMOUNT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\$\d{1,3}(?:,\d{3})*(?:\.\d{2})?",
        r"€\d{1,3}(?:,\d{3})*(?:\.\d{2})?",
        r"(?i)\b\d{1,3}(?:,\d{3})*(?:\.\d{2})?\s*(?:usd|eur|gbp|dollars?|euros?)\b",
    ])
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid regex")
});

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\+?1[-.\s]?)?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b")
        .expect("valid regex")
});

static COMPANY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][a-z]+ (?:Inc|LLC|Corp|Corporation|Company|Co|Ltd|Limited|GmbH|AG)\b")
        .expect("valid regex")
});

const KEY_TERMS: &[&str] = &[
    "knife",
    "knives",
    "fork",
    "spoon",
    "cutlery",
    "kitchen",
    "cooking",
    "chef",
    "blade",
    "handle",
    "stainless steel",
    "dishwasher safe",
    "warranty",
    "quality",
    "sharpening",
    "maintenance",
    "care instructions",
];

static KEY_TERM_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    KEY_TERMS
        .iter()
        .map(|term| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(term));
            (*term, Regex::new(&pattern).expect("valid regex"))
        })
        .collect()
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid regex"))
        .collect()
}

/// Business facts pulled out of document text, each list de-duplicated in
/// order of first appearance.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BusinessData {
    pub dates: Vec<String>,
    pub amounts: Vec<String>,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub companies: Vec<String>,
    pub key_terms: Vec<String>,
}

impl BusinessData {
    pub fn extract(text: &str) -> Self {
        Self {
            dates: find_all(DATE_PATTERNS.iter(), text),
            amounts: find_all(AMOUNT_PATTERNS.iter(), text),
            emails: find_all(std::iter::once(&*EMAIL_PATTERN), text),
            phone_numbers: find_all(std::iter::once(&*PHONE_PATTERN), text),
            companies: find_all(std::iter::once(&*COMPANY_PATTERN), text),
            key_terms: KEY_TERM_PATTERNS
                .iter()
                .filter(|(_, pattern)| pattern.is_match(text))
                .map(|(term, _)| (*term).to_owned())
                .collect(),
        }
    }
}

fn find_all<'a>(patterns: impl Iterator<Item = &'a Regex>, text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for pattern in patterns {
        for hit in pattern.find_iter(text) {
            if !found.iter().any(|existing| existing == hit.as_str()) {
                found.push(hit.as_str().to_owned());
            }
        }
    }
    found
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Document text is empty")]
    EmptyDocument,
    #[error("Complaint text is required")]
    EmptyComplaint,
    #[error("{message}")]
    Backend {
        kind: ErrorKind,
        message: String,
        fallback: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnalysisSection {
    pub label: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentAnalysis {
    pub filename: String,
    pub word_count: usize,
    pub business_data: BusinessData,
    pub sections: Vec<AnalysisSection>,
    pub full_analysis: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplaintAnalysis {
    pub complaint_text: String,
    pub sections: Vec<AnalysisSection>,
    pub full_analysis: String,
}

#[derive(Clone)]
pub struct AnalysisService {
    orchestrator: ChatOrchestrator,
    complaints: ChatOrchestrator,
}

impl AnalysisService {
    /// Complaint requests carry the report headings in their system prompt, so
    /// the user turn holds nothing but the complaint and the current draft.
    pub fn new(orchestrator: ChatOrchestrator) -> Self {
        let complaints = orchestrator
            .clone()
            .with_prompts(complaint_prompts(orchestrator.prompts()));
        Self {
            orchestrator,
            complaints,
        }
    }

    pub async fn analyze_document(
        &self,
        filename: &str,
        text: &str,
    ) -> Result<DocumentAnalysis, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyDocument);
        }

        let business_data = BusinessData::extract(text);
        let word_count = text.split_whitespace().count();
        debug!(
            filename,
            word_count,
            amounts = business_data.amounts.len(),
            key_terms = business_data.key_terms.len(),
            "analyzing document"
        );

        let prompt = document_prompt(filename, text, word_count, &business_data);
        let content = self
            .complete(&self.orchestrator, &prompt, ContextType::PdfAnalysis)
            .await?;

        Ok(DocumentAnalysis {
            filename: filename.to_owned(),
            word_count,
            business_data,
            sections: collect_sections(&content, PDF_ANALYSIS_LABELS),
            full_analysis: content,
        })
    }

    pub async fn analyze_complaint(
        &self,
        complaint: &str,
        current_response: Option<&str>,
    ) -> Result<ComplaintAnalysis, AnalysisError> {
        let complaint = complaint.trim();
        if complaint.is_empty() {
            return Err(AnalysisError::EmptyComplaint);
        }

        let prompt = complaint_message(complaint, current_response);
        let content = self
            .complete(&self.complaints, &prompt, ContextType::ComplaintHandling)
            .await?;

        Ok(ComplaintAnalysis {
            complaint_text: complaint.to_owned(),
            sections: collect_sections(&content, COMPLAINT_LABELS),
            full_analysis: content,
        })
    }

    async fn complete(
        &self,
        orchestrator: &ChatOrchestrator,
        prompt: &str,
        context: ContextType,
    ) -> Result<String, AnalysisError> {
        match orchestrator
            .get_response(prompt, context, None, DEFAULT_TEMPERATURE)
            .await
        {
            CompletionResult::Ok { content, .. } => Ok(content),
            CompletionResult::Err {
                kind,
                message,
                fallback,
            } => {
                warn!(context = %context, error = %message, "analysis failed");
                Err(AnalysisError::Backend {
                    kind,
                    message,
                    fallback,
                })
            }
        }
    }
}

fn collect_sections(content: &str, labels: &[&str]) -> Vec<AnalysisSection> {
    extract_sections(content, labels)
        .iter()
        .map(|(label, body)| AnalysisSection {
            label: label.to_owned(),
            content: body.into_owned(),
        })
        .collect()
}

fn joined(values: &[String], limit: usize) -> String {
    if values.is_empty() {
        return "none".to_owned();
    }
    values
        .iter()
        .take(limit)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn document_prompt(filename: &str, text: &str, word_count: usize, data: &BusinessData) -> String {
    let preview = text.chars().take(PREVIEW_CHARS).collect::<String>();
    format!(
        "Please analyze this document and provide business insights.\n\n\
         Document: {filename}\n\
         Words: {word_count}\n\n\
         Content Preview:\n{preview}\n\n\
         Extracted Business Data:\n\
         - Dates found: {dates}\n\
         - Amounts found: {amounts}\n\
         - Companies mentioned: {companies}\n\
         - Key terms: {terms}\n\n\
         Structure your answer with these headings:\n\
         SUMMARY:\nKEY POINTS:\nBUSINESS INSIGHTS:\nACTION ITEMS:\nRISK ASSESSMENT:",
        preview = preview.trim(),
        dates = joined(&data.dates, 5),
        amounts = joined(&data.amounts, 5),
        companies = joined(&data.companies, 5),
        terms = joined(&data.key_terms, 10),
    )
}

fn complaint_prompts(base: &PromptRegistry) -> PromptRegistry {
    let system = format!(
        "{}\n\n{COMPLAINT_REPORT_FORMAT}",
        base.system_prompt(ContextType::ComplaintHandling)
    );
    base.clone().with_prompt(ContextType::ComplaintHandling, system)
}

fn complaint_message(complaint: &str, current_response: Option<&str>) -> String {
    let current = current_response
        .map(str::trim)
        .filter(|draft| !draft.is_empty())
        .map(|draft| format!("\n\nCurrent draft reply:\n{draft}"))
        .unwrap_or_default();

    format!("Complaint:\n{complaint}{current}")
}
