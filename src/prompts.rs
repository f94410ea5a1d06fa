use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// Request context. Each maps to one system prompt; unknown names read as `General`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ContextType {
    #[default]
    General,
    PdfAnalysis,
    Translation,
    EmailAssistance,
    ComplaintHandling,
}

impl ContextType {
    #[cfg(test)]
    const ALL: [ContextType; 5] = [
        ContextType::General,
        ContextType::PdfAnalysis,
        ContextType::Translation,
        ContextType::EmailAssistance,
        ContextType::ComplaintHandling,
    ];

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pdf_analysis" => ContextType::PdfAnalysis,
            "translation" => ContextType::Translation,
            "email_assistance" => ContextType::EmailAssistance,
            "complaint_handling" => ContextType::ComplaintHandling,
            _ => ContextType::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::General => "general",
            ContextType::PdfAnalysis => "pdf_analysis",
            ContextType::Translation => "translation",
            ContextType::EmailAssistance => "email_assistance",
            ContextType::ComplaintHandling => "complaint_handling",
        }
    }
}

impl From<String> for ContextType {
    fn from(value: String) -> Self {
        ContextType::parse(&value)
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const GENERAL_PROMPT: &str = "You are a helpful AI assistant for Wiko cutlery employees. You help with:
1. Analyzing PDF documents and extracting business insights
2. Translating content between English, German, and French
3. Generating professional email responses to customers
4. Providing suggestions for improving customer complaint handling

Always be professional, helpful, and concise in your responses. When handling customer service scenarios, emphasize empathy and solution-oriented approaches.";

const PDF_ANALYSIS_PROMPT: &str = "You are an expert document analyst. Analyze the provided PDF content and:
1. Summarize the key points
2. Identify important business data (dates, amounts, contacts, etc.)
3. Extract actionable insights
4. Highlight any issues or concerns that need attention

Provide your analysis in a clear, structured format.";

const TRANSLATION_PROMPT: &str = "You are a professional translator specializing in business communications.
Translate the provided text accurately while maintaining:
1. Professional tone and context
2. Business terminology consistency
3. Cultural appropriateness
4. Original meaning and intent

Provide only the translation unless specifically asked for additional context.";

const EMAIL_ASSISTANCE_PROMPT: &str = "You are an expert in customer service communications. Help create professional email responses that:
1. Address the customer's concerns directly
2. Maintain a helpful and empathetic tone
3. Provide clear solutions or next steps
4. Follow business communication best practices
5. Are appropriate for the cutlery/kitchenware industry

Consider the customer's situation and provide personalized, solution-oriented responses.";

const COMPLAINT_HANDLING_PROMPT: &str = "You are a customer service expert specializing in complaint resolution. Analyze the complaint and provide:
1. Assessment of the issue severity and urgency
2. Recommended response strategy
3. Suggested resolution steps
4. Tips for empathetic communication
5. Escalation procedures if needed

Focus on turning negative experiences into positive outcomes while protecting the company's reputation.";

const SYSTEM_PROMPTS: &[(ContextType, &str)] = &[
    (ContextType::General, GENERAL_PROMPT),
    (ContextType::PdfAnalysis, PDF_ANALYSIS_PROMPT),
    (ContextType::Translation, TRANSLATION_PROMPT),
    (ContextType::EmailAssistance, EMAIL_ASSISTANCE_PROMPT),
    (ContextType::ComplaintHandling, COMPLAINT_HANDLING_PROMPT),
];

/// Immutable mapping from context to system prompt.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    prompts: HashMap<ContextType, String>,
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self {
            prompts: SYSTEM_PROMPTS
                .iter()
                .map(|(context, prompt)| (*context, (*prompt).to_owned()))
                .collect(),
        }
    }
}

impl PromptRegistry {
    pub fn with_prompt(mut self, context: ContextType, prompt: impl Into<String>) -> Self {
        self.prompts.insert(context, prompt.into());
        self
    }

    pub fn system_prompt(&self, context: ContextType) -> &str {
        self.prompts
            .get(&context)
            .or_else(|| self.prompts.get(&ContextType::General))
            .map(String::as_str)
            .unwrap_or(GENERAL_PROMPT)
    }

    /// Looks a prompt up by its wire name.
    #[cfg(test)]
    fn system_prompt_for(&self, context: &str) -> &str {
        self.system_prompt(ContextType::parse(context))
    }
}
