//! Recovers labelled sections (`SUMMARY: ...`, `KEY POINTS: ...`) from free-form
//! model output.
//!
//! A line opens a section when it contains a requested label (case-insensitive)
//! and a `:`; text after the first colon becomes the first content line. Any later
//! line containing a different requested label closes the open section; the open
//! section's own label repeated with a colon continues it. When one line
//! contains several labels it is attributed to the first of them in the caller's
//! order. Each label opens at most once; later occurrences only close.

use std::borrow::Cow;

pub const PDF_ANALYSIS_LABELS: &[&str] = &[
    "SUMMARY",
    "KEY POINTS",
    "BUSINESS INSIGHTS",
    "ACTION ITEMS",
    "RISK ASSESSMENT",
];

pub const EMAIL_LABELS: &[&str] = &["SUBJECT", "BODY", "SUGGESTIONS"];

pub const COMPLAINT_LABELS: &[&str] = &[
    "COMPLAINT ANALYSIS",
    "RESPONSE STRATEGY",
    "EMPATHY IMPROVEMENTS",
    "ESCALATION GUIDANCE",
    "PREVENTION MEASURES",
    "IMPROVED RESPONSE",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    label: String,
    key: String,
    body: Option<String>,
}

/// Extracted sections in the order the labels were requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSections {
    sections: Vec<Section>,
}

impl ParsedSections {
    /// Section body, or the `No <label> available` placeholder.
    pub fn get(&self, label: &str) -> Cow<'_, str> {
        match self.found(label) {
            Some(body) => Cow::Borrowed(body),
            None => Cow::Owned(placeholder(label)),
        }
    }

    /// Section body only when it was present and non-empty.
    pub fn found(&self, label: &str) -> Option<&str> {
        let key = label.to_uppercase();
        self.sections
            .iter()
            .find(|section| section.key == key)
            .and_then(|section| section.body.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Cow<'_, str>)> {
        self.sections.iter().map(|section| {
            let body = match &section.body {
                Some(body) => Cow::Borrowed(body.as_str()),
                None => Cow::Owned(placeholder(&section.label)),
            };
            (section.label.as_str(), body)
        })
    }
}

pub fn placeholder(label: &str) -> String {
    format!("No {} available", label.to_lowercase())
}

pub fn extract_sections(text: &str, labels: &[&str]) -> ParsedSections {
    let keys = labels
        .iter()
        .map(|label| label.trim().to_uppercase())
        .collect::<Vec<_>>();
    let mut collected: Vec<Option<Vec<String>>> = vec![None; labels.len()];
    let mut open: Option<usize> = None;

    for line in text.lines() {
        let upper = line.to_uppercase();
        let matched = keys
            .iter()
            .position(|key| !key.is_empty() && upper.contains(key.as_str()));

        let Some(index) = matched else {
            if let Some(current) = open {
                if let Some(lines) = collected[current].as_mut() {
                    lines.push(line.trim().to_owned());
                }
            }
            continue;
        };

        if open == Some(index) {
            let continuation = line.split_once(':').zip(collected[index].as_mut());
            if let Some(((_, rest), lines)) = continuation {
                let rest = rest.trim();
                if !rest.is_empty() {
                    lines.push(rest.to_owned());
                }
                continue;
            }
        }

        open = None;
        if collected[index].is_some() {
            continue;
        }
        if let Some((_, rest)) = line.split_once(':') {
            let mut lines = Vec::new();
            let rest = rest.trim();
            if !rest.is_empty() {
                lines.push(rest.to_owned());
            }
            collected[index] = Some(lines);
            open = Some(index);
        }
    }

    let sections = labels
        .iter()
        .zip(keys)
        .zip(collected)
        .map(|((label, key), lines)| Section {
            label: label.trim().to_owned(),
            key,
            body: lines
                .map(|lines| lines.join("\n").trim().to_owned())
                .filter(|body| !body.is_empty()),
        })
        .collect();

    ParsedSections { sections }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_text_and_continuation_lines_are_collected() {
        let parsed =
            extract_sections("SUMMARY: foo\nKEY POINTS: bar\nbaz", &["SUMMARY", "KEY POINTS"]);

        assert_eq!(parsed.get("SUMMARY"), "foo");
        assert_eq!(parsed.get("KEY POINTS"), "bar\nbaz");
    }

    #[test]
    fn missing_label_yields_placeholder() {
        let parsed = extract_sections("SUMMARY: foo", PDF_ANALYSIS_LABELS);

        assert_eq!(parsed.get("RISK ASSESSMENT"), "No risk assessment available");
        assert_eq!(parsed.found("RISK ASSESSMENT"), None);
    }

    #[test]
    fn labels_match_case_insensitively_and_lines_are_trimmed() {
        let text = "1. Summary:\n   first line  \n\n   second line\n2. Action Items: call back";
        let parsed = extract_sections(text, &["SUMMARY", "ACTION ITEMS"]);

        assert_eq!(parsed.get("summary"), "first line\n\nsecond line");
        assert_eq!(parsed.get("Action Items"), "call back");
    }

    #[test]
    fn label_without_colon_closes_but_does_not_open() {
        let text = "SUMMARY: short\nThe key points follow\nKEY POINTS: real";
        let parsed = extract_sections(text, &["SUMMARY", "KEY POINTS"]);

        assert_eq!(parsed.get("SUMMARY"), "short");
        assert_eq!(parsed.get("KEY POINTS"), "real");
    }

    #[test]
    fn repeated_own_label_continues_the_open_section() {
        let parsed = extract_sections("SUMMARY: a\nSummary: b\nc", &["SUMMARY", "KEY POINTS"]);

        assert_eq!(parsed.get("SUMMARY"), "a\nb\nc");
    }

    #[test]
    fn closed_label_does_not_reopen() {
        let text = "SUMMARY: a\nKEY POINTS: b\nSUMMARY: late";
        let parsed = extract_sections(text, &["SUMMARY", "KEY POINTS"]);

        assert_eq!(parsed.get("SUMMARY"), "a");
        assert_eq!(parsed.get("KEY POINTS"), "b");
    }

    #[test]
    fn line_with_two_labels_goes_to_the_first_requested() {
        let text = "EXECUTIVE SUMMARY: overview\nmore";
        let parsed = extract_sections(text, &["SUMMARY", "EXECUTIVE SUMMARY"]);

        assert_eq!(parsed.get("SUMMARY"), "overview\nmore");
        assert_eq!(parsed.get("EXECUTIVE SUMMARY"), "No executive summary available");
    }

    #[test]
    fn empty_section_reads_as_placeholder() {
        let parsed = extract_sections("SUMMARY:\nKEY POINTS: x", &["SUMMARY", "KEY POINTS"]);

        assert_eq!(parsed.get("SUMMARY"), "No summary available");
        assert_eq!(parsed.iter().count(), 2);
    }
}
