//! Prompt construction and reply parsing for fix generation.
//!
//! Providers are asked for a JSON object:
//!
//! ```json
//! {"fixed_code": "...", "explanation": "...", "confidence": 0.8}
//! ```
//!
//! Replies that ignore the format still work when they contain a fenced code
//! block; the block becomes the fix and the rest of the text the explanation.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::domain::ViolationRecord;

/// Confidence assigned when a reply does not report one.
pub const UNREPORTED_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFix {
    pub fixed_code: String,
    pub explanation: String,
    pub confidence: f64,
}

pub fn build_prompt(violation: &ViolationRecord, code_language: Option<&str>) -> String {
    let language = code_language.unwrap_or("html");
    let mut prompt = String::new();
    prompt.push_str("You are an accessibility engineer fixing a WCAG 2.1 violation.\n\n");
    prompt.push_str(&format!("WCAG criterion: {}\n", violation.wcag_criterion));
    if !violation.issue_type.is_empty() {
        prompt.push_str(&format!("Issue type: {}\n", violation.issue_type));
    }
    prompt.push_str(&format!("Severity: {}\n", violation.severity));
    prompt.push_str(&format!("Description: {}\n", violation.description));
    if let Some(selector) = &violation.element_selector {
        prompt.push_str(&format!("Element: {selector}\n"));
    }
    if let Some(snippet) = &violation.code_snippet {
        prompt.push_str(&format!("\nCurrent code ({language}):\n```{language}\n{snippet}\n```\n"));
    }
    prompt.push_str(
        "\nReply with a single JSON object and nothing else:\n\
         {\"fixed_code\": \"<corrected code>\", \
         \"explanation\": \"<one or two sentences>\", \
         \"confidence\": <number between 0 and 1>}\n",
    );
    prompt
}

#[derive(Debug, Deserialize)]
struct JsonReply {
    fixed_code: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Extract a fix from raw model output. `None` if nothing usable is found.
pub fn parse_reply(text: &str) -> Option<ParsedFix> {
    parse_json(text).or_else(|| parse_code_block(text))
}

fn parse_json(text: &str) -> Option<ParsedFix> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let reply: JsonReply = serde_json::from_str(&text[start..=end]).ok()?;
    if reply.fixed_code.trim().is_empty() {
        return None;
    }
    Some(ParsedFix {
        fixed_code: reply.fixed_code,
        explanation: reply.explanation,
        confidence: reply
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(UNREPORTED_CONFIDENCE),
    })
}

fn code_block_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)```[\w+-]*[ \t]*\n(.*?)```").ok())
        .as_ref()
}

fn parse_code_block(text: &str) -> Option<ParsedFix> {
    let captures = code_block_pattern()?.captures(text)?;
    let whole = captures.get(0)?;
    let code = captures.get(1)?.as_str().trim_end_matches('\n');
    if code.trim().is_empty() {
        return None;
    }
    let explanation = format!("{}{}", &text[..whole.start()], &text[whole.end()..]);
    Some(ParsedFix {
        fixed_code: code.to_string(),
        explanation: explanation.split_whitespace().collect::<Vec<_>>().join(" "),
        confidence: UNREPORTED_CONFIDENCE,
    })
}
