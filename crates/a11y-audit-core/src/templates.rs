//! Pre-verified remediation templates.
//!
//! Templates are keyed by `(wcag_criterion, issue_type)`. A separate set of
//! per-criterion generic fixes backs the router's last fallback tier.
//! `{{selector}}` and `{{snippet}}` placeholders are filled from the
//! violation being fixed.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ViolationRecord;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template store unavailable: {0}")]
    Unavailable(String),
}

pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub wcag_criterion: String,
    pub issue_type: String,
    pub fixed_code: String,
    pub explanation: String,
}

impl Template {
    pub fn new(
        wcag_criterion: &str,
        issue_type: &str,
        fixed_code: &str,
        explanation: &str,
    ) -> Self {
        Self {
            wcag_criterion: wcag_criterion.to_string(),
            issue_type: issue_type.to_string(),
            fixed_code: fixed_code.to_string(),
            explanation: explanation.to_string(),
        }
    }

    /// Fill placeholders for `violation`, returning `(fixed_code, explanation)`.
    pub fn render(&self, violation: &ViolationRecord) -> (String, String) {
        let selector = violation.element_selector.as_deref().unwrap_or("element");
        let snippet = violation.code_snippet.as_deref().unwrap_or("");
        let fill = |s: &str| {
            s.replace("{{selector}}", selector)
                .replace("{{snippet}}", snippet)
        };
        (fill(&self.fixed_code), fill(&self.explanation))
    }
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Exact `(criterion, issue type)` template, if one is registered.
    async fn lookup(&self, wcag_criterion: &str, issue_type: &str)
        -> TemplateResult<Option<Template>>;

    /// Generic per-criterion fix, used when generation fails.
    async fn generic(&self, wcag_criterion: &str) -> TemplateResult<Option<Template>>;
}

/// In-process template store seeded with common fixes.
#[derive(Debug, Clone, Default)]
pub struct BuiltinTemplateStore {
    templates: HashMap<(String, String), Template>,
    generic: HashMap<String, Template>,
}

impl BuiltinTemplateStore {
    /// An empty store.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A store seeded with the built-in templates and generic fixes.
    pub fn new() -> Self {
        let mut store = Self::empty();
        for template in builtin_templates() {
            store = store.with_template(template);
        }
        for template in builtin_generic_fixes() {
            store = store.with_generic(template);
        }
        store
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.insert(
            (template.wcag_criterion.clone(), template.issue_type.clone()),
            template,
        );
        self
    }

    pub fn with_generic(mut self, template: Template) -> Self {
        self.generic.insert(template.wcag_criterion.clone(), template);
        self
    }

    /// All keyed templates, sorted by criterion then issue type.
    pub fn templates(&self) -> Vec<&Template> {
        let mut all: Vec<&Template> = self.templates.values().collect();
        all.sort_by(|a, b| {
            (a.wcag_criterion.as_str(), a.issue_type.as_str())
                .cmp(&(b.wcag_criterion.as_str(), b.issue_type.as_str()))
        });
        all
    }
}

#[async_trait]
impl TemplateStore for BuiltinTemplateStore {
    async fn lookup(
        &self,
        wcag_criterion: &str,
        issue_type: &str,
    ) -> TemplateResult<Option<Template>> {
        Ok(self
            .templates
            .get(&(wcag_criterion.to_string(), issue_type.to_string()))
            .cloned())
    }

    async fn generic(&self, wcag_criterion: &str) -> TemplateResult<Option<Template>> {
        Ok(self.generic.get(wcag_criterion).cloned())
    }
}

fn builtin_templates() -> Vec<Template> {
    vec![
        Template::new(
            "1.1.1",
            "missing-alt",
            r#"<img src="..." alt="Describe the content or purpose of the image">"#,
            "Images need a text alternative. Add an alt attribute to {{selector}} that \
             conveys the image's purpose; use alt=\"\" only if it is purely decorative.",
        ),
        Template::new(
            "1.2.2",
            "missing-captions",
            r#"<track kind="captions" src="captions.vtt" srclang="en" label="English" default>"#,
            "Prerecorded video needs synchronized captions. Add a captions track to {{selector}}.",
        ),
        Template::new(
            "1.3.1",
            "table-missing-headers",
            r#"<th scope="col">Column heading</th>"#,
            "Data tables need header cells so assistive technology can announce \
             relationships. Mark the header row of {{selector}} with th and scope.",
        ),
        Template::new(
            "2.4.1",
            "missing-skip-link",
            r##"<a class="skip-link" href="#main">Skip to main content</a>"##,
            "Provide a skip link as the first focusable element so keyboard users can \
             bypass repeated navigation.",
        ),
        Template::new(
            "2.4.2",
            "missing-title",
            "<title>Descriptive page title | Site name</title>",
            "Every page needs a title that describes its topic or purpose.",
        ),
        Template::new(
            "2.4.4",
            "empty-link",
            r#"<a href="...">Describe the link destination</a>"#,
            "Links need discernible text. Give {{selector}} text that describes where it goes.",
        ),
        Template::new(
            "3.1.1",
            "missing-lang",
            r#"<html lang="en">"#,
            "Declare the page language on the html element so screen readers use the \
             correct pronunciation.",
        ),
        Template::new(
            "3.3.2",
            "missing-label",
            "<label for=\"field-id\">Field name</label>\n<input id=\"field-id\" name=\"field\">",
            "Form controls need a programmatically associated label. Associate a label \
             element with {{selector}}.",
        ),
        Template::new(
            "4.1.2",
            "button-no-name",
            r#"<button type="button" aria-label="Describe the action"></button>"#,
            "Buttons need an accessible name. Give {{selector}} visible text or an aria-label.",
        ),
    ]
}

fn builtin_generic_fixes() -> Vec<Template> {
    vec![
        Template::new(
            "1.1.1",
            "*",
            "<!-- a11y: provide a text alternative for this element -->\n{{snippet}}",
            "Non-text content at {{selector}} needs a text alternative.",
        ),
        Template::new(
            "1.3.1",
            "*",
            "<!-- a11y: expose structure with semantic markup -->\n{{snippet}}",
            "Information and relationships at {{selector}} must be conveyed through \
             semantic markup, not presentation alone.",
        ),
        Template::new(
            "1.4.3",
            "*",
            "/* a11y: raise text contrast to at least 4.5:1 (3:1 for large text) */\n{{snippet}}",
            "Text at {{selector}} does not meet the minimum contrast ratio.",
        ),
        Template::new(
            "2.1.1",
            "*",
            "<!-- a11y: make this control operable with the keyboard -->\n{{snippet}}",
            "Functionality at {{selector}} must be available from a keyboard.",
        ),
        Template::new(
            "2.4.7",
            "*",
            "/* a11y: keep a visible focus indicator */\n{{snippet}}",
            "Keyboard focus on {{selector}} must be visible.",
        ),
        Template::new(
            "4.1.2",
            "*",
            "<!-- a11y: expose name, role and value -->\n{{snippet}}",
            "The component at {{selector}} must expose an accessible name and role.",
        ),
    ]
}
