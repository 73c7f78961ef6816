//! Page renderer capability.
//!
//! The browser-automation engine that loads a page and extracts raw findings
//! lives outside this crate; the pipeline only depends on [`PageRenderer`].
//! [`FixtureRenderer`] replays recorded render outcomes from a JSON file.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AuditError, RawFinding};

/// Errors surfaced by a page renderer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("render timed out")]
    Timeout,

    #[error("render failed: {0}")]
    Failed(String),
}

/// Rendered page content and the findings extracted from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedPage {
    pub dom_snapshot: String,
    pub raw_findings: Vec<RawFinding>,
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderedPage, RenderError>;
}

/// One recorded outcome in a fixture file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureEntry {
    #[serde(default)]
    pub findings: Vec<RawFinding>,
    #[serde(default)]
    pub dom: Option<String>,
    /// `"timeout"` replays a timeout; anything else a render failure.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

/// Renderer backed by a `url -> FixtureEntry` map.
///
/// Unknown URLs fail with [`RenderError::Failed`].
#[derive(Debug, Clone, Default)]
pub struct FixtureRenderer {
    entries: HashMap<String, FixtureEntry>,
}

impl FixtureRenderer {
    pub fn new(entries: HashMap<String, FixtureEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json(json: &str) -> Result<Self, AuditError> {
        let entries: HashMap<String, FixtureEntry> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    pub fn load(path: &Path) -> Result<Self, AuditError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn urls(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

#[async_trait]
impl PageRenderer for FixtureRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, RenderError> {
        let entry = self
            .entries
            .get(url)
            .ok_or_else(|| RenderError::Failed(format!("no fixture for {url}")))?;

        if let Some(ms) = entry.delay_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        match entry.error.as_deref() {
            Some("timeout") => Err(RenderError::Timeout),
            Some(reason) => Err(RenderError::Failed(reason.to_string())),
            None => Ok(RenderedPage {
                dom_snapshot: entry.dom.clone().unwrap_or_default(),
                raw_findings: entry.findings.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURES: &str = r#"{
        "https://good.example": {
            "findings": [
                {"wcagCriterion": "1.1.1", "issueType": "missing-alt", "severity": "high",
                 "description": "Image without alt", "elementSelector": "img.hero",
                 "codeSnippet": "<img src=\"hero.png\">"}
            ]
        },
        "https://timeout.example": {"error": "timeout"},
        "https://broken.example": {"error": "connection refused"}
    }"#;

    #[tokio::test]
    async fn test_fixture_renderer_replays_findings() {
        let renderer = FixtureRenderer::from_json(FIXTURES).unwrap();
        let page = renderer.render("https://good.example").await.unwrap();
        assert_eq!(page.raw_findings.len(), 1);
        assert_eq!(page.raw_findings[0].issue_type, "missing-alt");
    }

    #[tokio::test]
    async fn test_fixture_renderer_replays_errors() {
        let renderer = FixtureRenderer::from_json(FIXTURES).unwrap();
        assert_eq!(
            renderer.render("https://timeout.example").await,
            Err(RenderError::Timeout)
        );
        assert_eq!(
            renderer.render("https://broken.example").await,
            Err(RenderError::Failed("connection refused".into()))
        );
        assert!(matches!(
            renderer.render("https://unknown.example").await,
            Err(RenderError::Failed(_))
        ));
    }
}
