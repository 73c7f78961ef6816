//! Detected accessibility violations and their confidence scores.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::remediation::RemediationCandidate;

/// Impact severity reported for a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" => Ok(Self::Low),
            "medium" | "moderate" => Ok(Self::Medium),
            "high" | "serious" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// A finding as returned by the page renderer, before scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFinding {
    #[serde(default)]
    pub wcag_criterion: String,
    /// Machine-readable issue kind, e.g. `missing-alt` or `low-contrast`.
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub element_selector: Option<String>,
    #[serde(default)]
    pub code_snippet: Option<String>,
}

impl RawFinding {
    pub fn new(
        wcag_criterion: impl Into<String>,
        issue_type: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            wcag_criterion: wcag_criterion.into(),
            issue_type: issue_type.into(),
            severity: Some(severity),
            description: description.into(),
            element_selector: None,
            code_snippet: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.element_selector = Some(selector.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.code_snippet = Some(snippet.into());
        self
    }
}

/// What a reviewer should do with a scored violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Approve,
    Review,
    /// Likely false positive unless a human disputes it.
    Reject,
}

/// Confidence that a detected violation is real.
///
/// A pure value: recomputed deterministically from a finding and never
/// mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceScore {
    /// Combined score in `[0, 1]`.
    pub overall: f64,
    /// `[0, 1]`, looked up by WCAG criterion.
    pub detection_reliability: f64,
    /// `[-0.2, 0]` penalty for criteria prone to false positives.
    pub false_positive_risk: f64,
    /// `[0, 0.3]`, proportional to severity.
    pub severity_factor: f64,
    /// `[0, 0.4]`, proportional to corroborating evidence.
    pub evidence_strength: f64,
    pub recommended_action: RecommendedAction,
}

/// One detected accessibility issue on one page.
///
/// Construction requires a [`ConfidenceScore`], so a record can never be
/// observed without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    pub id: String,
    pub wcag_criterion: String,
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub element_selector: Option<String>,
    pub code_snippet: Option<String>,
    pub confidence: ConfidenceScore,
    pub remediation: Option<RemediationCandidate>,
}

impl ViolationRecord {
    /// Build a record from a raw finding and its already computed score.
    ///
    /// `url` and `index` only feed the deterministic id.
    pub fn from_finding(
        url: &str,
        index: usize,
        finding: &RawFinding,
        confidence: ConfidenceScore,
    ) -> Self {
        Self {
            id: violation_id(url, index, finding),
            wcag_criterion: finding.wcag_criterion.clone(),
            issue_type: finding.issue_type.clone(),
            severity: finding.severity.unwrap_or(Severity::Low),
            description: finding.description.clone(),
            element_selector: finding.element_selector.clone(),
            code_snippet: finding.code_snippet.clone(),
            confidence,
            remediation: None,
        }
    }

    pub fn has_remediation(&self) -> bool {
        self.remediation.is_some()
    }
}

/// `v-` followed by the first 16 hex chars of a SHA-256 over the finding's
/// location and identity.
fn violation_id(url: &str, index: usize, finding: &RawFinding) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(finding.wcag_criterion.as_bytes());
    hasher.update(finding.issue_type.as_bytes());
    if let Some(selector) = &finding.element_selector {
        hasher.update(selector.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("v-{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score() -> ConfidenceScore {
        ConfidenceScore {
            overall: 0.5,
            detection_reliability: 0.8,
            false_positive_risk: 0.0,
            severity_factor: 0.1,
            evidence_strength: 0.2,
            recommended_action: RecommendedAction::Reject,
        }
    }

    #[test]
    fn test_severity_parses_common_aliases() {
        assert_eq!("Critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("serious".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("moderate".parse::<Severity>().unwrap(), Severity::Medium);
        assert_eq!("minor".parse::<Severity>().unwrap(), Severity::Low);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_violation_id_is_stable_and_position_sensitive() {
        let finding = RawFinding::new("1.1.1", "missing-alt", Severity::High, "img without alt")
            .with_selector("img.hero");
        let a = ViolationRecord::from_finding("https://a.example", 0, &finding, score());
        let b = ViolationRecord::from_finding("https://a.example", 0, &finding, score());
        let c = ViolationRecord::from_finding("https://a.example", 1, &finding, score());
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert!(a.id.starts_with("v-"));
        assert_eq!(a.id.len(), 18);
    }

    #[test]
    fn test_raw_finding_deserializes_with_missing_fields() {
        let finding: RawFinding =
            serde_json::from_str(r#"{"wcagCriterion":"1.4.3","severity":"high"}"#).unwrap();
        assert_eq!(finding.wcag_criterion, "1.4.3");
        assert_eq!(finding.severity, Some(Severity::High));
        assert!(finding.element_selector.is_none());
        assert!(finding.description.is_empty());
    }

    #[test]
    fn test_record_without_severity_defaults_to_low() {
        let finding = RawFinding {
            wcag_criterion: "1.4.3".to_string(),
            ..RawFinding::default()
        };
        let record = ViolationRecord::from_finding("https://a.example", 0, &finding, score());
        assert_eq!(record.severity, Severity::Low);
        assert!(!record.has_remediation());
    }
}
