//! Remediation candidates and per-provider generation results.

use serde::{Deserialize, Serialize};

use crate::domain::violation::Severity;

/// Identifier of a configured model provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which route produced a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStrategy {
    /// Pre-built template, no model call.
    Template,
    SingleModel,
    /// Multi-provider agreement-weighted selection.
    Consensus,
}

impl std::fmt::Display for RemediationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::SingleModel => write!(f, "single_model"),
            Self::Consensus => write!(f, "consensus"),
        }
    }
}

/// Which branch of the consensus selection rule picked the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusSelection {
    Unanimous,
    Majority,
    /// No majority; highest individual confidence won.
    TieBreak,
}

/// One provider's contribution to a consensus round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub provider_id: ProviderId,
    pub fixed_code: String,
    pub explanation: String,
    pub confidence: f64,
    pub latency_ms: u64,
    /// Set when the provider timed out or errored; such results are kept
    /// for audit but never vote.
    pub error: Option<String>,
}

impl ProviderResult {
    pub fn failed(provider_id: ProviderId, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            provider_id,
            fixed_code: String::new(),
            explanation: String::new(),
            confidence: 0.0,
            latency_ms,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A proposed fix for one violation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationCandidate {
    pub strategy: RemediationStrategy,
    pub fixed_code: String,
    pub explanation: String,
    pub confidence: f64,
    /// Only populated for [`RemediationStrategy::Consensus`].
    pub provider_results: Option<Vec<ProviderResult>>,
    /// Only populated for [`RemediationStrategy::Consensus`].
    pub agreement_score: Option<f64>,
    pub selection: Option<ConsensusSelection>,
}

impl RemediationCandidate {
    pub fn template(fixed_code: String, explanation: String, confidence: f64) -> Self {
        Self {
            strategy: RemediationStrategy::Template,
            fixed_code,
            explanation,
            confidence,
            provider_results: None,
            agreement_score: None,
            selection: None,
        }
    }

    pub fn single_model(fixed_code: String, explanation: String, confidence: f64) -> Self {
        Self {
            strategy: RemediationStrategy::SingleModel,
            fixed_code,
            explanation,
            confidence,
            provider_results: None,
            agreement_score: None,
            selection: None,
        }
    }

    /// The terminal "could not generate fix" candidate.
    pub fn unresolved(strategy: RemediationStrategy, explanation: impl Into<String>) -> Self {
        Self {
            strategy,
            fixed_code: String::new(),
            explanation: explanation.into(),
            confidence: 0.0,
            provider_results: None,
            agreement_score: None,
            selection: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.confidence > 0.0
    }
}

/// Inbound remediation request from the routing layer.
///
/// `severity` and `element_selector` feed the confidence score that decides
/// whether the request is eligible for consensus; a missing severity scores
/// as `Medium`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationRequest {
    pub violation_id: String,
    pub wcag_criterion: String,
    pub issue_type: String,
    pub description: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub element_selector: Option<String>,
    #[serde(default)]
    pub code_snippet: Option<String>,
    #[serde(default)]
    pub code_language: Option<String>,
}

/// A provider entry in a [`RemediationResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub provider: ProviderId,
    pub confidence: f64,
    pub fixed_code: String,
}

/// Outbound remediation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationResponse {
    pub fixed_code: String,
    pub explanation: String,
    pub confidence_score: f64,
    pub strategy: RemediationStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<ProviderSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement_score: Option<f64>,
}

impl From<RemediationCandidate> for RemediationResponse {
    fn from(candidate: RemediationCandidate) -> Self {
        let providers = candidate.provider_results.map(|results| {
            results
                .into_iter()
                .filter(ProviderResult::is_ok)
                .map(|r| ProviderSummary {
                    provider: r.provider_id,
                    confidence: r.confidence,
                    fixed_code: r.fixed_code,
                })
                .collect()
        });
        Self {
            fixed_code: candidate.fixed_code,
            explanation: candidate.explanation,
            confidence_score: candidate.confidence,
            strategy: candidate.strategy,
            providers,
            agreement_score: candidate.agreement_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_candidate_has_zero_confidence() {
        let c = RemediationCandidate::unresolved(RemediationStrategy::SingleModel, "no provider");
        assert_eq!(c.confidence, 0.0);
        assert!(!c.is_resolved());
        assert_eq!(c.explanation, "no provider");
    }

    #[test]
    fn test_response_drops_failed_providers() {
        let candidate = RemediationCandidate {
            strategy: RemediationStrategy::Consensus,
            fixed_code: "<img alt=\"x\">".to_string(),
            explanation: "added alt".to_string(),
            confidence: 0.9,
            provider_results: Some(vec![
                ProviderResult {
                    provider_id: "a".into(),
                    fixed_code: "<img alt=\"x\">".to_string(),
                    explanation: "added alt".to_string(),
                    confidence: 0.88,
                    latency_ms: 12,
                    error: None,
                },
                ProviderResult::failed("b".into(), "timeout", 30_000),
            ]),
            agreement_score: Some(1.0),
            selection: Some(ConsensusSelection::Unanimous),
        };
        let response = RemediationResponse::from(candidate);
        let providers = response.providers.unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].provider, ProviderId::new("a"));
        assert_eq!(response.agreement_score, Some(1.0));
    }

    #[test]
    fn test_strategy_serializes_snake_case() {
        let json = serde_json::to_string(&RemediationStrategy::SingleModel).unwrap();
        assert_eq!(json, "\"single_model\"");
    }

    #[test]
    fn test_response_omits_consensus_fields_for_template() {
        let response = RemediationResponse::from(RemediationCandidate::template(
            "fix".to_string(),
            "why".to_string(),
            0.9,
        ));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("providers").is_none());
        assert!(json.get("agreementScore").is_none());
        assert_eq!(json["confidenceScore"], 0.9);
    }
}
