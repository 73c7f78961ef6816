//! Violation confidence scoring.
//!
//! Pure and synchronous: a [`ConfidenceScore`] is a deterministic function of
//! a finding's criterion, severity and evidence. Each of the four components
//! keeps its documented range on the score; `overall` is the mean of the
//! components after each is rescaled onto `[0, 1]` over that range, so every
//! component carries equal weight and `overall` stays in `[0, 1]`.
//!
//! Buckets: `overall >= 0.90` approve, `>= 0.70` review, otherwise reject.
//! Malformed findings score zero and are sent to review.

use crate::domain::{AuditError, ConfidenceScore, RawFinding, RecommendedAction, Result, Severity};

pub const APPROVE_THRESHOLD: f64 = 0.90;
pub const REVIEW_THRESHOLD: f64 = 0.70;

pub const MIN_FALSE_POSITIVE_RISK: f64 = -0.2;
pub const MAX_SEVERITY_FACTOR: f64 = 0.3;
pub const MAX_EVIDENCE_STRENGTH: f64 = 0.4;

/// Reliability for well-formed criteria missing from the table. Treated like
/// the criteria that need interaction simulation.
pub const DEFAULT_DETECTION_RELIABILITY: f64 = 0.65;

/// Detection reliability by WCAG success criterion.
const DETECTION_RELIABILITY: &[(&str, f64)] = &[
    // Objectively measurable
    ("1.4.3", 0.95),
    ("1.4.6", 0.95),
    ("2.4.2", 0.95),
    ("3.1.1", 0.95),
    ("1.4.11", 0.90),
    ("4.1.1", 0.90),
    ("1.3.1", 0.85),
    ("3.3.2", 0.85),
    ("4.1.2", 0.85),
    // Context dependent
    ("1.1.1", 0.80),
    ("1.2.2", 0.80),
    ("2.4.4", 0.75),
    ("2.4.6", 0.75),
    ("3.1.2", 0.75),
    // Need interaction simulation
    ("1.4.4", 0.70),
    ("1.4.10", 0.70),
    ("2.4.7", 0.70),
    ("2.1.1", 0.65),
    ("2.1.2", 0.60),
    ("2.2.1", 0.60),
    ("2.4.3", 0.60),
    ("3.2.1", 0.60),
    ("3.2.2", 0.60),
];

/// Penalties for criteria historically prone to false positives.
const FALSE_POSITIVE_RISK: &[(&str, f64)] = &[
    ("1.1.1", -0.10),
    ("1.3.1", -0.05),
    ("1.4.11", -0.05),
    ("2.1.1", -0.10),
    ("2.4.4", -0.10),
    ("2.4.6", -0.15),
    ("2.4.7", -0.15),
    ("4.1.2", -0.05),
];

/// Score a raw finding.
pub fn score(finding: &RawFinding) -> ConfidenceScore {
    let Ok(severity) = validate(finding) else {
        return malformed();
    };

    let detection_reliability = detection_reliability(&finding.wcag_criterion);
    let false_positive_risk = false_positive_risk(&finding.wcag_criterion);
    let severity_factor = severity_factor(severity);
    let evidence_strength = evidence_strength(finding);

    let overall = combine(
        detection_reliability,
        false_positive_risk,
        severity_factor,
        evidence_strength,
    );

    ConfidenceScore {
        overall,
        detection_reliability,
        false_positive_risk,
        severity_factor,
        evidence_strength,
        recommended_action: recommended_action(overall),
    }
}

/// Check that a finding can be scored, returning its severity.
pub fn validate(finding: &RawFinding) -> Result<Severity> {
    if !is_well_formed_criterion(&finding.wcag_criterion) {
        return Err(AuditError::MalformedInput(format!(
            "invalid wcag criterion {:?}",
            finding.wcag_criterion
        )));
    }
    finding
        .severity
        .ok_or_else(|| AuditError::MalformedInput("missing severity".to_string()))
}

/// Lowest confidence, routed to a human.
fn malformed() -> ConfidenceScore {
    ConfidenceScore {
        overall: 0.0,
        detection_reliability: 0.0,
        false_positive_risk: MIN_FALSE_POSITIVE_RISK,
        severity_factor: 0.0,
        evidence_strength: 0.0,
        recommended_action: RecommendedAction::Review,
    }
}

/// `major.minor.patch`, all numeric.
pub fn is_well_formed_criterion(criterion: &str) -> bool {
    let parts: Vec<&str> = criterion.trim().split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

pub fn detection_reliability(criterion: &str) -> f64 {
    lookup(DETECTION_RELIABILITY, criterion).unwrap_or(DEFAULT_DETECTION_RELIABILITY)
}

pub fn false_positive_risk(criterion: &str) -> f64 {
    lookup(FALSE_POSITIVE_RISK, criterion).unwrap_or(0.0)
}

pub fn severity_factor(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 0.3,
        Severity::High => 0.2,
        Severity::Medium => 0.1,
        Severity::Low => 0.0,
    }
}

/// 0.2 for a captured selector plus 0.2 for a captured snippet.
pub fn evidence_strength(finding: &RawFinding) -> f64 {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    let mut strength = 0.0;
    if present(&finding.element_selector) {
        strength += 0.2;
    }
    if present(&finding.code_snippet) {
        strength += 0.2;
    }
    strength
}

/// Mean of the four components rescaled onto `[0, 1]`, rounded to four
/// decimals so bucket edges are exact.
pub fn combine(
    detection_reliability: f64,
    false_positive_risk: f64,
    severity_factor: f64,
    evidence_strength: f64,
) -> f64 {
    let dr = detection_reliability.clamp(0.0, 1.0);
    let fp = (false_positive_risk.clamp(MIN_FALSE_POSITIVE_RISK, 0.0) - MIN_FALSE_POSITIVE_RISK)
        / -MIN_FALSE_POSITIVE_RISK;
    let sf = severity_factor.clamp(0.0, MAX_SEVERITY_FACTOR) / MAX_SEVERITY_FACTOR;
    let es = evidence_strength.clamp(0.0, MAX_EVIDENCE_STRENGTH) / MAX_EVIDENCE_STRENGTH;

    let mean = (dr + fp + sf + es) / 4.0;
    (mean * 10_000.0).round() / 10_000.0
}

/// Exact thresholds land in the higher-confidence bucket.
pub fn recommended_action(overall: f64) -> RecommendedAction {
    if overall >= APPROVE_THRESHOLD {
        RecommendedAction::Approve
    } else if overall >= REVIEW_THRESHOLD {
        RecommendedAction::Review
    } else {
        RecommendedAction::Reject
    }
}

fn lookup(table: &[(&str, f64)], criterion: &str) -> Option<f64> {
    let criterion = criterion.trim();
    table
        .iter()
        .find(|(key, _)| *key == criterion)
        .map(|(_, value)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criterion_shape() {
        assert!(is_well_formed_criterion("1.4.3"));
        assert!(is_well_formed_criterion(" 1.4.10 "));
        assert!(!is_well_formed_criterion("1.4"));
        assert!(!is_well_formed_criterion("1.a.3"));
        assert!(!is_well_formed_criterion(""));
        assert!(!is_well_formed_criterion("1..3"));
    }

    #[test]
    fn test_lookup_tiers() {
        assert_eq!(detection_reliability("1.4.3"), 0.95);
        assert_eq!(detection_reliability("1.1.1"), 0.80);
        assert_eq!(detection_reliability("2.4.3"), 0.60);
        assert_eq!(detection_reliability("9.9.9"), DEFAULT_DETECTION_RELIABILITY);
        assert_eq!(false_positive_risk("1.4.3"), 0.0);
        assert_eq!(false_positive_risk("2.4.7"), -0.15);
    }

    #[test]
    fn test_evidence_strength_levels() {
        let base = RawFinding::new("1.1.1", "missing-alt", Severity::High, "img");
        assert_eq!(evidence_strength(&base), 0.0);
        assert_eq!(evidence_strength(&base.clone().with_selector("img")), 0.2);
        assert_eq!(
            evidence_strength(&base.clone().with_selector("img").with_snippet("<img>")),
            0.4
        );
        assert_eq!(evidence_strength(&base.with_selector("   ")), 0.0);
    }

    #[test]
    fn test_combine_bounds() {
        assert_eq!(combine(0.0, -0.2, 0.0, 0.0), 0.0);
        assert_eq!(combine(1.0, 0.0, 0.3, 0.4), 1.0);
        // out-of-range inputs are clamped
        assert_eq!(combine(2.0, 1.0, 9.0, 9.0), 1.0);
    }

    #[test]
    fn test_bucket_edges_round_up() {
        assert_eq!(recommended_action(0.90), RecommendedAction::Approve);
        assert_eq!(recommended_action(0.8999), RecommendedAction::Review);
        assert_eq!(recommended_action(0.70), RecommendedAction::Review);
        assert_eq!(recommended_action(0.6999), RecommendedAction::Reject);
    }

    #[test]
    fn test_malformed_finding_defaults_to_review() {
        let finding = RawFinding {
            wcag_criterion: "contrast".to_string(),
            severity: Some(Severity::Critical),
            ..RawFinding::default()
        };
        let s = score(&finding);
        assert_eq!(s.overall, 0.0);
        assert_eq!(s.recommended_action, RecommendedAction::Review);

        let missing_severity = RawFinding {
            wcag_criterion: "1.4.3".to_string(),
            ..RawFinding::default()
        };
        assert_eq!(score(&missing_severity).overall, 0.0);
    }

    #[test]
    fn test_validate_reports_malformed_input() {
        let finding = RawFinding::new("1.4", "low-contrast", Severity::High, "contrast");
        let err = validate(&finding).unwrap_err();
        assert!(matches!(err, AuditError::MalformedInput(_)));
        assert!(err.to_string().contains("1.4"));

        let ok = RawFinding::new("1.4.3", "low-contrast", Severity::High, "contrast");
        assert_eq!(validate(&ok).unwrap(), Severity::High);
    }
}
