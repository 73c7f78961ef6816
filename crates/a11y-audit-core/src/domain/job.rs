//! Batch audit jobs and their per-target results.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::remediation::RemediationStrategy;
use crate::domain::violation::{RecommendedAction, Severity, ViolationRecord};

/// Unique identifier of an audit job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job id.
    pub fn new() -> Self {
        JobId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Job lifecycle. Only per-target failures exist; a job always ends
/// `Completed` once every target has a terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobProgress {
    pub fn is_done(&self) -> bool {
        self.completed + self.failed == self.total
    }
}

/// Why a target could not be scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum ScanError {
    RenderTimeout,
    RenderError(String),
}

impl ScanError {
    /// Stable short code, e.g. `RenderTimeout`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RenderTimeout => "RenderTimeout",
            Self::RenderError(_) => "RenderError",
        }
    }
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RenderTimeout => write!(f, "RenderTimeout"),
            Self::RenderError(msg) => write!(f, "RenderError: {msg}"),
        }
    }
}

/// Outcome of scanning one target. Written exactly once per target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub url: String,
    pub violations: Vec<ViolationRecord>,
    pub scan_error: Option<ScanError>,
    pub scan_duration_ms: u64,
}

impl AuditResult {
    pub fn scanned(url: impl Into<String>, violations: Vec<ViolationRecord>, ms: u64) -> Self {
        Self {
            url: url.into(),
            violations,
            scan_error: None,
            scan_duration_ms: ms,
        }
    }

    pub fn failed(url: impl Into<String>, error: ScanError, ms: u64) -> Self {
        Self {
            url: url.into(),
            violations: Vec::new(),
            scan_error: Some(error),
            scan_duration_ms: ms,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.scan_error.is_some()
    }
}

/// One batch submission and its aggregate state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditJob {
    pub id: JobId,
    pub submitted_targets: Vec<String>,
    pub status: JobStatus,
    pub results: HashMap<String, AuditResult>,
    pub progress: JobProgress,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AuditJob {
    pub fn new(id: JobId, targets: Vec<String>, now: DateTime<Utc>) -> Self {
        let progress = JobProgress {
            total: targets.len(),
            ..JobProgress::default()
        };
        Self {
            id,
            submitted_targets: targets,
            status: JobStatus::Pending,
            results: HashMap::new(),
            progress,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// Results recorded so far, in submission order.
    pub fn ordered_results(&self) -> Vec<AuditResult> {
        self.submitted_targets
            .iter()
            .filter_map(|url| self.results.get(url).cloned())
            .collect()
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            status: self.status,
            progress: self.progress,
        }
    }
}

/// `GetStatus` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub progress: JobProgress,
}

/// Remediation as exposed in a results payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationView {
    pub strategy: RemediationStrategy,
    pub fixed_code: String,
    pub explanation: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationView {
    pub id: String,
    pub wcag_criterion: String,
    pub severity: Severity,
    pub confidence: f64,
    pub recommended_action: RecommendedAction,
    pub remediation: Option<RemediationView>,
}

/// `GetResults` payload entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResultView {
    pub url: String,
    pub violations: Vec<ViolationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
}

impl From<&AuditResult> for AuditResultView {
    fn from(result: &AuditResult) -> Self {
        let violations = result
            .violations
            .iter()
            .map(|v| ViolationView {
                id: v.id.clone(),
                wcag_criterion: v.wcag_criterion.clone(),
                severity: v.severity,
                confidence: v.confidence.overall,
                recommended_action: v.confidence.recommended_action,
                remediation: v.remediation.as_ref().map(|r| RemediationView {
                    strategy: r.strategy,
                    fixed_code: r.fixed_code.clone(),
                    explanation: r.explanation.clone(),
                    confidence: r.confidence,
                    agreement_score: r.agreement_score,
                }),
            })
            .collect();
        Self {
            url: result.url.clone(),
            violations,
            scan_error: result.scan_error.as_ref().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending_with_total() {
        let job = AuditJob::new(
            JobId::new(),
            vec!["https://a.example".into(), "https://b.example".into()],
            Utc::now(),
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress.total, 2);
        assert!(!job.progress.is_done());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_ordered_results_follow_submission_order() {
        let mut job = AuditJob::new(
            JobId::new(),
            vec!["https://a.example".into(), "https://b.example".into()],
            Utc::now(),
        );
        job.results.insert(
            "https://b.example".into(),
            AuditResult::failed("https://b.example", ScanError::RenderTimeout, 5),
        );
        job.results.insert(
            "https://a.example".into(),
            AuditResult::scanned("https://a.example", vec![], 3),
        );
        let urls: Vec<_> = job.ordered_results().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_status_view_serializes_lowercase() {
        let job = AuditJob::new(JobId::new(), vec!["https://a.example".into()], Utc::now());
        let json = serde_json::to_value(job.status_view()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["progress"]["total"], 1);
    }

    #[test]
    fn test_scan_error_codes() {
        assert_eq!(ScanError::RenderTimeout.code(), "RenderTimeout");
        let err = ScanError::RenderError("dns failure".into());
        assert_eq!(err.code(), "RenderError");
        assert_eq!(err.to_string(), "RenderError: dns failure");
    }

    #[test]
    fn test_result_view_carries_scan_error_string() {
        let result = AuditResult::failed("https://t.example", ScanError::RenderTimeout, 30_000);
        let view = AuditResultView::from(&result);
        assert_eq!(view.scan_error.as_deref(), Some("RenderTimeout"));
        assert!(view.violations.is_empty());
    }
}
