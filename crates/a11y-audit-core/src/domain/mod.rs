//! Domain models for the audit pipeline.
//!
//! - `AuditJob` / `AuditResult`: batch submissions and per-target outcomes
//! - `ViolationRecord` / `ConfidenceScore`: scored findings
//! - `RemediationCandidate` / `ProviderResult`: proposed fixes

pub mod error;
pub mod job;
pub mod remediation;
pub mod violation;

pub use error::{AuditError, Result};
pub use job::{
    AuditJob, AuditResult, AuditResultView, JobId, JobProgress, JobStatus, JobStatusView,
    RemediationView, ScanError, ViolationView,
};
pub use remediation::{
    ConsensusSelection, ProviderId, ProviderResult, ProviderSummary, RemediationCandidate,
    RemediationRequest, RemediationResponse, RemediationStrategy,
};
pub use violation::{ConfidenceScore, RawFinding, RecommendedAction, Severity, ViolationRecord};
