//! Structured lifecycle events for audit jobs and remediation.
//!
//! Every event carries an `event = "..."` field so log pipelines can filter
//! on it. Instrument job futures with [`job_span`] to tag everything logged
//! while a job runs.

use tracing::{info, warn};

use crate::domain::AuditError;

/// Span tagged with the job id, attached to the job's dispatcher future.
pub fn job_span(job_id: &str) -> tracing::Span {
    tracing::info_span!("a11y.job", job_id = %job_id)
}

pub fn emit_job_submitted(job_id: &str, targets: usize, concurrency: usize) {
    info!(
        event = "job.submitted",
        job_id = %job_id,
        targets = targets,
        concurrency = concurrency,
    );
}

/// One target finished, successfully or not.
pub fn emit_target_finished(
    job_id: &str,
    url: &str,
    violations: usize,
    duration_ms: u64,
    error: Option<&str>,
) {
    match error {
        None => info!(
            event = "target.finished",
            job_id = %job_id,
            url = %url,
            violations = violations,
            duration_ms = duration_ms,
        ),
        Some(error) => warn!(
            event = "target.failed",
            job_id = %job_id,
            url = %url,
            duration_ms = duration_ms,
            error = %error,
        ),
    }
}

pub fn emit_job_completed(job_id: &str, completed: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "job.completed",
        job_id = %job_id,
        completed = completed,
        failed = failed,
        duration_ms = duration_ms,
    );
}

pub fn emit_remediation_routed(violation_id: &str, strategy: &str, confidence: f64) {
    info!(
        event = "remediation.routed",
        violation_id = %violation_id,
        strategy = %strategy,
        confidence = confidence,
    );
}

pub fn emit_provider_failed(provider: &str, reason: &dyn std::fmt::Display) {
    let error = AuditError::ProviderFailure {
        provider: provider.to_string(),
        reason: reason.to_string(),
    };
    warn!(event = "provider.failed", provider = %provider, error = %error);
}

pub fn emit_drift_detected(primary: &str, shadow: &str, magnitude: f64) {
    warn!(
        event = "drift.detected",
        primary = %primary,
        shadow = %shadow,
        magnitude = magnitude,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_span_create() {
        let _span = job_span("job-1").entered();
        emit_target_finished("job-1", "https://a.example", 0, 5, Some("RenderTimeout"));
    }
}
