//! Domain-level error taxonomy for the audit pipeline.

/// Audit pipeline errors.
///
/// The first four variants form the failure taxonomy of the pipeline; each
/// is contained at the smallest possible scope (target, provider, violation)
/// and is surfaced here mainly so callers can log or classify it.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("render failure for {url}: {reason}")]
    RenderFailure { url: String, reason: String },

    #[error("provider {provider} failed: {reason}")]
    ProviderFailure { provider: String, reason: String },

    #[error("no template and all providers failed for violation {violation_id}")]
    NoTemplateAndAllProvidersFailed { violation_id: String },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audit pipeline operations.
pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_failure_display_includes_url() {
        let err = AuditError::RenderFailure {
            url: "https://timeout.example".to_string(),
            reason: "timed out".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("https://timeout.example"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_job_not_found_display() {
        let err = AuditError::JobNotFound("job-1".to_string());
        assert!(err.to_string().contains("job not found"));
    }
}
