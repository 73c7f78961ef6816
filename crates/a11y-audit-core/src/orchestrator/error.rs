//! Job store errors.

use crate::domain::{AuditError, JobId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("target {url} is not part of job {job}")]
    UnknownTarget { job: JobId, url: String },

    #[error("result for {url} already recorded in job {job}")]
    AlreadyRecorded { job: JobId, url: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for AuditError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::JobNotFound(id) => AuditError::JobNotFound(id.to_string()),
            other => AuditError::InvalidSubmission(other.to_string()),
        }
    }
}
