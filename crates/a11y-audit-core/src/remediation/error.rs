//! Errors internal to remediation routing.
//!
//! None of these escape [`RemediationRouter::route`](super::RemediationRouter::route);
//! the router falls back a tier and, ultimately, returns a zero-confidence
//! candidate.

use crate::domain::ProviderId;
use crate::provider::GenerationError;
use crate::templates::TemplateError;

#[derive(Debug, thiserror::Error)]
pub enum RemediationError {
    #[error("all {attempted} providers failed")]
    AllProvidersFailed { attempted: usize },

    #[error("no providers configured")]
    NoProviders,

    #[error("unknown provider: {0}")]
    UnknownProvider(ProviderId),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("provider reply could not be parsed")]
    UnparseableReply,

    #[error(transparent)]
    Template(#[from] TemplateError),
}

pub type RemediationResult<T> = std::result::Result<T, RemediationError>;
