//! Remediation routing, multi-provider consensus and drift monitoring.
//!
//! - [`router`]: picks template, single-model or consensus per violation
//! - [`consensus`]: parallel fan-out and agreement-weighted selection
//! - [`drift`]: primary/shadow disagreement trend
//! - [`prompt`] / [`similarity`]: generation prompt and fix comparison

pub mod consensus;
pub mod drift;
pub mod error;
pub mod prompt;
pub mod router;
pub mod similarity;

pub use consensus::{agreement_bonus, agreement_score, ConsensusBuilder, ConsensusConfig};
pub use drift::{
    ChannelDriftSink, DriftConfig, DriftDetector, DriftMonitor, DriftSignal, DriftSink,
    ProviderPair, TracingDriftSink,
};
pub use error::{RemediationError, RemediationResult};
pub use prompt::{build_prompt, parse_reply, ParsedFix};
pub use router::{RemediationRouter, RouterConfig};
