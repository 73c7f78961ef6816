//! Accessibility audit pipeline.
//!
//! Submit → Scan (concurrent) → Score → Route → (Consensus) → Result.
//!
//! - [`orchestrator`]: batch jobs with bounded concurrency and partial-failure isolation
//! - [`scoring`]: deterministic violation confidence scores
//! - [`remediation`]: template / single-model / consensus routing and drift monitoring
//! - [`renderer`], [`templates`], [`provider`]: collaborator capabilities

pub mod config;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod provider;
pub mod remediation;
pub mod renderer;
pub mod scoring;
pub mod telemetry;
pub mod templates;

pub use config::{PipelineConfig, ProviderConfig, ProviderKind};

pub use domain::{
    AuditError, AuditJob, AuditResult, AuditResultView, ConfidenceScore, ConsensusSelection,
    JobId, JobProgress, JobStatus, JobStatusView, ProviderId, ProviderResult, RawFinding,
    RecommendedAction, RemediationCandidate, RemediationRequest, RemediationResponse,
    RemediationStrategy, Result, ScanError, Severity, ViolationRecord,
};

pub use orchestrator::{
    BatchAuditOrchestrator, JobStore, MemoryJobStore, OrchestratorConfig, StoreError,
    TargetPipeline,
};

pub use provider::{
    build_provider, AnthropicProvider, GenerationError, GenerationOutput, GenerationRequest,
    ModelProvider, OpenAiProvider, ProviderRegistry,
};

pub use remediation::{
    agreement_bonus, ChannelDriftSink, ConsensusBuilder, ConsensusConfig, DriftConfig,
    DriftMonitor, DriftSink, ProviderPair, RemediationRouter, RouterConfig, TracingDriftSink,
};

pub use renderer::{FixtureRenderer, PageRenderer, RenderError, RenderedPage};
pub use templates::{BuiltinTemplateStore, Template, TemplateStore};

pub use metrics::METRICS;
pub use telemetry::init_tracing;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
