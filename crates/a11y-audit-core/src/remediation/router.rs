//! Strategy routing for a single violation.
//!
//! ```text
//! template hit ──────────────────────────────▶ Template (fixed confidence)
//! overall >= threshold && multi-provider ────▶ Consensus
//!                                                 │ fails
//! otherwise ─────────────────────────────────▶ SingleModel
//!                                                 │ fails
//!                                             generic fix (Template)
//!                                                 │ none
//!                                             unresolved (confidence 0)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::config::PipelineConfig;
use crate::domain::{
    AuditError, ProviderId, RawFinding, RemediationCandidate, RemediationRequest, RemediationResponse,
    RemediationStrategy, Severity, ViolationRecord,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::provider::{GenerationError, GenerationRequest, ModelProvider, ProviderRegistry};
use crate::remediation::consensus::ConsensusBuilder;
use crate::remediation::drift::{DriftMonitor, DriftSink};
use crate::remediation::error::{RemediationError, RemediationResult};
use crate::remediation::prompt;
use crate::scoring;
use crate::templates::TemplateStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum `overall` score for the consensus path.
    pub consensus_threshold: f64,
    pub multi_provider_enabled: bool,
    pub template_confidence: f64,
    /// Confidence reported for the per-criterion generic fix tier.
    pub generic_fix_confidence: f64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub provider_timeout_ms: u64,
    /// Provider used for single-model generation; defaults to the first
    /// registered provider that is not the drift shadow.
    pub single_provider: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: 0.85,
            multi_provider_enabled: false,
            template_confidence: 0.9,
            generic_fix_confidence: 0.5,
            max_tokens: 1024,
            temperature: 0.2,
            provider_timeout_ms: 30_000,
            single_provider: None,
        }
    }
}

impl RouterConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

pub struct RemediationRouter {
    templates: Arc<dyn TemplateStore>,
    providers: ProviderRegistry,
    consensus: ConsensusBuilder,
    config: RouterConfig,
}

impl std::fmt::Debug for RemediationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationRouter")
            .field("providers", &self.providers)
            .field("consensus", &self.consensus)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RemediationRouter {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        providers: ProviderRegistry,
        consensus: ConsensusBuilder,
        config: RouterConfig,
    ) -> Self {
        Self {
            templates,
            providers,
            consensus,
            config,
        }
    }

    /// Wire a router from pipeline config. Drift monitoring is enabled when
    /// the config names both a primary and a shadow provider.
    pub fn from_config(
        config: &PipelineConfig,
        templates: Arc<dyn TemplateStore>,
        providers: ProviderRegistry,
        drift_sink: Arc<dyn DriftSink>,
    ) -> Self {
        let mut consensus = ConsensusBuilder::new(providers.clone(), config.consensus.clone())
            .with_generation(config.router.max_tokens, config.router.temperature);
        if let Some(monitor) = DriftMonitor::from_config(&config.drift, drift_sink) {
            consensus = consensus.with_drift(monitor);
        }
        Self::new(templates, providers, consensus, config.router.clone())
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Produce a remediation for `violation`. Never fails: the last resort is
    /// a zero-confidence candidate explaining why no fix was generated.
    pub async fn route(&self, violation: &ViolationRecord) -> RemediationCandidate {
        self.route_with_language(violation, None).await
    }

    #[instrument(skip(self, violation), fields(violation_id = %violation.id))]
    pub async fn route_with_language(
        &self,
        violation: &ViolationRecord,
        code_language: Option<&str>,
    ) -> RemediationCandidate {
        let candidate = self.resolve(violation, code_language).await;
        obs::emit_remediation_routed(
            &violation.id,
            &candidate.strategy.to_string(),
            candidate.confidence,
        );
        candidate
    }

    /// Handle an inbound remediation request.
    ///
    /// The request is scored like a rendered finding; a missing severity
    /// scores as `Medium`.
    pub async fn remediate(&self, request: RemediationRequest) -> RemediationResponse {
        let finding = RawFinding {
            wcag_criterion: request.wcag_criterion.clone(),
            issue_type: request.issue_type.clone(),
            severity: Some(request.severity.unwrap_or(Severity::Medium)),
            description: request.description.clone(),
            element_selector: request.element_selector.clone(),
            code_snippet: request.code_snippet.clone(),
        };
        let mut record =
            ViolationRecord::from_finding("", 0, &finding, scoring::score(&finding));
        if !request.violation_id.is_empty() {
            record.id = request.violation_id.clone();
        }
        self.route_with_language(&record, request.code_language.as_deref())
            .await
            .into()
    }

    async fn resolve(
        &self,
        violation: &ViolationRecord,
        code_language: Option<&str>,
    ) -> RemediationCandidate {
        match self
            .templates
            .lookup(&violation.wcag_criterion, &violation.issue_type)
            .await
        {
            Ok(Some(template)) => {
                METRICS.inc_template_hits();
                let (fixed_code, explanation) = template.render(violation);
                return RemediationCandidate::template(
                    fixed_code,
                    explanation,
                    self.config.template_confidence,
                );
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "template lookup failed; treating as miss"),
        }

        let prompt = prompt::build_prompt(violation, code_language);
        let mut strategy = RemediationStrategy::SingleModel;

        if self.wants_consensus(violation) {
            strategy = RemediationStrategy::Consensus;
            match self
                .consensus
                .build_with_prompt(prompt.clone(), &self.voters())
                .await
            {
                Ok(candidate) => return candidate,
                Err(e) => warn!(error = %e, "consensus failed; falling back to single model"),
            }
        }

        let single_error = match self.single_model(prompt).await {
            Ok(candidate) => return candidate,
            Err(e) => {
                warn!(error = %e, "single-model generation failed; trying generic fix");
                e
            }
        };

        let reason = match self.templates.generic(&violation.wcag_criterion).await {
            Ok(Some(template)) => {
                let (fixed_code, explanation) = template.render(violation);
                return RemediationCandidate::template(
                    fixed_code,
                    explanation,
                    self.config.generic_fix_confidence,
                );
            }
            Ok(None) => single_error,
            Err(e) => RemediationError::from(e),
        };

        let error = AuditError::NoTemplateAndAllProvidersFailed {
            violation_id: violation.id.clone(),
        };
        warn!(error = %error, reason = %reason, "remediation unresolved");
        RemediationCandidate::unresolved(strategy, format!("could not generate fix: {reason}"))
    }

    fn wants_consensus(&self, violation: &ViolationRecord) -> bool {
        self.config.multi_provider_enabled
            && violation.confidence.overall >= self.config.consensus_threshold
    }

    /// Every registered provider except the shadow.
    fn voters(&self) -> Vec<ProviderId> {
        let shadow = self.consensus.shadow();
        self.providers
            .ids()
            .into_iter()
            .filter(|id| Some(id) != shadow)
            .collect()
    }

    fn single_provider(&self) -> RemediationResult<Arc<dyn ModelProvider>> {
        match &self.config.single_provider {
            Some(id) => {
                let id = ProviderId::new(id.clone());
                self.providers
                    .get(&id)
                    .ok_or(RemediationError::UnknownProvider(id))
            }
            None => self
                .voters()
                .first()
                .and_then(|id| self.providers.get(id))
                .ok_or(RemediationError::NoProviders),
        }
    }

    async fn single_model(&self, prompt: String) -> RemediationResult<RemediationCandidate> {
        let provider = self.single_provider()?;
        METRICS.inc_single_model_calls();
        let request = GenerationRequest {
            prompt,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let timeout = self.config.provider_timeout();
        let output = match tokio::time::timeout(timeout, provider.generate(&request)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout {
                ms: self.config.provider_timeout_ms,
            }),
        }
        .inspect_err(|e| {
            METRICS.inc_provider_failures();
            obs::emit_provider_failed(provider.id().as_str(), e);
        })?;

        let fix = prompt::parse_reply(&output.text).ok_or(RemediationError::UnparseableReply)?;
        Ok(RemediationCandidate::single_model(
            fix.fixed_code,
            fix.explanation,
            fix.confidence,
        ))
    }
}
