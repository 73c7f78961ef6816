//! Multi-provider consensus.
//!
//! One generation request per participating provider is fired concurrently,
//! each bounded by `provider_timeout_ms`. Failed or timed-out providers are
//! kept in `provider_results` for audit but never vote. Surviving fixes are
//! compared pairwise with [`similarity::agree`]; the agreement score is the
//! fraction of agreeing pairs.
//!
//! Selection, in order:
//! 1. `agreement >= unanimity_threshold`: highest-weighted provider.
//! 2. A group of mutually agreeing results holding a strict majority:
//!    its highest-confidence member.
//! 3. Otherwise the single highest-confidence result (tie-break).
//!
//! The chosen confidence is scaled by `1 + agreement_bonus(agreement)`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, instrument};

use crate::domain::{
    ConsensusSelection, ProviderId, ProviderResult, RemediationCandidate, RemediationStrategy,
    ViolationRecord,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::provider::{GenerationError, GenerationRequest, ModelProvider, ProviderRegistry};
use crate::remediation::drift::DriftMonitor;
use crate::remediation::error::{RemediationError, RemediationResult};
use crate::remediation::prompt;
use crate::remediation::similarity;

/// Upper bound of [`agreement_bonus`].
pub const MAX_AGREEMENT_BONUS: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub unanimity_threshold: f64,
    /// Minimum [`similarity::similarity`] for two fixes to agree.
    pub similarity_threshold: f64,
    pub provider_timeout_ms: u64,
    /// Provider id to selection weight; missing entries weigh 1.0.
    pub weights: BTreeMap<String, f64>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            unanimity_threshold: 1.0,
            similarity_threshold: 0.85,
            provider_timeout_ms: 30_000,
            weights: BTreeMap::new(),
        }
    }
}

impl ConsensusConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn weight(&self, provider: &ProviderId) -> f64 {
        self.weights.get(provider.as_str()).copied().unwrap_or(1.0)
    }
}

/// `0.1 * (agreement - 0.5)`, clamped to `[0, MAX_AGREEMENT_BONUS]`.
pub fn agreement_bonus(agreement: f64) -> f64 {
    (0.1 * (agreement - 0.5)).clamp(0.0, MAX_AGREEMENT_BONUS)
}

/// Fraction of agreeing pairs among `fixes`. Fewer than two fixes have no
/// pairs and score 0.
pub fn agreement_score(fixes: &[&str], threshold: f64) -> f64 {
    let n = fixes.len();
    if n < 2 {
        return 0.0;
    }
    let mut agreeing = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            if similarity::agree(fixes[i], fixes[j], threshold) {
                agreeing += 1;
            }
        }
    }
    agreeing as f64 / (n * (n - 1) / 2) as f64
}

pub struct ConsensusBuilder {
    providers: ProviderRegistry,
    config: ConsensusConfig,
    max_tokens: u32,
    temperature: f32,
    drift: Option<DriftMonitor>,
}

impl std::fmt::Debug for ConsensusBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusBuilder")
            .field("providers", &self.providers)
            .field("config", &self.config)
            .field("drift", &self.drift)
            .finish()
    }
}

impl ConsensusBuilder {
    pub fn new(providers: ProviderRegistry, config: ConsensusConfig) -> Self {
        Self {
            providers,
            config,
            max_tokens: 1024,
            temperature: 0.2,
            drift: None,
        }
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_drift(mut self, monitor: DriftMonitor) -> Self {
        self.drift = Some(monitor);
        self
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// The shadow provider, which is called every round but never votes.
    pub fn shadow(&self) -> Option<&ProviderId> {
        self.drift.as_ref().map(|m| &m.pair().shadow)
    }

    pub async fn build(
        &self,
        violation: &ViolationRecord,
        participants: &[ProviderId],
    ) -> RemediationResult<RemediationCandidate> {
        self.build_with_prompt(prompt::build_prompt(violation, None), participants)
            .await
    }

    /// Run one round for an already built prompt.
    ///
    /// Fails only when no participant is given or none produced a usable fix.
    #[instrument(skip(self, prompt, participants), fields(participants = participants.len()))]
    pub async fn build_with_prompt(
        &self,
        prompt: String,
        participants: &[ProviderId],
    ) -> RemediationResult<RemediationCandidate> {
        let mut voters: Vec<ProviderId> = Vec::with_capacity(participants.len());
        for id in participants {
            if !voters.contains(id) {
                voters.push(id.clone());
            }
        }
        if voters.is_empty() {
            return Err(RemediationError::NoProviders);
        }
        METRICS.inc_consensus_rounds();

        let observers: Vec<ProviderId> = match &self.drift {
            Some(monitor) => [&monitor.pair().primary, &monitor.pair().shadow]
                .into_iter()
                .filter(|id| !voters.contains(id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let request = Arc::new(GenerationRequest {
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        });
        let all: Vec<ProviderId> = voters.iter().chain(observers.iter()).cloned().collect();
        let mut results = self.fan_out(&all, request).await;
        let observed = results.split_off(voters.len());

        self.observe_drift(&results, &observed);

        let survivors: Vec<&ProviderResult> = results.iter().filter(|r| r.is_ok()).collect();
        if survivors.is_empty() {
            return Err(RemediationError::AllProvidersFailed {
                attempted: results.len(),
            });
        }

        let fixes: Vec<&str> = survivors.iter().map(|r| r.fixed_code.as_str()).collect();
        let agreement = agreement_score(&fixes, self.config.similarity_threshold);
        let (chosen, selection) = self.select(&survivors, agreement);
        let confidence = (chosen.confidence * (1.0 + agreement_bonus(agreement))).clamp(0.0, 1.0);

        debug!(
            provider = %chosen.provider_id,
            agreement = agreement,
            selection = ?selection,
            "consensus selected"
        );

        Ok(RemediationCandidate {
            strategy: RemediationStrategy::Consensus,
            fixed_code: chosen.fixed_code.clone(),
            explanation: chosen.explanation.clone(),
            confidence,
            agreement_score: Some(agreement),
            selection: Some(selection),
            provider_results: Some(results.clone()),
        })
    }

    /// Call every provider in `ids` concurrently; results keep `ids` order.
    async fn fan_out(
        &self,
        ids: &[ProviderId],
        request: Arc<GenerationRequest>,
    ) -> Vec<ProviderResult> {
        let timeout = self.config.provider_timeout();
        let mut join_set = JoinSet::new();
        let mut slots: Vec<Option<ProviderResult>> = vec![None; ids.len()];

        for (idx, id) in ids.iter().enumerate() {
            match self.providers.get(id) {
                Some(provider) => {
                    let request = Arc::clone(&request);
                    join_set.spawn(async move {
                        (idx, call_provider(provider, &request, timeout).await)
                    });
                }
                None => {
                    slots[idx] = Some(ProviderResult::failed(id.clone(), "unknown provider", 0));
                }
            }
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => tracing::warn!(error = %e, "provider task join error"),
            }
        }

        ids.iter()
            .zip(slots)
            .map(|(id, slot)| {
                slot.unwrap_or_else(|| {
                    ProviderResult::failed(id.clone(), "provider task aborted", 0)
                })
            })
            .inspect(|r| {
                if let Some(error) = &r.error {
                    METRICS.inc_provider_failures();
                    obs::emit_provider_failed(r.provider_id.as_str(), error);
                }
            })
            .collect()
    }

    fn select<'a>(
        &self,
        survivors: &[&'a ProviderResult],
        agreement: f64,
    ) -> (&'a ProviderResult, ConsensusSelection) {
        let n = survivors.len();
        let weight = |r: &ProviderResult| self.config.weight(&r.provider_id);

        if n >= 2 && agreement >= self.config.unanimity_threshold {
            let chosen = best_by(survivors, |r| (weight(r), r.confidence));
            return (chosen, ConsensusSelection::Unanimous);
        }

        if n >= 2 {
            let threshold = self.config.similarity_threshold;
            let groups = (0..n).map(|i| {
                (0..n)
                    .filter(|&j| {
                        i == j
                            || similarity::agree(
                                &survivors[i].fixed_code,
                                &survivors[j].fixed_code,
                                threshold,
                            )
                    })
                    .map(|j| survivors[j])
                    .collect::<Vec<_>>()
            });
            if let Some(group) = groups.filter(|g| g.len() * 2 > n).max_by_key(|g| g.len()) {
                let chosen = best_by(&group, |r| (r.confidence, weight(r)));
                return (chosen, ConsensusSelection::Majority);
            }
        }

        let chosen = best_by(survivors, |r| (r.confidence, weight(r)));
        (chosen, ConsensusSelection::TieBreak)
    }

    fn observe_drift(&self, voters: &[ProviderResult], observers: &[ProviderResult]) {
        let Some(monitor) = &self.drift else {
            return;
        };
        let find = |id: &ProviderId| {
            voters
                .iter()
                .chain(observers.iter())
                .find(|r| &r.provider_id == id && r.is_ok())
        };
        if let (Some(primary), Some(shadow)) =
            (find(&monitor.pair().primary), find(&monitor.pair().shadow))
        {
            monitor.observe(&primary.fixed_code, &shadow.fixed_code);
        }
    }
}

/// First element with the greatest key; earlier entries win ties.
fn best_by<'a, F>(results: &[&'a ProviderResult], key: F) -> &'a ProviderResult
where
    F: Fn(&ProviderResult) -> (f64, f64),
{
    let mut best = results[0];
    let mut best_key = key(best);
    for &candidate in &results[1..] {
        let k = key(candidate);
        if k.0 > best_key.0 || (k.0 == best_key.0 && k.1 > best_key.1) {
            best = candidate;
            best_key = k;
        }
    }
    best
}

async fn call_provider(
    provider: Arc<dyn ModelProvider>,
    request: &GenerationRequest,
    timeout: Duration,
) -> ProviderResult {
    let id = provider.id().clone();
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, provider.generate(request)).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let output = match outcome {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return ProviderResult::failed(id, e.to_string(), latency_ms),
        Err(_) => {
            let e = GenerationError::Timeout {
                ms: timeout.as_millis() as u64,
            };
            return ProviderResult::failed(id, e.to_string(), latency_ms);
        }
    };

    match prompt::parse_reply(&output.text) {
        Some(fix) => ProviderResult {
            provider_id: id,
            fixed_code: fix.fixed_code,
            explanation: fix.explanation,
            confidence: fix.confidence,
            latency_ms,
            error: None,
        },
        None => ProviderResult::failed(
            id,
            RemediationError::UnparseableReply.to_string(),
            latency_ms,
        ),
    }
}
