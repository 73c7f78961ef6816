//! Multi-provider consensus rounds against scripted providers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use a11y_audit_core::fakes::{RecordingDriftSink, ScriptedProvider};
use a11y_audit_core::remediation::{DriftDetector, DriftMonitor, ProviderPair};
use a11y_audit_core::provider::GenerationResult;
use a11y_audit_core::{
    agreement_bonus, ConsensusBuilder, ConsensusConfig, ConsensusSelection, GenerationError,
    GenerationOutput, GenerationRequest, ModelProvider, ProviderId, ProviderRegistry,
    RemediationStrategy,
};
use async_trait::async_trait;

const FIX_A: &str = r#"<img src="logo.png" alt="Company logo">"#;
const FIX_B: &str = r#"<button type="button" aria-label="Close dialog">X</button>"#;

fn ids(names: &[&str]) -> Vec<ProviderId> {
    names.iter().map(|n| ProviderId::new(*n)).collect()
}

/// Replies with a queued sequence of fixes, repeating the last one.
struct SequenceProvider {
    id: ProviderId,
    replies: Mutex<VecDeque<String>>,
}

impl SequenceProvider {
    fn new(id: &str, fixes: &[&str]) -> Self {
        Self {
            id: ProviderId::new(id),
            replies: Mutex::new(fixes.iter().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait]
impl ModelProvider for SequenceProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn generate(&self, _request: &GenerationRequest) -> GenerationResult<GenerationOutput> {
        let mut replies = self.replies.lock().unwrap();
        let fix = if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap()
        };
        let text = serde_json::json!({
            "fixed_code": fix,
            "explanation": "sequenced",
            "confidence": 0.8,
        });
        Ok(GenerationOutput {
            text: text.to_string(),
        })
    }
}

#[tokio::test]
async fn majority_group_wins_without_bonus() {
    let registry = ProviderRegistry::new()
        .with(Arc::new(ScriptedProvider::fixing("p1", FIX_A, 0.7)))
        .with(Arc::new(ScriptedProvider::fixing("p2", FIX_A, 0.8)))
        .with(Arc::new(ScriptedProvider::fixing("p3", FIX_B, 0.95)));
    let builder = ConsensusBuilder::new(registry, ConsensusConfig::default());

    let candidate = builder
        .build_with_prompt("fix it".to_string(), &ids(&["p1", "p2", "p3"]))
        .await
        .unwrap();

    assert_eq!(candidate.strategy, RemediationStrategy::Consensus);
    assert_eq!(candidate.selection, Some(ConsensusSelection::Majority));
    assert_eq!(candidate.fixed_code, FIX_A);
    let agreement = candidate.agreement_score.unwrap();
    assert!((agreement - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(agreement_bonus(agreement), 0.0);
    assert_eq!(candidate.confidence, 0.8);
    assert_eq!(candidate.provider_results.unwrap().len(), 3);
}

#[tokio::test]
async fn unanimous_round_applies_bounded_bonus() {
    let registry = ProviderRegistry::new()
        .with(Arc::new(ScriptedProvider::fixing("p1", FIX_A, 0.9)))
        .with(Arc::new(ScriptedProvider::fixing("p2", FIX_A, 0.6)));
    let builder = ConsensusBuilder::new(registry, ConsensusConfig::default());

    let candidate = builder
        .build_with_prompt("fix it".to_string(), &ids(&["p1", "p2"]))
        .await
        .unwrap();

    assert_eq!(candidate.selection, Some(ConsensusSelection::Unanimous));
    assert_eq!(candidate.agreement_score, Some(1.0));
    // Equal weights: the higher confidence breaks the tie.
    assert!((candidate.confidence - 0.9 * 1.05).abs() < 1e-9);
    assert!(candidate.confidence <= 1.0);
}

#[tokio::test]
async fn bonus_never_pushes_confidence_past_one() {
    let registry = ProviderRegistry::new()
        .with(Arc::new(ScriptedProvider::fixing("p1", FIX_A, 1.0)))
        .with(Arc::new(ScriptedProvider::fixing("p2", FIX_A, 1.0)));
    let builder = ConsensusBuilder::new(registry, ConsensusConfig::default());
    let candidate = builder
        .build_with_prompt("fix it".to_string(), &ids(&["p1", "p2"]))
        .await
        .unwrap();
    assert_eq!(candidate.confidence, 1.0);
}

#[tokio::test]
async fn weights_decide_unanimous_selection() {
    let mut config = ConsensusConfig::default();
    config.weights.insert("p2".to_string(), 3.0);
    let registry = ProviderRegistry::new()
        .with(Arc::new(ScriptedProvider::fixing("p1", FIX_A, 0.9)))
        .with(Arc::new(ScriptedProvider::fixing("p2", FIX_A, 0.5)));
    let builder = ConsensusBuilder::new(registry, config);
    let candidate = builder
        .build_with_prompt("fix it".to_string(), &ids(&["p1", "p2"]))
        .await
        .unwrap();
    assert!((candidate.confidence - 0.5 * 1.05).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn timed_out_provider_is_kept_but_does_not_vote() {
    let config = ConsensusConfig {
        provider_timeout_ms: 1_000,
        ..ConsensusConfig::default()
    };
    let registry = ProviderRegistry::new()
        .with(Arc::new(ScriptedProvider::fixing("p1", FIX_A, 0.7)))
        .with(Arc::new(ScriptedProvider::hanging("slow")))
        .with(Arc::new(ScriptedProvider::fixing("p3", FIX_A, 0.75)));
    let builder = ConsensusBuilder::new(registry, config);

    let candidate = builder
        .build_with_prompt("fix it".to_string(), &ids(&["p1", "slow", "p3"]))
        .await
        .unwrap();

    let results = candidate.provider_results.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[1].provider_id.as_str(), "slow");
    assert!(results[1].error.as_deref().unwrap().contains("timed out"));
    // Only the two survivors were compared.
    assert_eq!(candidate.agreement_score, Some(1.0));
    assert_eq!(candidate.selection, Some(ConsensusSelection::Unanimous));
}

#[tokio::test]
async fn failed_and_unknown_providers_are_recorded() {
    let registry = ProviderRegistry::new()
        .with(Arc::new(ScriptedProvider::fixing("p1", FIX_B, 0.6)))
        .with(Arc::new(ScriptedProvider::failing(
            "down",
            GenerationError::Status {
                status: 500,
                body: "boom".to_string(),
            },
        )));
    let builder = ConsensusBuilder::new(registry, ConsensusConfig::default());

    let candidate = builder
        .build_with_prompt("fix it".to_string(), &ids(&["p1", "down", "ghost"]))
        .await
        .unwrap();

    let results = candidate.provider_results.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(!results[1].is_ok());
    assert_eq!(results[2].error.as_deref(), Some("unknown provider"));
    // A single survivor has no pairs.
    assert_eq!(candidate.agreement_score, Some(0.0));
    assert_eq!(candidate.selection, Some(ConsensusSelection::TieBreak));
    assert_eq!(candidate.fixed_code, FIX_B);
    assert_eq!(candidate.confidence, 0.6);
}

#[tokio::test]
async fn all_providers_failing_is_an_error() {
    let registry = ProviderRegistry::new()
        .with(Arc::new(ScriptedProvider::replying("p1", "sorry, no idea")))
        .with(Arc::new(ScriptedProvider::failing(
            "p2",
            GenerationError::EmptyResponse,
        )));
    let builder = ConsensusBuilder::new(registry, ConsensusConfig::default());
    let err = builder
        .build_with_prompt("fix it".to_string(), &ids(&["p1", "p2"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("all 2 providers failed"));

    let empty = builder.build_with_prompt("fix it".to_string(), &[]).await;
    assert!(empty.is_err());
}

#[tokio::test]
async fn widening_primary_shadow_gap_is_reported() {
    let sink = Arc::new(RecordingDriftSink::new());
    let shadow = Arc::new(SequenceProvider::new(
        "shadow",
        &[FIX_A, FIX_A, FIX_A, FIX_B],
    ));
    let registry = ProviderRegistry::new()
        .with(Arc::new(ScriptedProvider::fixing("primary", FIX_A, 0.9)))
        .with(Arc::new(ScriptedProvider::fixing("other", FIX_A, 0.7)))
        .with(shadow);
    let monitor = DriftMonitor::new(
        ProviderPair {
            primary: ProviderId::new("primary"),
            shadow: ProviderId::new("shadow"),
        },
        DriftDetector::new(4, 4, 0.1),
        sink.clone(),
    );
    let builder =
        ConsensusBuilder::new(registry, ConsensusConfig::default()).with_drift(monitor);
    assert_eq!(builder.shadow().map(ProviderId::as_str), Some("shadow"));

    for round in 0..4 {
        let candidate = builder
            .build_with_prompt("fix it".to_string(), &ids(&["primary", "other"]))
            .await
            .unwrap();
        // The shadow never votes.
        let results = candidate.provider_results.unwrap();
        assert_eq!(results.len(), 2, "round {round}");
        assert_eq!(candidate.fixed_code, FIX_A);
    }

    let signals = sink.signals();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].0.shadow.as_str(), "shadow");
    assert!(signals[0].1 >= 0.1);
}
