//! In-memory test doubles for the pipeline's collaborators (testing only).
//!
//! Provides `StaticRenderer`, `ScriptedProvider` and `RecordingDriftSink`,
//! each with counters so tests can assert how often they were called.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ProviderId, RawFinding};
use crate::provider::{
    GenerationError, GenerationOutput, GenerationRequest, GenerationResult, ModelProvider,
};
use crate::remediation::{DriftSink, ProviderPair};
use crate::renderer::{PageRenderer, RenderError, RenderedPage};

// ---------------------------------------------------------------------------
// StaticRenderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum RenderScript {
    Findings(Vec<RawFinding>),
    Timeout,
    Fail(String),
    /// Never completes; exercises the caller's render timeout.
    Hang,
}

/// Renderer with scripted per-URL outcomes.
///
/// Unscripted URLs render as clean pages with no findings.
#[derive(Debug, Default)]
pub struct StaticRenderer {
    scripts: HashMap<String, RenderScript>,
    delay: Duration,
    url_delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_findings(mut self, url: &str, findings: Vec<RawFinding>) -> Self {
        self.scripts
            .insert(url.to_string(), RenderScript::Findings(findings));
        self
    }

    pub fn with_timeout(mut self, url: &str) -> Self {
        self.scripts.insert(url.to_string(), RenderScript::Timeout);
        self
    }

    pub fn with_failure(mut self, url: &str, reason: &str) -> Self {
        self.scripts
            .insert(url.to_string(), RenderScript::Fail(reason.to_string()));
        self
    }

    pub fn with_hang(mut self, url: &str) -> Self {
        self.scripts.insert(url.to_string(), RenderScript::Hang);
        self
    }

    /// Delay applied to every render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay applied to renders of `url` only, instead of the shared delay.
    pub fn with_url_delay(mut self, url: &str, delay: Duration) -> Self {
        self.url_delays.insert(url.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of renders observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for StaticRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.url_delays.get(url).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.scripts.get(url) {
            None => Ok(RenderedPage::default()),
            Some(RenderScript::Findings(findings)) => Ok(RenderedPage {
                dom_snapshot: format!("<html><!-- {url} --></html>"),
                raw_findings: findings.clone(),
            }),
            Some(RenderScript::Timeout) => Err(RenderError::Timeout),
            Some(RenderScript::Fail(reason)) => Err(RenderError::Failed(reason.clone())),
            Some(RenderScript::Hang) => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum ProviderScript {
    Reply(String),
    Fail(GenerationError),
    Hang,
}

/// Model provider that returns a fixed outcome and counts calls.
#[derive(Debug)]
pub struct ScriptedProvider {
    id: ProviderId,
    script: ProviderScript,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn with_script(id: &str, script: ProviderScript) -> Self {
        Self {
            id: ProviderId::new(id),
            script,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Reply with raw `text`.
    pub fn replying(id: &str, text: &str) -> Self {
        Self::with_script(id, ProviderScript::Reply(text.to_string()))
    }

    /// Reply with a well-formed JSON fix.
    pub fn fixing(id: &str, fixed_code: &str, confidence: f64) -> Self {
        let reply = serde_json::json!({
            "fixed_code": fixed_code,
            "explanation": format!("fix proposed by {id}"),
            "confidence": confidence,
        });
        Self::with_script(id, ProviderScript::Reply(reply.to_string()))
    }

    pub fn failing(id: &str, error: GenerationError) -> Self {
        Self::with_script(id, ProviderScript::Fail(error))
    }

    /// Never answers; exercises the caller's provider timeout.
    pub fn hanging(id: &str) -> Self {
        Self::with_script(id, ProviderScript::Hang)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn generate(&self, _request: &GenerationRequest) -> GenerationResult<GenerationOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            ProviderScript::Reply(text) => Ok(GenerationOutput { text: text.clone() }),
            ProviderScript::Fail(error) => Err(error.clone()),
            ProviderScript::Hang => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingDriftSink
// ---------------------------------------------------------------------------

/// Drift sink that keeps every signal it receives.
#[derive(Debug, Default)]
pub struct RecordingDriftSink {
    signals: Mutex<Vec<(ProviderPair, f64)>>,
}

impl RecordingDriftSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<(ProviderPair, f64)> {
        self.signals.lock().unwrap().clone()
    }
}

impl DriftSink for RecordingDriftSink {
    fn record_drift(&self, pair: &ProviderPair, magnitude: f64) {
        self.signals.lock().unwrap().push((pair.clone(), magnitude));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_renderer_tracks_calls() {
        let renderer = StaticRenderer::new().with_timeout("https://slow.example");
        assert_eq!(
            renderer.render("https://slow.example").await,
            Err(RenderError::Timeout)
        );
        assert!(renderer.render("https://clean.example").await.is_ok());
        assert_eq!(renderer.calls(), 2);
        assert_eq!(renderer.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_scripted_provider_counts_calls() {
        let provider = ScriptedProvider::fixing("a", "<a href=\"/\">Home</a>", 0.8);
        let request = GenerationRequest {
            prompt: String::new(),
            max_tokens: 1,
            temperature: 0.0,
        };
        let out = provider.generate(&request).await.unwrap();
        assert!(out.text.contains("fixed_code"));
        assert_eq!(provider.calls(), 1);
    }
}
