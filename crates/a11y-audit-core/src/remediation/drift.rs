//! Primary/shadow provider drift detection.
//!
//! Every consensus round that produced output from both the primary and the
//! shadow provider feeds one disagreement sample (`1 - similarity`) into a
//! rolling window. When the mean of the newer half of the window exceeds the
//! mean of the older half by at least `trend_threshold`, the widening is
//! reported to a [`DriftSink`]. Nothing is acted upon automatically.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::ProviderId;
use crate::metrics::METRICS;
use crate::obs;
use crate::remediation::similarity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub primary: Option<String>,
    pub shadow: Option<String>,
    /// Number of samples kept.
    pub window: usize,
    /// Samples required before a trend is evaluated.
    pub min_samples: usize,
    pub trend_threshold: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            primary: None,
            shadow: None,
            window: 20,
            min_samples: 6,
            trend_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderPair {
    pub primary: ProviderId,
    pub shadow: ProviderId,
}

impl std::fmt::Display for ProviderPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.primary, self.shadow)
    }
}

/// Monitoring collaborator that receives drift signals.
///
/// Implementations must return promptly; the call sits on the remediation
/// path.
pub trait DriftSink: Send + Sync {
    fn record_drift(&self, pair: &ProviderPair, magnitude: f64);
}

/// Logs each signal as a `drift.detected` warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDriftSink;

impl DriftSink for TracingDriftSink {
    fn record_drift(&self, pair: &ProviderPair, magnitude: f64) {
        obs::emit_drift_detected(pair.primary.as_str(), pair.shadow.as_str(), magnitude);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSignal {
    pub pair: ProviderPair,
    pub magnitude: f64,
    pub detected_at: DateTime<Utc>,
}

/// Forwards signals over an unbounded channel.
///
/// Sends never block; signals are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelDriftSink {
    tx: mpsc::UnboundedSender<DriftSignal>,
}

impl ChannelDriftSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DriftSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DriftSink for ChannelDriftSink {
    fn record_drift(&self, pair: &ProviderPair, magnitude: f64) {
        let signal = DriftSignal {
            pair: pair.clone(),
            magnitude,
            detected_at: Utc::now(),
        };
        if self.tx.send(signal).is_err() {
            tracing::debug!(pair = %pair, "drift receiver closed; signal dropped");
        }
    }
}

/// Rolling-window trend detector over disagreement samples in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    window: usize,
    min_samples: usize,
    trend_threshold: f64,
    samples: VecDeque<f64>,
}

impl DriftDetector {
    pub fn new(window: usize, min_samples: usize, trend_threshold: f64) -> Self {
        let window = window.max(2);
        Self {
            window,
            min_samples: min_samples.clamp(2, window),
            trend_threshold,
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn from_config(config: &DriftConfig) -> Self {
        Self::new(config.window, config.min_samples, config.trend_threshold)
    }

    /// Record a sample. Returns the trend magnitude when it reaches the
    /// threshold.
    pub fn observe(&mut self, disagreement: f64) -> Option<f64> {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(disagreement.clamp(0.0, 1.0));
        self.trend().filter(|t| *t >= self.trend_threshold)
    }

    /// Newer-half mean minus older-half mean, once enough samples exist.
    pub fn trend(&self) -> Option<f64> {
        if self.samples.len() < self.min_samples {
            return None;
        }
        let all: Vec<f64> = self.samples.iter().copied().collect();
        let (older, newer) = all.split_at(all.len() / 2);
        Some(mean(newer) - mean(older))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// A detector bound to one provider pair and a sink.
pub struct DriftMonitor {
    pair: ProviderPair,
    detector: Mutex<DriftDetector>,
    sink: Arc<dyn DriftSink>,
}

impl std::fmt::Debug for DriftMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftMonitor")
            .field("pair", &self.pair)
            .finish_non_exhaustive()
    }
}

impl DriftMonitor {
    pub fn new(pair: ProviderPair, detector: DriftDetector, sink: Arc<dyn DriftSink>) -> Self {
        Self {
            pair,
            detector: Mutex::new(detector),
            sink,
        }
    }

    /// `None` unless both a primary and a shadow are configured.
    pub fn from_config(config: &DriftConfig, sink: Arc<dyn DriftSink>) -> Option<Self> {
        let pair = ProviderPair {
            primary: ProviderId::new(config.primary.clone()?),
            shadow: ProviderId::new(config.shadow.clone()?),
        };
        Some(Self::new(pair, DriftDetector::from_config(config), sink))
    }

    pub fn pair(&self) -> &ProviderPair {
        &self.pair
    }

    /// Compare one round's primary and shadow fixes. Returns the reported
    /// magnitude, if any.
    pub fn observe(&self, primary_code: &str, shadow_code: &str) -> Option<f64> {
        let disagreement = 1.0 - similarity::similarity(primary_code, shadow_code);
        let magnitude = {
            let mut detector = self.detector.lock().unwrap_or_else(|e| e.into_inner());
            detector.observe(disagreement)?
        };
        METRICS.inc_drift_signals();
        self.sink.record_drift(&self.pair, magnitude);
        Some(magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_trend_before_min_samples() {
        let mut d = DriftDetector::new(10, 4, 0.1);
        assert_eq!(d.observe(0.0), None);
        assert_eq!(d.observe(1.0), None);
        assert_eq!(d.observe(1.0), None);
        assert!(d.trend().is_none());
    }

    #[test]
    fn test_widening_disagreement_is_reported() {
        let mut d = DriftDetector::new(10, 4, 0.1);
        for _ in 0..3 {
            assert_eq!(d.observe(0.0), None);
        }
        let magnitude = d.observe(0.8).unwrap();
        // older [0, 0], newer [0, 0.8]
        assert!((magnitude - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_stable_disagreement_is_not_drift() {
        let mut d = DriftDetector::new(6, 6, 0.1);
        for _ in 0..12 {
            assert_eq!(d.observe(0.5), None);
        }
        assert_eq!(d.len(), 6);
        assert_eq!(d.trend(), Some(0.0));
    }

    #[test]
    fn test_narrowing_disagreement_is_not_drift() {
        let mut d = DriftDetector::new(6, 6, 0.1);
        for s in [0.9, 0.9, 0.9, 0.1, 0.1] {
            d.observe(s);
        }
        assert_eq!(d.observe(0.1), None);
        assert!(d.trend().unwrap() < 0.0);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_signal() {
        let (sink, mut rx) = ChannelDriftSink::new();
        let pair = ProviderPair {
            primary: "claude".into(),
            shadow: "gpt".into(),
        };
        sink.record_drift(&pair, 0.3);
        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.pair, pair);
        assert_eq!(signal.magnitude, 0.3);
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (sink, rx) = ChannelDriftSink::new();
        drop(rx);
        sink.record_drift(
            &ProviderPair {
                primary: "a".into(),
                shadow: "b".into(),
            },
            0.5,
        );
    }

    #[test]
    fn test_monitor_requires_both_providers() {
        let config = DriftConfig {
            primary: Some("claude".to_string()),
            ..DriftConfig::default()
        };
        assert!(DriftMonitor::from_config(&config, Arc::new(TracingDriftSink)).is_none());
    }
}
