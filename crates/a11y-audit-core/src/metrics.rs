//! Process-wide pipeline counters.
//!
//! Counters are bumped at the call site and emitted together by
//! [`Metrics::flush`], typically once a job completes.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

/// Relaxed atomic counters; no locking.
pub struct Metrics {
    targets_scanned: AtomicU64,
    targets_failed: AtomicU64,
    template_hits: AtomicU64,
    single_model_calls: AtomicU64,
    consensus_rounds: AtomicU64,
    provider_failures: AtomicU64,
    drift_signals: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub targets_scanned: u64,
    pub targets_failed: u64,
    pub template_hits: u64,
    pub single_model_calls: u64,
    pub consensus_rounds: u64,
    pub provider_failures: u64,
    pub drift_signals: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            targets_scanned: AtomicU64::new(0),
            targets_failed: AtomicU64::new(0),
            template_hits: AtomicU64::new(0),
            single_model_calls: AtomicU64::new(0),
            consensus_rounds: AtomicU64::new(0),
            provider_failures: AtomicU64::new(0),
            drift_signals: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_targets_scanned(&self) {
        Self::bump(&self.targets_scanned, "targets_scanned");
    }

    /// A target that ended with a render timeout or render error.
    pub fn inc_targets_failed(&self) {
        Self::bump(&self.targets_failed, "targets_failed");
    }

    pub fn inc_template_hits(&self) {
        Self::bump(&self.template_hits, "template_hits");
    }

    pub fn inc_single_model_calls(&self) {
        Self::bump(&self.single_model_calls, "single_model_calls");
    }

    pub fn inc_consensus_rounds(&self) {
        Self::bump(&self.consensus_rounds, "consensus_rounds");
    }

    pub fn inc_provider_failures(&self) {
        Self::bump(&self.provider_failures, "provider_failures");
    }

    pub fn inc_drift_signals(&self) {
        Self::bump(&self.drift_signals, "drift_signals");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            targets_scanned: self.targets_scanned.load(Ordering::Relaxed),
            targets_failed: self.targets_failed.load(Ordering::Relaxed),
            template_hits: self.template_hits.load(Ordering::Relaxed),
            single_model_calls: self.single_model_calls.load(Ordering::Relaxed),
            consensus_rounds: self.consensus_rounds.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            drift_signals: self.drift_signals.load(Ordering::Relaxed),
        }
    }

    /// Emit all counters as one `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            targets_scanned = s.targets_scanned,
            targets_failed = s.targets_failed,
            template_hits = s.template_hits,
            single_model_calls = s.single_model_calls,
            consensus_rounds = s.consensus_rounds,
            provider_failures = s.provider_failures,
            drift_signals = s.drift_signals,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.targets_scanned,
            &self.targets_failed,
            &self.template_hits,
            &self.single_model_calls,
            &self.consensus_rounds,
            &self.provider_failures,
            &self.drift_signals,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_targets_scanned();
        m.inc_targets_scanned();
        m.inc_targets_failed();
        m.inc_consensus_rounds();
        let s = m.snapshot();
        assert_eq!(s.targets_scanned, 2);
        assert_eq!(s.targets_failed, 1);
        assert_eq!(s.consensus_rounds, 1);
        assert_eq!(s.template_hits, 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_template_hits();
        m.inc_provider_failures();
        m.inc_drift_signals();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
