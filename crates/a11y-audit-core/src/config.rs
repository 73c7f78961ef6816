//! Pipeline configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! A handful of knobs can be overridden from the environment:
//!
//! - `A11Y_AUDIT_CONCURRENCY`: orchestrator worker pool size
//! - `A11Y_AUDIT_CONSENSUS_THRESHOLD`: score at which consensus is used
//! - `A11Y_AUDIT_MULTI_PROVIDER`: enable multi-provider validation
//!
//! ```toml
//! [orchestrator]
//! concurrency_limit = 4
//!
//! [router]
//! multi_provider_enabled = true
//!
//! [[providers]]
//! id = "claude"
//! kind = "anthropic"
//! model = "claude-sonnet"
//! api_key_env = "ANTHROPIC_API_KEY"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{AuditError, Result};
use crate::orchestrator::OrchestratorConfig;
use crate::remediation::{ConsensusConfig, DriftConfig, RouterConfig};

pub const ENV_CONCURRENCY: &str = "A11Y_AUDIT_CONCURRENCY";
pub const ENV_CONSENSUS_THRESHOLD: &str = "A11Y_AUDIT_CONSENSUS_THRESHOLD";
pub const ENV_MULTI_PROVIDER: &str = "A11Y_AUDIT_MULTI_PROVIDER";

/// Which vendor API a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub orchestrator: OrchestratorConfig,
    pub router: RouterConfig,
    pub consensus: ConsensusConfig,
    pub drift: DriftConfig,
    pub providers: Vec<ProviderConfig>,
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| AuditError::Config(e.to_string()))
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_CONCURRENCY) {
            self.orchestrator.concurrency_limit = parse_env(ENV_CONCURRENCY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CONSENSUS_THRESHOLD) {
            self.router.consensus_threshold = parse_env(ENV_CONSENSUS_THRESHOLD, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MULTI_PROVIDER) {
            self.router.multi_provider_enabled = parse_env(ENV_MULTI_PROVIDER, &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.concurrency_limit == 0 {
            return Err(AuditError::Config(
                "orchestrator.concurrency_limit must be at least 1".to_string(),
            ));
        }
        check_unit("router.consensus_threshold", self.router.consensus_threshold)?;
        check_unit("router.template_confidence", self.router.template_confidence)?;
        check_unit(
            "router.generic_fix_confidence",
            self.router.generic_fix_confidence,
        )?;
        check_unit(
            "consensus.unanimity_threshold",
            self.consensus.unanimity_threshold,
        )?;
        check_unit(
            "consensus.similarity_threshold",
            self.consensus.similarity_threshold,
        )?;
        if self.drift.window < 2 || self.drift.min_samples > self.drift.window {
            return Err(AuditError::Config(
                "drift.window must be >= 2 and >= drift.min_samples".to_string(),
            ));
        }

        let known = |id: &str| self.providers.iter().any(|p| p.id == id);
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.id.as_str()) {
                return Err(AuditError::Config(format!(
                    "duplicate provider id: {}",
                    provider.id
                )));
            }
        }
        let referenced = self
            .router
            .single_provider
            .iter()
            .chain(self.drift.primary.iter())
            .chain(self.drift.shadow.iter())
            .chain(self.consensus.weights.keys());
        for id in referenced {
            if !known(id) {
                return Err(AuditError::Config(format!("unknown provider id: {id}")));
            }
        }
        if let (Some(primary), Some(shadow)) = (&self.drift.primary, &self.drift.shadow) {
            if primary == shadow {
                return Err(AuditError::Config(format!(
                    "drift.primary and drift.shadow must differ, both are {primary}"
                )));
            }
        }
        if let Some((id, _)) = self
            .consensus
            .weights
            .iter()
            .find(|(_, w)| !(w.is_finite() && **w > 0.0))
        {
            return Err(AuditError::Config(format!(
                "consensus weight for {id} must be positive"
            )));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(AuditError::Config(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AuditError::Config(format!("invalid value for {key}: {raw}")))
}
