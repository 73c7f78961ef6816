//! Model provider capability.
//!
//! The router and consensus builder depend only on [`ModelProvider`]; each
//! vendor gets its own implementation:
//!
//! - [`anthropic`]: Messages API
//! - [`openai`]: Chat Completions API

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderKind};
use crate::domain::ProviderId;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Errors produced by a single generation call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("http error: {0}")]
    Http(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("api key not set: {env}")]
    MissingApiKey { env: String },

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
}

/// A text generation backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> &ProviderId;

    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<GenerationOutput>;
}

/// Ordered set of configured providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ModelProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one with the same id.
    pub fn with(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers.retain(|p| p.id() != provider.id());
        self.providers.push(provider);
        self
    }

    /// Build every configured provider.
    pub fn from_configs(configs: &[ProviderConfig]) -> GenerationResult<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry = registry.with(build_provider(config)?);
        }
        Ok(registry)
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn ModelProvider>> {
        self.providers.iter().find(|p| p.id() == id).cloned()
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Instantiate the vendor implementation for `config`.
///
/// The API key is read from the environment variable named by
/// `config.api_key_env`.
pub fn build_provider(config: &ProviderConfig) -> GenerationResult<Arc<dyn ModelProvider>> {
    let api_key =
        std::env::var(&config.api_key_env).map_err(|_| GenerationError::MissingApiKey {
            env: config.api_key_env.clone(),
        })?;
    let id = ProviderId::new(config.id.clone());
    let provider: Arc<dyn ModelProvider> = match config.kind {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            id,
            &config.model,
            config.base_url.as_deref(),
            api_key,
        )?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            id,
            &config.model,
            config.base_url.as_deref(),
            api_key,
        )?),
    };
    Ok(provider)
}

pub(crate) fn http_client() -> GenerationResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("a11y-audit/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GenerationError::Http(e.to_string()))
}

/// Turn a non-success response into [`GenerationError::Status`].
pub(crate) async fn check_status(response: reqwest::Response) -> GenerationResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GenerationError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedProvider;

    #[test]
    fn test_registry_replaces_duplicate_ids() {
        let registry = ProviderRegistry::new()
            .with(Arc::new(ScriptedProvider::replying("a", "one")))
            .with(Arc::new(ScriptedProvider::replying("b", "two")))
            .with(Arc::new(ScriptedProvider::replying("a", "three")));
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.ids(),
            vec![ProviderId::new("b"), ProviderId::new("a")]
        );
    }

    #[test]
    fn test_build_provider_requires_api_key() {
        let config = ProviderConfig {
            id: "claude".to_string(),
            kind: ProviderKind::Anthropic,
            model: "claude-model".to_string(),
            base_url: None,
            api_key_env: "A11Y_AUDIT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
        };
        let err = build_provider(&config).err().unwrap();
        assert!(matches!(err, GenerationError::MissingApiKey { .. }));
    }
}
