//! Anthropic Messages API provider.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::ProviderId;
use crate::provider::{
    check_status, http_client, GenerationError, GenerationOutput, GenerationRequest,
    GenerationResult, ModelProvider,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    id: ProviderId,
    model: String,
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        id: ProviderId,
        model: &str,
        base_url: Option<&str>,
        api_key: String,
    ) -> GenerationResult<Self> {
        Ok(Self {
            id,
            model: model.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            http_client: http_client()?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{ "role": "user", "content": request.prompt }],
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn extract_text(response: MessagesResponse) -> GenerationResult<String> {
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    #[instrument(skip(self, request), fields(provider = %self.id, model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<GenerationOutput> {
        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let parsed: MessagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let text = extract_text(parsed)?;
        debug!(chars = text.len(), "anthropic generation complete");
        Ok(GenerationOutput { text })
    }
}
