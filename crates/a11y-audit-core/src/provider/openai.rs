//! OpenAI Chat Completions provider.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::ProviderId;
use crate::provider::{
    check_status, http_client, GenerationError, GenerationOutput, GenerationRequest,
    GenerationResult, ModelProvider,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    id: ProviderId,
    model: String,
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenAiProvider {
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
        format!("{}/v1/chat/completions", self.base_url)
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
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_text(response: ChatResponse) -> GenerationResult<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(GenerationError::EmptyResponse)
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    #[instrument(skip(self, request), fields(provider = %self.id, model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<GenerationOutput> {
        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let parsed: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let text = extract_text(parsed)?;
        debug!(chars = text.len(), "openai generation complete");
        Ok(GenerationOutput { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let provider =
            OpenAiProvider::new(ProviderId::new("gpt"), "gpt-model", None, "key".into()).unwrap();
        assert_eq!(
            provider.endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        let body = provider.request_body(&GenerationRequest {
            prompt: "p".into(),
            max_tokens: 10,
            temperature: 0.0,
        });
        assert_eq!(body["model"], "gpt-model");
    }

    #[test]
    fn test_extract_text_takes_first_choice() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [
                {"message": {"role": "assistant", "content": "first"}},
                {"message": {"role": "assistant", "content": "second"}}
            ]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "first");
    }

    #[test]
    fn test_extract_text_null_content_is_empty() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        }))
        .unwrap();
        assert_eq!(extract_text(response), Err(GenerationError::EmptyResponse));
    }
}
