//! OpenAI-compatible LLM client
//!
//! Provides async HTTP access to chat completions and embeddings. Every call
//! returns a tagged [`Failure`] instead of an error so the orchestrating stage
//! can decide whether to fall back. Retries are not performed here.

use std::time::Duration;

use reqwest::Client as HttpClient;
use tracing::debug;

use crate::capability::Failure;
use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::{
    ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, LlmResponse, Message,
};

/// OpenAI-compatible LLM client
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    api_key: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

/// Builder for creating an LlmClient
#[derive(Default)]
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the configured base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<LlmClient> {
        let mut config = self.config.unwrap_or_default();
        let api_key = self
            .api_key
            .ok_or_else(|| Error::ConfigError("LLM API key is required".to_string()))?;

        if let Some(url) = self.base_url {
            config.base_url = url;
        }

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(LlmClient {
            http_client,
            config,
            api_key,
        })
    }
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        LlmClientBuilder::new().config(config).api_key(api_key).build()
    }

    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Make a single chat completion request
    pub async fn complete(
        &self,
        messages: Vec<Message>,
    ) -> std::result::Result<LlmResponse, Failure> {
        let request = ChatRequest::new(&self.config.model, messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let url = format!("{}/chat/completions", self.base_url());
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", "CyberX")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::from_status(status.as_u16(), &body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Failure::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        LlmResponse::from_chat_response(chat_response)
            .ok_or_else(|| Failure::InvalidResponse("Empty response from API".to_string()))
    }

    /// Generate an embedding for a single text
    pub async fn embed(
        &self,
        text: &str,
        model: &str,
        dimensions: Option<usize>,
    ) -> std::result::Result<Vec<f32>, Failure> {
        let mut request = EmbeddingRequest::new(model, text);
        if let Some(dims) = dimensions {
            request = request.with_dimensions(dims);
        }

        let url = format!("{}/embeddings", self.base_url());
        debug!(model = %request.model, "Sending embedding request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::from_status(status.as_u16(), &body));
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Failure::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let vector = embedding_response
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| Failure::InvalidResponse("Empty embedding response".to_string()))?;

        if vector.is_empty() {
            return Err(Failure::InvalidResponse("Zero-length embedding".to_string()));
        }
        Ok(vector)
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

/// Strip a Markdown code fence that models like to wrap JSON in
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_key() {
        let result = LlmClient::builder().config(LlmConfig::default()).build();
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_builder_overrides_base_url() {
        let client = LlmClient::builder()
            .api_key("test-key")
            .base_url("http://localhost:9/v1/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:9/v1");
        assert_eq!(client.model(), "gemini-2.0-flash");
    }

    #[test]
    fn test_debug_hides_key() {
        let client = LlmClient::new(LlmConfig::default(), "secret-key").unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("LlmClient"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_client_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LlmClient>();
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"b\": 2} "), "{\"b\": 2}");
    }

    #[tokio::test]
    async fn test_unreachable_host_maps_to_unreachable() {
        let mut config = LlmConfig::default();
        config.timeout_secs = 2;
        let client = LlmClient::builder()
            .config(config)
            .api_key("test-key")
            .base_url("http://127.0.0.1:9")
            .build()
            .unwrap();

        let result = client.complete(vec![Message::user("hello")]).await;
        assert!(matches!(result, Err(Failure::Unreachable(_))));
    }
}
