//! Anthropic messages API adapter.
//!
//! See: <https://docs.anthropic.com/en/api/messages>

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http;
use super::traits::ProviderAdapter;
use crate::types::{AdapterOutput, GenerationRequest};
use crate::{Result, SkaldError};

/// Default base URL for the Anthropic API
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic messages endpoint.
#[derive(Clone)]
pub struct AnthropicAdapter {
    name: String,
    api_key: String,
    model: String,
    http: Client,
    base_url: String,
}

impl AnthropicAdapter {
    /// Create a new adapter for `model` with the given API key.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Create an adapter with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: "anthropic".to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http: http::build_client()?,
            base_url: http::normalize_base_url(base_url),
        })
    }

    /// Attribute errors to a configured provider id instead of `"anthropic"`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<AdapterOutput> {
        let url = format!("{}/messages", self.base_url);
        let system = request.system_instruction();
        let body = MessagesRequest {
            model: &self.model,
            system: &system,
            messages: [UserMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(&self.name, e))?;

        let reply: MessagesResponse = http::decode(&self.name, response).await?;
        let content = reply
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if content.trim().is_empty() {
            return Err(SkaldError::malformed(&self.name, "no text content in reply"));
        }

        let tokens = reply
            .usage
            .map(|u| u.input_tokens.saturating_add(u.output_tokens))
            .unwrap_or_else(|| http::estimate_tokens(&request.prompt, &content));

        let mut output = AdapterOutput::new(content.trim(), tokens);
        if let Some(reason) = reply.stop_reason {
            output = output.with_metadata("finish_reason", reason);
        }
        Ok(output)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}
