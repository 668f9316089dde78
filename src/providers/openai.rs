//! OpenAI chat completions adapter.
//!
//! See: <https://platform.openai.com/docs/api-reference/chat>

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http;
use super::traits::ProviderAdapter;
use crate::types::{AdapterOutput, GenerationRequest};
use crate::{Result, SkaldError};

/// Default base URL for the OpenAI API
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for the OpenAI chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiAdapter {
    name: String,
    api_key: String,
    model: String,
    http: Client,
    base_url: String,
}

impl OpenAiAdapter {
    /// Create a new adapter for `model` with the given API key.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Create an adapter with a custom base URL (for testing with wiremock,
    /// or an OpenAI-compatible gateway).
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: "openai".to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http: http::build_client()?,
            base_url: http::normalize_base_url(base_url),
        })
    }

    /// Attribute errors to a configured provider id instead of `"openai"`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<AdapterOutput> {
        let url = format!("{}/chat/completions", self.base_url);
        let system = request.system_instruction();
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(&self.name, e))?;

        let reply: ChatResponse = http::decode(&self.name, response).await?;
        let choice = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SkaldError::malformed(&self.name, "no choices in reply"))?;
        let content = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SkaldError::malformed(&self.name, "empty completion"))?;

        let tokens = reply
            .usage
            .map(|u| u.total_tokens)
            .unwrap_or_else(|| http::estimate_tokens(&request.prompt, &content));

        let mut output = AdapterOutput::new(content.trim(), tokens);
        if let Some(reason) = choice.finish_reason {
            output = output.with_metadata("finish_reason", reason);
        }
        Ok(output)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}
