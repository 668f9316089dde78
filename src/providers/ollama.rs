//! Ollama adapter for locally hosted models.
//!
//! Local providers need no API key and are normally configured with a cost
//! of zero per token.
//!
//! See: <https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-completion>

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http;
use super::traits::ProviderAdapter;
use crate::types::{AdapterOutput, GenerationRequest};
use crate::{Result, SkaldError};

/// Default address of a local Ollama server
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for the Ollama `/api/generate` endpoint.
#[derive(Clone)]
pub struct OllamaAdapter {
    name: String,
    model: String,
    http: Client,
    base_url: String,
}

impl OllamaAdapter {
    /// Create an adapter for `model` on the default local server.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(model, DEFAULT_BASE_URL)
    }

    /// Create an adapter against a server at `base_url`.
    pub fn with_base_url(model: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: "ollama".to_string(),
            model: model.into(),
            http: http::build_client()?,
            base_url: http::normalize_base_url(base_url),
        })
    }

    /// Attribute errors to a configured provider id instead of `"ollama"`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<AdapterOutput> {
        let url = format!("{}/api/generate", self.base_url);
        let system = request.system_instruction();
        let body = GenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: &system,
            stream: false,
            options: Options {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(&self.name, e))?;

        let reply: GenerateResponse = http::decode(&self.name, response).await?;
        let content = reply
            .response
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SkaldError::malformed(&self.name, "empty completion"))?;

        // Older servers omit the eval counters; fall back to a word count.
        let tokens = match (reply.prompt_eval_count, reply.eval_count) {
            (None, None) => http::estimate_tokens(&request.prompt, &content),
            (prompt, completion) => prompt.unwrap_or(0).saturating_add(completion.unwrap_or(0)),
        };

        let mut output = AdapterOutput::new(content.trim(), tokens).with_metadata("local", "true");
        if let Some(reason) = reply.done_reason {
            output = output.with_metadata("finish_reason", reason);
        }
        Ok(output)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}
