//! Google Gemini `generateContent` adapter.
//!
//! See: <https://ai.google.dev/api/generate-content>

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http;
use super::traits::ProviderAdapter;
use crate::types::{AdapterOutput, GenerationRequest};
use crate::{Result, SkaldError};

/// Default base URL for the Gemini API
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GoogleAdapter {
    name: String,
    api_key: String,
    model: String,
    http: Client,
    base_url: String,
}

impl GoogleAdapter {
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
            name: "google".to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http: http::build_client()?,
            base_url: http::normalize_base_url(base_url),
        })
    }

    /// Attribute errors to a configured provider id instead of `"google"`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<AdapterOutput> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let system = request.system_instruction();
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: &system }],
            },
            contents: [Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            },
        };

        // Header rather than `?key=` so the key never lands in a logged URL.
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(&self.name, e))?;

        let reply: GenerateContentResponse = http::decode(&self.name, response).await?;
        let candidate = reply
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| SkaldError::malformed(&self.name, "no candidates in reply"))?;
        let content = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(SkaldError::malformed(&self.name, "candidate has no text"));
        }

        let tokens = reply
            .usage_metadata
            .and_then(|u| u.total_token_count)
            .unwrap_or_else(|| http::estimate_tokens(&request.prompt, &content));

        let mut output = AdapterOutput::new(content.trim(), tokens);
        if let Some(reason) = candidate.finish_reason {
            output = output.with_metadata("finish_reason", reason);
        }
        Ok(output)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ReplyContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u32>,
}
