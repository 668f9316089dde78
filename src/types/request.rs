//! Normalized generation requests.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::ContentKind;
use crate::{Result, SkaldError};

/// A normalized content-generation request.
///
/// Ephemeral: built per call by the content workflow, consumed by
/// [`Orchestrator::generate`](crate::Orchestrator::generate).
///
/// ```rust
/// # use skald::{ContentKind, GenerationRequest};
/// let request = GenerationRequest::new(ContentKind::Title, "Title about renewable energy")
///     .max_tokens(20)
///     .temperature(0.8)
///     .language("en");
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Prompt text, already templated by the calling layer.
    pub prompt: String,

    /// What kind of content is being produced.
    pub kind: ContentKind,

    /// Provider id to try first, if healthy and large enough.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,

    /// Maximum number of tokens to generate. Must be > 0.
    pub max_tokens: u32,

    /// Sampling temperature in `[0.0, 1.0]`.
    pub temperature: f32,

    /// Language code of the desired output (e.g. "en", "ru").
    pub language: String,

    /// Free-form context (topic, title, keywords...). Feeds topical relevance
    /// scoring; not part of the cache fingerprint.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,

    /// Who asked. Not part of the cache fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<String>,

    /// Skip the response cache for this call: no lookup, no store.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bypass_cache: bool,

    pub created_at: SystemTime,
}

impl GenerationRequest {
    /// Create a request using the kind's default budget and temperature.
    pub fn new(kind: ContentKind, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            kind,
            preferred_provider: None,
            max_tokens: kind.default_max_tokens(),
            temperature: kind.default_temperature(),
            language: "en".to_string(),
            context: BTreeMap::new(),
            requester_id: None,
            bypass_cache: false,
            created_at: SystemTime::now(),
        }
    }

    /// Set max tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the output language code.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Ask for a specific provider first.
    pub fn prefer(mut self, provider_id: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider_id.into());
        self
    }

    /// Add a context entry.
    pub fn context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Set the requester id.
    pub fn requester(mut self, id: impl Into<String>) -> Self {
        self.requester_id = Some(id.into());
        self
    }

    /// Always call a provider, leaving the cache untouched.
    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    /// Check the request is well-formed.
    ///
    /// Fails with [`SkaldError::Validation`] on an empty prompt, a zero token
    /// budget, a temperature outside `[0, 1]`, or an empty language code.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(SkaldError::Validation("prompt must not be empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(SkaldError::Validation(
                "max_tokens must be greater than zero".into(),
            ));
        }
        if !self.temperature.is_finite() || !(0.0..=1.0).contains(&self.temperature) {
            return Err(SkaldError::Validation(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.language.trim().is_empty() {
            return Err(SkaldError::Validation("language must not be empty".into()));
        }
        Ok(())
    }

    /// System instruction sent alongside the prompt by every adapter.
    pub fn system_instruction(&self) -> String {
        format!(
            "{} Respond in the language with code '{}'.",
            self.kind.instruction(),
            self.language
        )
    }
}

/// Split tag-list output into individual tags.
///
/// Accepts comma- or newline-separated lists, trims whitespace and leading
/// `#`/`-` markers, drops empties and keeps at most `limit` tags.
pub fn split_tags(content: &str, limit: usize) -> Vec<String> {
    content
        .split([',', '\n'])
        .map(|t| t.trim().trim_start_matches(['#', '-', '*']).trim())
        .filter(|t| !t.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_kind_defaults() {
        let req = GenerationRequest::new(ContentKind::Comment, "hi");
        assert_eq!(req.max_tokens, 200);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(req.language, "en");
        assert!(!req.bypass_cache);
    }

    #[test]
    fn bypass_flag_round_trips_through_json() {
        let plain = serde_json::to_value(GenerationRequest::new(ContentKind::Title, "x")).unwrap();
        assert!(plain.get("bypass_cache").is_none());

        let req = GenerationRequest::new(ContentKind::Title, "x").bypass_cache();
        let back: GenerationRequest =
            serde_json::from_value(serde_json::to_value(&req).unwrap()).unwrap();
        assert!(back.bypass_cache);
    }

    #[test]
    fn validate_rejects_empty_prompt() {
        let req = GenerationRequest::new(ContentKind::Title, "   ");
        assert!(matches!(req.validate(), Err(SkaldError::Validation(_))));
    }

    #[test]
    fn validate_rejects_zero_tokens() {
        let req = GenerationRequest::new(ContentKind::Title, "x").max_tokens(0);
        assert!(matches!(req.validate(), Err(SkaldError::Validation(_))));
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        for t in [-0.1, 1.01, f32::NAN, f32::INFINITY] {
            let req = GenerationRequest::new(ContentKind::Title, "x").temperature(t);
            assert!(req.validate().is_err(), "temperature {t} should be rejected");
        }
        let edge = GenerationRequest::new(ContentKind::Title, "x").temperature(1.0);
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn validation_errors_are_not_retriable() {
        let err = GenerationRequest::new(ContentKind::Title, "")
            .validate()
            .unwrap_err();
        assert!(!err.is_retriable());
    }

    #[test]
    fn split_tags_trims_and_limits() {
        let tags = split_tags(" rust, #async ,, tokio\n- caching, extra", 4);
        assert_eq!(tags, vec!["rust", "async", "tokio", "caching"]);
    }
}
