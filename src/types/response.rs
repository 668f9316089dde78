//! Generation response types

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Metadata key carrying the cache-hit flag (`"true"` / `"false"`).
pub(crate) const CACHE_HIT_KEY: &str = "cache_hit";

/// Raw result of a single adapter call, before scoring and costing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterOutput {
    pub content: String,
    pub tokens_used: u32,
    /// Vendor details worth surfacing (finish reason, token split...).
    pub metadata: BTreeMap<String, String>,
}

impl AdapterOutput {
    pub fn new(content: impl Into<String>, tokens_used: u32) -> Self {
        Self {
            content: content.into(),
            tokens_used,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Generated content with attribution, cost and quality.
///
/// Immutable once produced: fields are read through accessors. Post-process
/// hooks may derive a rewritten copy with [`with_content`](Self::with_content).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    content: String,
    provider_id: String,
    model_id: String,
    tokens_used: u32,
    processing_time: Duration,
    quality_score: f64,
    cost: f64,
    timestamp: SystemTime,
    metadata: BTreeMap<String, String>,
}

impl GenerationResponse {
    /// Assemble a fresh (non-cached) response.
    ///
    /// Quality is clamped to `[0, 1]` and cost to `>= 0`.
    pub(crate) fn new(
        output: AdapterOutput,
        provider_id: &str,
        model_id: &str,
        processing_time: Duration,
        quality_score: f64,
        cost_per_token: f64,
    ) -> Self {
        let mut metadata = output.metadata;
        metadata.insert(CACHE_HIT_KEY.to_string(), "false".to_string());
        let cost = f64::from(output.tokens_used) * cost_per_token;
        Self {
            content: output.content,
            provider_id: provider_id.to_string(),
            model_id: model_id.to_string(),
            tokens_used: output.tokens_used,
            processing_time,
            quality_score: sanitize_unit(quality_score),
            cost: if cost.is_finite() { cost.max(0.0) } else { 0.0 },
            timestamp: SystemTime::now(),
            metadata,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn tokens_used(&self) -> u32 {
        self.tokens_used
    }

    pub fn processing_time(&self) -> Duration {
        self.processing_time
    }

    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Whether this response was served from the response cache.
    pub fn cache_hit(&self) -> bool {
        self.metadata.get(CACHE_HIT_KEY).map(String::as_str) == Some("true")
    }

    /// Copy with replaced content, for post-processing hooks.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }

    /// Copy with an extra metadata entry.
    pub fn with_metadata(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.metadata.insert(key.into(), value.into());
        copy
    }

    pub(crate) fn as_cache_hit(&self) -> Self {
        self.with_metadata(CACHE_HIT_KEY, "true")
    }
}

fn sanitize_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
