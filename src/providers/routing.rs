//! Provider selection: preferred-provider routing and weighted ranking.
//!
//! This module provides:
//! - [`SelectionWeights`]: weights of reliability, latency and cost
//! - [`ProviderSelector`]: picks one provider id for a request
//!
//! # Preferred provider routing
//!
//! A request naming a `preferred_provider` goes to that provider whenever it
//! is available, not yet tried in this call, and large enough for the
//! request's `max_tokens`. Otherwise it falls back to ranking.
//!
//! # Ranking
//!
//! Candidates are the available, untried providers whose `max_tokens` covers
//! the request. Each gets
//!
//! ```text
//! score = reliability * (1 - recent_failure_rate)
//!       + latency     * latency_norm
//!       + cost        * cost_norm
//! ```
//!
//! where the norms are inverse latency / inverse cost divided by the best
//! candidate's, so the fastest and the cheapest candidate each score 1.0.
//! A provider without latency history scores 1.0 on latency. Equal scores
//! resolve to registration order.
//!
//! Selection is pure: the caller hands in a snapshot of descriptors and usage
//! statistics and nothing is mutated.

use std::collections::HashSet;

use serde::Deserialize;

use super::registry::ProviderDescriptor;
use crate::monitor::UsageSnapshot;
use crate::types::GenerationRequest;
use crate::{Result, SkaldError};

/// Floor for latency (seconds) and cost before inverting.
const EPSILON: f64 = 1e-9;

/// Relative weight of each ranking term.
///
/// ```toml
/// [selection]
/// reliability = 0.5
/// latency = 0.25
/// cost = 0.25
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SelectionWeights {
    pub reliability: f64,
    pub latency: f64,
    pub cost: f64,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self {
            reliability: 0.5,
            latency: 0.25,
            cost: 0.25,
        }
    }
}

impl SelectionWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reliability(mut self, w: f64) -> Self {
        self.reliability = w;
        self
    }

    pub fn latency(mut self, w: f64) -> Self {
        self.latency = w;
        self
    }

    pub fn cost(mut self, w: f64) -> Self {
        self.cost = w;
        self
    }
}

/// Everything a selection decision looks at.
#[derive(Debug, Clone, Copy)]
pub struct SelectionInput<'a> {
    /// Provider descriptors in registration order.
    pub descriptors: &'a [ProviderDescriptor],
    pub usage: &'a UsageSnapshot,
    /// Providers already tried during the current call.
    pub excluded: &'a HashSet<String>,
}

/// A ranked candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProvider {
    pub id: String,
    pub score: f64,
}

/// Weighted provider selector.
#[derive(Debug, Clone, Default)]
pub struct ProviderSelector {
    weights: SelectionWeights,
}

impl ProviderSelector {
    pub fn new(weights: SelectionWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &SelectionWeights {
        &self.weights
    }

    /// Pick the provider for `request`.
    ///
    /// Fails with [`SkaldError::NoProviderAvailable`] when no available,
    /// untried provider can serve the request.
    pub fn select(&self, request: &GenerationRequest, input: &SelectionInput<'_>) -> Result<String> {
        if let Some(preferred) = request.preferred_provider.as_deref()
            && let Some(d) = input.descriptors.iter().find(|d| d.id == preferred)
            && is_candidate(d, request, input)
        {
            return Ok(d.id.clone());
        }

        let mut best: Option<ScoredProvider> = None;
        for scored in self.rank(request, input) {
            // Strictly greater keeps the earliest registered on ties.
            if best.as_ref().is_none_or(|b| scored.score > b.score) {
                best = Some(scored);
            }
        }
        best.map(|b| b.id).ok_or(SkaldError::NoProviderAvailable)
    }

    /// Score every candidate, in registration order.
    pub fn rank(&self, request: &GenerationRequest, input: &SelectionInput<'_>) -> Vec<ScoredProvider> {
        let candidates: Vec<&ProviderDescriptor> = input
            .descriptors
            .iter()
            .filter(|d| is_candidate(d, request, input))
            .collect();

        let inverse_latency = |d: &ProviderDescriptor| {
            input
                .usage
                .provider(&d.id)
                .and_then(|u| u.avg_latency)
                .map(|l| 1.0 / l.as_secs_f64().max(EPSILON))
        };
        let inverse_cost = |d: &ProviderDescriptor| 1.0 / d.cost_per_token.max(EPSILON);

        let best_latency = candidates
            .iter()
            .filter_map(|d| inverse_latency(d))
            .fold(0.0_f64, f64::max);
        let best_cost = candidates
            .iter()
            .map(|d| inverse_cost(d))
            .fold(0.0_f64, f64::max);

        candidates
            .into_iter()
            .map(|d| {
                let failure_rate = input
                    .usage
                    .provider(&d.id)
                    .map(|u| u.recent_failure_rate)
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0);
                let latency_norm = match inverse_latency(d) {
                    Some(inv) if best_latency > 0.0 => inv / best_latency,
                    _ => 1.0,
                };
                let cost_norm = if best_cost > 0.0 {
                    inverse_cost(d) / best_cost
                } else {
                    1.0
                };
                let score = self.weights.reliability * (1.0 - failure_rate)
                    + self.weights.latency * latency_norm
                    + self.weights.cost * cost_norm;
                ScoredProvider {
                    id: d.id.clone(),
                    score: if score.is_nan() { 0.0 } else { score },
                }
            })
            .collect()
    }
}

fn is_candidate(d: &ProviderDescriptor, request: &GenerationRequest, input: &SelectionInput<'_>) -> bool {
    d.available && !input.excluded.contains(&d.id) && d.max_tokens >= request.max_tokens
}
