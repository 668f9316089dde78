//! Per-provider usage statistics.
//!
//! [`UsageMonitor`] keeps request counters, token and cost totals, smoothed
//! latency, quality and failure rate, plus a bounded log of recent errors for
//! each provider. Every mutation also emits the matching `metrics` series so
//! an installed recorder sees the same numbers.
//!
//! All state sits behind one mutex; critical sections are a handful of
//! arithmetic updates and never span an `.await`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::error::ProviderErrorKind;
use crate::telemetry;
use crate::types::PromptRef;

/// Errors kept per provider.
pub const ERROR_LOG_CAPACITY: usize = 100;

/// Quality scores kept for the global summary.
pub const QUALITY_WINDOW: usize = 1_000;

/// Smoothing factor for latency, quality and failure-rate averages.
const EWMA_ALPHA: f64 = 0.2;

/// One failed adapter call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub at: SystemTime,
    pub provider: String,
    pub kind: ProviderErrorKind,
    /// Hashed reference to the prompt; the raw text is never stored.
    pub prompt: PromptRef,
}

/// Exponentially weighted moving average. The first observation seeds it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Ewma {
    value: Option<f64>,
}

impl Ewma {
    fn record(&mut self, observation: f64) {
        self.value = Some(match self.value {
            None => observation,
            Some(old) => EWMA_ALPHA * observation + (1.0 - EWMA_ALPHA) * old,
        });
    }
}

/// Statistics for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderUsage {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Smoothed latency of successful calls; `None` until the first success.
    pub avg_latency: Option<Duration>,
    /// Smoothed quality of successful calls; `None` until the first success.
    pub avg_quality: Option<f64>,
    /// Smoothed share of recent calls that failed, in `[0, 1]`.
    pub recent_failure_rate: f64,
    /// Most recent errors, oldest first.
    #[serde(skip)]
    pub errors: VecDeque<ErrorRecord>,
    #[serde(skip)]
    latency: Ewma,
    #[serde(skip)]
    quality: Ewma,
    #[serde(skip)]
    failure_rate: Ewma,
}

impl ProviderUsage {
    fn observe_outcome(&mut self, failed: bool) {
        self.failure_rate.record(if failed { 1.0 } else { 0.0 });
        self.recent_failure_rate = self.failure_rate.value.unwrap_or(0.0);
    }
}

/// Min/max/mean over the most recent quality scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QualitySummary {
    pub samples: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

impl QualitySummary {
    fn over(scores: &VecDeque<f64>) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
        for &s in scores {
            min = min.min(s);
            max = max.max(s);
            sum += s;
        }
        Self {
            samples: scores.len(),
            min: Some(min),
            max: Some(max),
            mean: Some(sum / scores.len() as f64),
        }
    }
}

/// Deep copy of all monitor state at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub providers: BTreeMap<String, ProviderUsage>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub quality: QualitySummary,
}

impl UsageSnapshot {
    pub fn provider(&self, id: &str) -> Option<&ProviderUsage> {
        self.providers.get(id)
    }

    /// Share of cache lookups that hit; 0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct MonitorState {
    providers: BTreeMap<String, ProviderUsage>,
    cache_hits: u64,
    cache_misses: u64,
    quality_window: VecDeque<f64>,
}

/// Thread-safe usage statistics collector.
#[derive(Default)]
pub struct UsageMonitor {
    state: Mutex<MonitorState>,
}

impl UsageMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful adapter call.
    pub fn record_success(
        &self,
        provider: &str,
        tokens: u32,
        cost: f64,
        latency: Duration,
        quality: f64,
    ) {
        {
            let mut state = self.lock();
            let usage = state.providers.entry(provider.to_string()).or_default();
            usage.requests += 1;
            usage.successes += 1;
            usage.total_tokens += u64::from(tokens);
            if cost.is_finite() && cost > 0.0 {
                usage.total_cost += cost;
            }
            usage.latency.record(latency.as_secs_f64());
            usage.avg_latency = usage.latency.value.map(Duration::from_secs_f64);
            if quality.is_finite() {
                usage.quality.record(quality);
                usage.avg_quality = usage.quality.value;
            }
            usage.observe_outcome(false);

            if quality.is_finite() {
                if state.quality_window.len() == QUALITY_WINDOW {
                    state.quality_window.pop_front();
                }
                state.quality_window.push_back(quality);
            }
        }

        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => provider.to_owned(),
            "status" => "ok",
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "provider" => provider.to_owned(),
        )
        .record(latency.as_secs_f64());
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_owned(),
        )
        .increment(u64::from(tokens));
        metrics::histogram!(telemetry::QUALITY_SCORE,
            "provider" => provider.to_owned(),
        )
        .record(quality);
    }

    /// Record a failed adapter call.
    pub fn record_failure(&self, provider: &str, kind: ProviderErrorKind, prompt: &PromptRef) {
        {
            let mut state = self.lock();
            let usage = state.providers.entry(provider.to_string()).or_default();
            usage.requests += 1;
            usage.failures += 1;
            usage.observe_outcome(true);
            if usage.errors.len() == ERROR_LOG_CAPACITY {
                usage.errors.pop_front();
            }
            usage.errors.push_back(ErrorRecord {
                at: SystemTime::now(),
                provider: provider.to_string(),
                kind,
                prompt: prompt.clone(),
            });
        }

        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => provider.to_owned(),
            "status" => "error",
        )
        .increment(1);
        metrics::counter!(telemetry::PROVIDER_ERRORS_TOTAL,
            "provider" => provider.to_owned(),
            "kind" => kind.to_string(),
        )
        .increment(1);
    }

    pub fn record_cache_hit(&self) {
        self.lock().cache_hits += 1;
        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
    }

    pub fn record_cache_miss(&self) {
        self.lock().cache_misses += 1;
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
    }

    /// Deep copy of the current statistics.
    pub fn snapshot(&self) -> UsageSnapshot {
        let state = self.lock();
        UsageSnapshot {
            providers: state.providers.clone(),
            cache_hits: state.cache_hits,
            cache_misses: state.cache_misses,
            quality: QualitySummary::over(&state.quality_window),
        }
    }

    /// Per-provider counters and averages without the error logs or the
    /// quality summary; what provider selection reads on every attempt.
    pub fn selection_snapshot(&self) -> UsageSnapshot {
        let state = self.lock();
        UsageSnapshot {
            providers: state
                .providers
                .iter()
                .map(|(id, usage)| {
                    let light = ProviderUsage {
                        errors: VecDeque::new(),
                        ..*usage
                    };
                    (id.clone(), light)
                })
                .collect(),
            cache_hits: state.cache_hits,
            cache_misses: state.cache_misses,
            quality: QualitySummary::default(),
        }
    }

    /// Most recent errors across all providers, newest first.
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        let state = self.lock();
        let mut all: Vec<ErrorRecord> = state
            .providers
            .values()
            .flat_map(|u| u.errors.iter().cloned())
            .collect();
        all.sort_by(|a, b| b.at.cmp(&a.at));
        all.truncate(limit);
        all
    }

    /// Global quality summary over the last [`QUALITY_WINDOW`] scores.
    pub fn quality_summary(&self) -> QualitySummary {
        QualitySummary::over(&self.lock().quality_window)
    }

    /// Forget everything.
    pub fn reset(&self) {
        *self.lock() = MonitorState::default();
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        // Counters stay meaningful after a panic elsewhere; keep serving them.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
