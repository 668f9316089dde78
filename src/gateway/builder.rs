//! Builder for configuring orchestrator instances

use std::sync::Arc;
use std::time::Duration;

use super::orchestrator::{Orchestrator, PostProcess};
use crate::cache::{CacheConfig, ResponseCache};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{Config, SecretStore};
use crate::monitor::UsageMonitor;
use crate::providers::{
    CircuitBreakerConfig, ProviderAdapter, ProviderRegistry, ProviderSelector, ProviderSpec,
    SelectionWeights,
};
use crate::quality::{QualityScorer, QualityWeights};
use crate::{Result, SkaldError};

/// Default per-attempt adapter timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default quality score below which a warning is logged.
pub const DEFAULT_LOW_QUALITY_THRESHOLD: f64 = 0.7;

/// Builder for configuring orchestrator instances.
///
/// Providers are tried in registration order when selection scores tie.
///
/// ```rust,ignore
/// let orchestrator = Orchestrator::builder()
///     .provider(ProviderSpec::new("openai", "gpt-4o-mini").cost_per_token(0.0001), openai)
///     .provider(ProviderSpec::new("claude", "claude-3-5-haiku").cost_per_token(0.00015), claude)
///     .cache(CacheConfig::new().max_entries(5_000))
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    providers: Vec<(ProviderSpec, Arc<dyn ProviderAdapter>)>,
    cache: CacheConfig,
    circuit_breaker: CircuitBreakerConfig,
    selection_weights: SelectionWeights,
    quality_weights: QualityWeights,
    clock: Arc<dyn Clock>,
    post_processor: Option<Arc<dyn PostProcess>>,
    attempt_timeout: Duration,
    low_quality_threshold: f64,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            cache: CacheConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            selection_weights: SelectionWeights::default(),
            quality_weights: QualityWeights::default(),
            clock: Arc::new(MonotonicClock),
            post_processor: None,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            low_quality_threshold: DEFAULT_LOW_QUALITY_THRESHOLD,
        }
    }

    /// Start from a loaded [`Config`], building one adapter per
    /// `[[providers]]` entry with credentials from `secrets`.
    pub fn from_config(config: &Config, secrets: &dyn SecretStore) -> Result<Self> {
        let mut builder = Self::new()
            .cache(config.cache.to_cache_config())
            .circuit_breaker(config.circuit_breaker.to_circuit_config())
            .selection_weights(config.selection)
            .quality_weights(config.quality.weights())
            .low_quality_threshold(config.quality.warn_below)
            .attempt_timeout(Duration::from_secs(config.limits.attempt_timeout_secs));
        for provider in &config.providers {
            builder = builder.provider(provider.spec(), provider.build_adapter(secrets)?);
        }
        Ok(builder)
    }

    /// Register a provider.
    pub fn provider(mut self, spec: ProviderSpec, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.push((spec, adapter));
        self
    }

    /// Configure the response cache.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Configure circuit breaking.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Set provider ranking weights.
    pub fn selection_weights(mut self, weights: SelectionWeights) -> Self {
        self.selection_weights = weights;
        self
    }

    /// Set quality signal weights.
    pub fn quality_weights(mut self, weights: QualityWeights) -> Self {
        self.quality_weights = weights;
        self
    }

    /// Use a custom clock for circuit timing and cache TTL.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install a post-processing hook.
    pub fn post_processor(mut self, hook: Arc<dyn PostProcess>) -> Self {
        self.post_processor = Some(hook);
        self
    }

    /// Set the per-attempt adapter timeout (default 30s).
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the quality score below which generated content is flagged
    /// (default 0.7).
    pub fn low_quality_threshold(mut self, threshold: f64) -> Self {
        self.low_quality_threshold = threshold;
        self
    }

    /// Build the orchestrator.
    ///
    /// Fails on duplicate provider ids, invalid provider specs or a zero
    /// attempt timeout. An orchestrator without providers is allowed; every
    /// uncached call then fails with `NoProviderAvailable`.
    pub fn build(self) -> Result<Orchestrator> {
        if self.attempt_timeout.is_zero() {
            return Err(SkaldError::Configuration(
                "attempt timeout must be greater than zero".into(),
            ));
        }

        let mut registry = ProviderRegistry::new(self.circuit_breaker, Arc::clone(&self.clock));
        for (spec, adapter) in self.providers {
            registry.register(spec, adapter)?;
        }

        Ok(Orchestrator {
            registry,
            selector: ProviderSelector::new(self.selection_weights),
            cache: ResponseCache::with_clock(&self.cache, self.clock),
            scorer: QualityScorer::new(self.quality_weights),
            monitor: UsageMonitor::new(),
            post_processor: self.post_processor,
            attempt_timeout: self.attempt_timeout,
            low_quality_threshold: self.low_quality_threshold,
        })
    }
}
