//! Provider registry with per-provider circuit breakers.
//!
//! The `ProviderRegistry` stores providers in registration order together
//! with their adapter and circuit breaker. Registration order is the
//! selector's tie-break order.
//!
//! # Health flow
//!
//! ```text
//!  Orchestrator                       ProviderRegistry
//!      │  list_available()  ─────────►  refresh circuits (Open → HalfOpen)
//!      │                    ◄─────────  descriptors of callable providers
//!      │  begin_attempt(id) ─────────►  claim call / half-open trial
//!      │                    ◄─────────  AttemptPermit
//!      │  adapter.generate().await
//!      │  permit.succeed() / permit.fail(kind)
//!      │                    ─────────►  update circuit, log transition
//! ```
//!
//! A permit dropped without a report (the caller was canceled) releases a
//! claimed half-open trial without counting as success or failure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::circuit::{Circuit, CircuitBreakerConfig, CircuitState, Transition};
use super::traits::ProviderAdapter;
use crate::clock::{Clock, MonotonicClock};
use crate::error::ProviderErrorKind;
use crate::telemetry;
use crate::{Result, SkaldError};

/// Static configuration of one provider.
///
/// ```rust
/// # use skald::ProviderSpec;
/// let spec = ProviderSpec::new("openai", "gpt-4o-mini")
///     .max_tokens(4096)
///     .cost_per_token(0.0001);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSpec {
    pub id: String,
    pub model: String,
    /// Largest `max_tokens` request this provider accepts.
    pub max_tokens: u32,
    /// Price per token; zero for local or free providers.
    pub cost_per_token: f64,
}

impl ProviderSpec {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            max_tokens: 4096,
            cost_per_token: 0.0,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn cost_per_token(mut self, cost: f64) -> Self {
        self.cost_per_token = cost;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(SkaldError::Configuration("provider id must not be empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(SkaldError::Configuration(format!(
                "provider {}: max_tokens must be greater than zero",
                self.id
            )));
        }
        if !self.cost_per_token.is_finite() || self.cost_per_token < 0.0 {
            return Err(SkaldError::Configuration(format!(
                "provider {}: cost_per_token must be a non-negative number",
                self.id
            )));
        }
        Ok(())
    }
}

/// Point-in-time view of a registered provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub model: String,
    pub max_tokens: u32,
    pub cost_per_token: f64,
    /// Whether a new call may start now.
    pub available: bool,
    pub circuit: CircuitState,
    pub consecutive_failures: u32,
    #[serde(skip)]
    pub open_since: Option<Instant>,
}

struct Entry {
    spec: ProviderSpec,
    adapter: Arc<dyn ProviderAdapter>,
    circuit: Mutex<Circuit>,
}

impl Entry {
    fn circuit(&self) -> MutexGuard<'_, Circuit> {
        // Circuit updates never leave the state half-written.
        self.circuit.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn describe(&self, circuit: &Circuit) -> ProviderDescriptor {
        ProviderDescriptor {
            id: self.spec.id.clone(),
            model: self.spec.model.clone(),
            max_tokens: self.spec.max_tokens,
            cost_per_token: self.spec.cost_per_token,
            available: circuit.is_available(),
            circuit: circuit.state(),
            consecutive_failures: circuit.consecutive_failures(),
            open_since: circuit.open_since(),
        }
    }
}

/// Registry of providers and their health.
pub struct ProviderRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), Arc::new(MonotonicClock))
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            config,
            clock,
        }
    }

    /// Add a provider (appended to the end of the tie-break order).
    pub fn register(&mut self, spec: ProviderSpec, adapter: Arc<dyn ProviderAdapter>) -> Result<()> {
        spec.validate()?;
        if self.index.contains_key(&spec.id) {
            return Err(SkaldError::DuplicateProvider(spec.id));
        }
        debug!(provider = %spec.id, model = %spec.model, adapter = adapter.name(), "registered provider");
        self.index.insert(spec.id.clone(), self.entries.len());
        self.entries.push(Entry {
            spec,
            adapter,
            circuit: Mutex::new(Circuit::default()),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn circuit_config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Descriptor for one provider.
    pub fn get(&self, id: &str) -> Option<ProviderDescriptor> {
        let entry = self.entry(id)?;
        let now = self.clock.now();
        let mut circuit = entry.circuit();
        self.refresh(entry, &mut circuit, now);
        Some(entry.describe(&circuit))
    }

    /// Descriptors of every registered provider, in registration order.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        let now = self.clock.now();
        self.entries
            .iter()
            .map(|entry| {
                let mut circuit = entry.circuit();
                self.refresh(entry, &mut circuit, now);
                entry.describe(&circuit)
            })
            .collect()
    }

    /// Descriptors of providers a new call may be sent to right now.
    ///
    /// Excludes open circuits and half-open circuits whose single trial is
    /// already claimed.
    pub fn list_available(&self) -> Vec<ProviderDescriptor> {
        self.descriptors().into_iter().filter(|d| d.available).collect()
    }

    /// The adapter registered under `id`.
    pub fn adapter(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.entry(id).map(|e| Arc::clone(&e.adapter))
    }

    /// Claim permission to call `id`.
    ///
    /// Returns `None` when the provider is unknown or no longer callable
    /// (circuit opened, or another caller took the half-open trial since the
    /// descriptor snapshot was taken).
    pub fn begin_attempt(&self, id: &str) -> Option<AttemptPermit<'_>> {
        let &idx = self.index.get(id)?;
        let entry = &self.entries[idx];
        let now = self.clock.now();
        let mut circuit = entry.circuit();
        self.refresh(entry, &mut circuit, now);
        let trial = circuit.try_acquire()?;
        if trial {
            debug!(provider = %entry.spec.id, "half-open trial claimed");
        }
        Some(AttemptPermit {
            registry: self,
            idx,
            trial,
            reported: false,
        })
    }

    /// Record a successful call made outside an [`AttemptPermit`].
    ///
    /// Such a call never counts as a half-open trial.
    pub fn report_success(&self, id: &str, tokens: u32, latency: Duration) {
        match self.entry(id) {
            Some(entry) => self.record_success(entry, false, tokens, latency),
            None => warn!(provider = id, "success reported for unknown provider"),
        }
    }

    /// Record a failed call made outside an [`AttemptPermit`].
    ///
    /// Such a call never counts as a half-open trial.
    pub fn report_failure(&self, id: &str, kind: ProviderErrorKind) {
        match self.entry(id) {
            Some(entry) => self.record_failure(entry, false, kind),
            None => warn!(provider = id, "failure reported for unknown provider"),
        }
    }

    /// Close every circuit and clear failure history.
    pub fn reset(&self) {
        for entry in &self.entries {
            *entry.circuit() = Circuit::default();
        }
    }

    fn record_success(&self, entry: &Entry, trial: bool, tokens: u32, latency: Duration) {
        debug!(
            provider = %entry.spec.id,
            tokens,
            latency_ms = latency.as_millis() as u64,
            trial,
            "provider call succeeded"
        );
        let transition = entry.circuit().on_success(trial);
        if let Some(t) = transition {
            self.log_transition(entry, t);
        }
    }

    fn record_failure(&self, entry: &Entry, trial: bool, kind: ProviderErrorKind) {
        let now = self.clock.now();
        let transition = entry.circuit().on_failure(now, &self.config, trial);
        if let Some(t) = transition {
            self.log_transition(entry, t);
        }
        debug!(provider = %entry.spec.id, %kind, trial, "provider call failed");
    }

    fn entry(&self, id: &str) -> Option<&Entry> {
        self.index.get(id).map(|&idx| &self.entries[idx])
    }

    fn refresh(&self, entry: &Entry, circuit: &mut Circuit, now: Instant) {
        if let Some(t) = circuit.refresh(now, &self.config) {
            self.log_transition(entry, t);
        }
    }

    fn log_transition(&self, entry: &Entry, transition: Transition) {
        let provider = entry.spec.id.as_str();
        match transition {
            Transition::Opened { cooldown } => {
                info!(provider, cooldown_secs = cooldown.as_secs(), "circuit opened")
            }
            Transition::Reopened { cooldown } => {
                info!(provider, cooldown_secs = cooldown.as_secs(), "half-open trial failed, circuit re-opened")
            }
            Transition::HalfOpened => info!(provider, "circuit half-open, next call is a trial"),
            Transition::Closed => info!(provider, "half-open trial succeeded, circuit closed"),
        }
        metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL,
            "provider" => provider.to_owned(),
            "state" => transition.state().as_str(),
        )
        .increment(1);
    }
}

/// Permission to make one call to a provider.
///
/// Consume it with [`succeed`](Self::succeed) or [`fail`](Self::fail).
/// Dropping it unreported releases a claimed half-open trial.
pub struct AttemptPermit<'a> {
    registry: &'a ProviderRegistry,
    idx: usize,
    trial: bool,
    reported: bool,
}

impl AttemptPermit<'_> {
    pub fn provider_id(&self) -> &str {
        &self.registry.entries[self.idx].spec.id
    }

    /// Whether this call is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self, tokens: u32, latency: Duration) {
        self.reported = true;
        let entry = &self.registry.entries[self.idx];
        self.registry.record_success(entry, self.trial, tokens, latency);
    }

    pub fn fail(mut self, kind: ProviderErrorKind) {
        self.reported = true;
        let entry = &self.registry.entries[self.idx];
        self.registry.record_failure(entry, self.trial, kind);
    }
}

impl Drop for AttemptPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.reported {
            let entry = &self.registry.entries[self.idx];
            entry.circuit().release_trial();
            debug!(provider = %entry.spec.id, "unreported half-open trial released");
        }
    }
}
