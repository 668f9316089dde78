//! End-to-end orchestrator tests with in-process mock adapters.
//!
//! Covers cache hits, cost attribution, failover, circuit breaking through
//! the full call path, caller deadlines and cancellation, post-processing
//! and statistics.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use skald::{
    AdapterOutput, CacheConfig, CallContext, CircuitBreakerConfig, CircuitState, ContentKind,
    Fingerprint, GenerationRequest, GenerationResponse, ManualClock, Orchestrator, PostProcess,
    ProviderAdapter, ProviderErrorKind, ProviderSpec, Result, SkaldError,
};

// ============================================================================
// Mock adapters
// ============================================================================

/// Always answers with the same content.
struct StaticAdapter {
    name: &'static str,
    content: &'static str,
    tokens: u32,
    calls: AtomicUsize,
}

impl StaticAdapter {
    fn new(name: &'static str, tokens: u32) -> Arc<Self> {
        Arc::new(Self {
            name,
            content: "Solar Rising: How Renewable Energy Reshapes Our Cities",
            tokens,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StaticAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<AdapterOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AdapterOutput::new(self.content, self.tokens))
    }
}

/// Always fails with a rejection.
struct FailingAdapter {
    name: &'static str,
    calls: AtomicUsize,
}

impl FailingAdapter {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProviderAdapter for FailingAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<AdapterOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SkaldError::ProviderRejected {
            provider: self.name.to_string(),
            status: Some(500),
            message: "internal error".to_string(),
        })
    }
}

/// Sleeps far longer than any attempt timeout used in these tests.
struct SlowAdapter {
    name: &'static str,
    calls: AtomicUsize,
}

impl SlowAdapter {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProviderAdapter for SlowAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<AdapterOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(AdapterOutput::new("too late", 1))
    }
}

/// Plays back a fixed sequence of outcomes, then keeps succeeding.
struct ScriptedAdapter {
    name: &'static str,
    script: Mutex<VecDeque<bool>>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    fn new(name: &'static str, outcomes: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Mutex::new(outcomes.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<AdapterOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ok = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if ok {
            Ok(AdapterOutput::new("Wind and Sun", 5))
        } else {
            Err(SkaldError::ProviderMalformedReply {
                provider: self.name.to_string(),
                message: "garbled".to_string(),
            })
        }
    }
}

/// Blocks until released, so a test can hold a call in flight.
struct GatedAdapter {
    gate: Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl ProviderAdapter for GatedAdapter {
    fn name(&self) -> &str {
        "gated"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<AdapterOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(AdapterOutput::new("Released", 2))
    }
}

// ============================================================================
// Post-process hooks
// ============================================================================

struct AppendSignature;

#[async_trait]
impl PostProcess for AppendSignature {
    async fn post_process(&self, response: GenerationResponse) -> Result<GenerationResponse> {
        let content = format!("{} | edited", response.content());
        Ok(response.with_content(content))
    }
}

struct RejectEverything;

#[async_trait]
impl PostProcess for RejectEverything {
    async fn post_process(&self, _response: GenerationResponse) -> Result<GenerationResponse> {
        Err(SkaldError::ContentRejected {
            reason: "contains banned phrase".to_string(),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn scenario_request() -> GenerationRequest {
    GenerationRequest::new(ContentKind::Title, "Title about renewable energy")
        .max_tokens(20)
        .temperature(0.8)
}

// ============================================================================
// Cache and cost
// ============================================================================

#[tokio::test]
async fn cheapest_provider_is_selected_and_response_cached() {
    let cheap = StaticAdapter::new("cheap", 12);
    let pricey = StaticAdapter::new("pricey", 12);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("cheap", "model-a").cost_per_token(0.0001), cheap.clone())
        .provider(ProviderSpec::new("pricey", "model-b").cost_per_token(0.00015), pricey.clone())
        .build()
        .unwrap();

    let request = scenario_request();
    let response = orchestrator.generate(&request).await.unwrap();

    assert_eq!(response.provider_id(), "cheap");
    assert_eq!(response.model_id(), "model-a");
    assert_eq!(response.tokens_used(), 12);
    assert!((response.cost() - 12.0 * 0.0001).abs() < 1e-12);
    assert!(!response.cache_hit());
    assert!((0.0..=1.0).contains(&response.quality_score()));

    assert_eq!(orchestrator.cache().len(), 1);
    assert!(
        orchestrator
            .cache()
            .peek(&Fingerprint::of(&request))
            .unwrap()
            .is_some()
    );
    assert_eq!(cheap.calls(), 1);
    assert_eq!(pricey.calls(), 0);
}

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let cheap = StaticAdapter::new("cheap", 12);
    let pricey = StaticAdapter::new("pricey", 12);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("cheap", "model-a").cost_per_token(0.0001), cheap.clone())
        .provider(ProviderSpec::new("pricey", "model-b").cost_per_token(0.00015), pricey.clone())
        .build()
        .unwrap();

    let first = orchestrator.generate(&scenario_request()).await.unwrap();
    let hit_rate_before = orchestrator.stats().cache.hit_rate;

    let second = orchestrator.generate(&scenario_request()).await.unwrap();

    assert!(second.cache_hit());
    assert_eq!(second.metadata().get("cache_hit").unwrap(), "true");
    assert_eq!(second.content(), first.content());
    assert_eq!(second.provider_id(), first.provider_id());
    assert_eq!(cheap.calls() + pricey.calls(), 1, "no adapter call on a hit");

    let stats = orchestrator.stats();
    assert!(stats.cache.hit_rate > hit_rate_before);
    assert_eq!(stats.cache.hits, 1);
    assert_eq!(stats.cache.misses, 1);
    assert_eq!(stats.providers["cheap"].successes, 1);
}

#[tokio::test]
async fn different_temperature_misses_the_cache() {
    let adapter = StaticAdapter::new("only", 3);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("only", "m"), adapter.clone())
        .build()
        .unwrap();

    orchestrator.generate(&scenario_request()).await.unwrap();
    let other = orchestrator
        .generate(&scenario_request().temperature(0.2))
        .await
        .unwrap();

    assert!(!other.cache_hit());
    assert_eq!(adapter.calls(), 2);
    assert_eq!(orchestrator.cache().len(), 2);
}

#[tokio::test]
async fn bypassing_the_cache_neither_reads_nor_stores() {
    let adapter = StaticAdapter::new("only", 3);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("only", "m"), adapter.clone())
        .build()
        .unwrap();

    // A cached answer exists, but a bypassing request still calls the provider.
    orchestrator.generate(&scenario_request()).await.unwrap();
    let fresh = orchestrator
        .generate(&scenario_request().bypass_cache())
        .await
        .unwrap();
    assert!(!fresh.cache_hit());
    assert_eq!(adapter.calls(), 2);

    // Nothing new stored and no lookup counted for the bypassing call.
    let other_prompt = GenerationRequest::new(ContentKind::Title, "Title about tidal power")
        .bypass_cache();
    orchestrator.generate(&other_prompt).await.unwrap();
    assert_eq!(orchestrator.cache().len(), 1);
    assert!(
        orchestrator
            .cache()
            .peek(&Fingerprint::of(&other_prompt))
            .unwrap()
            .is_none()
    );

    let stats = orchestrator.stats();
    assert_eq!(stats.cache.hits, 0);
    assert_eq!(stats.cache.misses, 1);
    assert_eq!(stats.providers["only"].successes, 3);
}

#[tokio::test]
async fn zero_capacity_cache_disables_caching() {
    let adapter = StaticAdapter::new("only", 3);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("only", "m"), adapter.clone())
        .cache(CacheConfig::new().max_entries(0))
        .build()
        .unwrap();

    orchestrator.generate(&scenario_request()).await.unwrap();
    orchestrator.generate(&scenario_request()).await.unwrap();

    assert_eq!(adapter.calls(), 2);
    assert!(orchestrator.cache().is_empty());
}

// ============================================================================
// Failover
// ============================================================================

#[tokio::test(start_paused = true)]
async fn timed_out_provider_fails_over_to_healthy_one() {
    let slow = SlowAdapter::new("a");
    let healthy = StaticAdapter::new("b", 8);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("a", "fast-cheap").cost_per_token(0.0001), slow.clone())
        .provider(ProviderSpec::new("b", "steady").cost_per_token(0.0002), healthy.clone())
        .attempt_timeout(Duration::from_secs(1))
        .build()
        .unwrap();

    let response = orchestrator.generate(&scenario_request()).await.unwrap();

    assert_eq!(response.provider_id(), "b");
    assert_eq!(slow.calls.load(Ordering::SeqCst), 1);

    let stats = orchestrator.stats();
    assert_eq!(stats.providers["a"].failures, 1);
    assert_eq!(stats.providers["a"].successes, 0);
    assert_eq!(stats.providers["b"].successes, 1);
    assert_eq!(stats.providers["b"].failures, 0);

    let errors = orchestrator.recent_errors(10);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].provider, "a");
    assert_eq!(errors[0].kind, ProviderErrorKind::Timeout);
    assert_eq!(errors[0].prompt.chars(), "Title about renewable energy".len());
}

#[tokio::test]
async fn every_provider_failing_returns_generation_failed() {
    let a = FailingAdapter::new("a");
    let b = FailingAdapter::new("b");
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("a", "m"), a.clone())
        .provider(ProviderSpec::new("b", "m"), b.clone())
        .build()
        .unwrap();

    let err = orchestrator.generate(&scenario_request()).await.unwrap_err();

    match &err {
        SkaldError::GenerationFailed { attempts, last } => {
            assert_eq!(*attempts, 2);
            assert_eq!(last.provider_error_kind(), Some(ProviderErrorKind::Rejected));
        }
        other => panic!("expected GenerationFailed, got {other:?}"),
    }
    assert!(err.is_retriable());
    // Each provider is tried at most once per call.
    assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    assert!(orchestrator.cache().is_empty());
}

#[tokio::test]
async fn preferred_provider_is_tried_first() {
    let cheap = StaticAdapter::new("cheap", 4);
    let pricey = StaticAdapter::new("pricey", 4);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("cheap", "m").cost_per_token(0.0001), cheap.clone())
        .provider(ProviderSpec::new("pricey", "m").cost_per_token(0.01), pricey.clone())
        .build()
        .unwrap();

    let response = orchestrator
        .generate(&scenario_request().prefer("pricey"))
        .await
        .unwrap();

    assert_eq!(response.provider_id(), "pricey");
    assert_eq!(cheap.calls(), 0);
}

#[tokio::test]
async fn failing_preferred_provider_falls_back() {
    let preferred = FailingAdapter::new("preferred");
    let backup = StaticAdapter::new("backup", 4);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("preferred", "m"), preferred.clone())
        .provider(ProviderSpec::new("backup", "m"), backup.clone())
        .build()
        .unwrap();

    let response = orchestrator
        .generate(&scenario_request().prefer("preferred"))
        .await
        .unwrap();

    assert_eq!(response.provider_id(), "backup");
    assert_eq!(preferred.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_larger_than_every_provider_has_no_candidate() {
    let small = StaticAdapter::new("small", 4);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("small", "m").max_tokens(50), small.clone())
        .build()
        .unwrap();

    let err = orchestrator
        .generate(&scenario_request().max_tokens(500))
        .await
        .unwrap_err();

    assert!(matches!(err, SkaldError::NoProviderAvailable));
    assert_eq!(small.calls(), 0);
}

// ============================================================================
// Availability and circuit breaking
// ============================================================================

#[tokio::test]
async fn all_providers_unavailable_changes_nothing() {
    let a = StaticAdapter::new("a", 4);
    let b = StaticAdapter::new("b", 4);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("a", "m"), a.clone())
        .provider(ProviderSpec::new("b", "m"), b.clone())
        .circuit_breaker(CircuitBreakerConfig::new().failure_threshold(1))
        .build()
        .unwrap();

    orchestrator
        .registry()
        .report_failure("a", ProviderErrorKind::Timeout);
    orchestrator
        .registry()
        .report_failure("b", ProviderErrorKind::Timeout);
    assert!(orchestrator.providers().iter().all(|d| !d.available));

    let err = orchestrator.generate(&scenario_request()).await.unwrap_err();

    assert!(matches!(err, SkaldError::NoProviderAvailable));
    assert!(orchestrator.cache().is_empty());
    assert_eq!(a.calls() + b.calls(), 0);
    let stats = orchestrator.stats();
    assert!(stats.providers.values().all(|u| u.successes == 0));
}

#[tokio::test]
async fn empty_orchestrator_has_no_provider() {
    let orchestrator = Orchestrator::builder().build().unwrap();
    let err = orchestrator.generate(&scenario_request()).await.unwrap_err();
    assert!(matches!(err, SkaldError::NoProviderAvailable));
}

#[tokio::test]
async fn circuit_opens_then_recovers_through_single_trial() {
    let clock = Arc::new(ManualClock::new());
    let adapter = ScriptedAdapter::new("flaky", &[false, true]);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("flaky", "m"), adapter.clone())
        .circuit_breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .base_cooldown(Duration::from_secs(30)),
        )
        .clock(clock.clone())
        .build()
        .unwrap();

    let err = orchestrator.generate(&scenario_request()).await.unwrap_err();
    assert!(matches!(err, SkaldError::GenerationFailed { attempts: 1, .. }));
    let d = orchestrator.registry().get("flaky").unwrap();
    assert_eq!(d.circuit, CircuitState::Open);
    assert!(!d.available);

    // Still cooling down.
    clock.advance(Duration::from_secs(29));
    let err = orchestrator.generate(&scenario_request()).await.unwrap_err();
    assert!(matches!(err, SkaldError::NoProviderAvailable));
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(1));
    assert_eq!(
        orchestrator.registry().get("flaky").unwrap().circuit,
        CircuitState::HalfOpen
    );

    let response = orchestrator.generate(&scenario_request()).await.unwrap();
    assert_eq!(response.provider_id(), "flaky");
    let d = orchestrator.registry().get("flaky").unwrap();
    assert_eq!(d.circuit, CircuitState::Closed);
    assert_eq!(d.consecutive_failures, 0);
    assert!(d.available);
}

#[tokio::test]
async fn failed_trial_reopens_with_longer_cooldown() {
    let clock = Arc::new(ManualClock::new());
    let adapter = ScriptedAdapter::new("flaky", &[false, false, true]);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("flaky", "m"), adapter.clone())
        .circuit_breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .base_cooldown(Duration::from_secs(30)),
        )
        .clock(clock.clone())
        .build()
        .unwrap();

    assert!(orchestrator.generate(&scenario_request()).await.is_err());
    clock.advance(Duration::from_secs(30));

    // Trial fails: open again, now for 60s.
    assert!(orchestrator.generate(&scenario_request()).await.is_err());
    assert_eq!(
        orchestrator.registry().get("flaky").unwrap().circuit,
        CircuitState::Open
    );

    clock.advance(Duration::from_secs(30));
    assert!(!orchestrator.registry().get("flaky").unwrap().available);

    clock.advance(Duration::from_secs(30));
    let response = orchestrator.generate(&scenario_request()).await.unwrap();
    assert_eq!(response.content(), "Wind and Sun");
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn half_open_admits_exactly_one_trial() {
    let clock = Arc::new(ManualClock::new());
    let adapter = Arc::new(GatedAdapter {
        gate: Notify::new(),
        calls: AtomicUsize::new(0),
    });
    let orchestrator = Arc::new(
        Orchestrator::builder()
            .provider(ProviderSpec::new("gated", "m"), adapter.clone())
            .circuit_breaker(
                CircuitBreakerConfig::new()
                    .failure_threshold(1)
                    .base_cooldown(Duration::from_secs(10)),
            )
            .clock(clock.clone())
            .build()
            .unwrap(),
    );

    orchestrator
        .registry()
        .report_failure("gated", ProviderErrorKind::Rejected);
    clock.advance(Duration::from_secs(10));

    let trial = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.generate(&scenario_request()).await })
    };
    while adapter.calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    // The trial is in flight: a second caller is turned away.
    let err = orchestrator
        .generate(&scenario_request().language("de"))
        .await
        .unwrap_err();
    assert!(matches!(err, SkaldError::NoProviderAvailable));

    adapter.gate.notify_one();
    let response = trial.await.unwrap().unwrap();
    assert_eq!(response.content(), "Released");
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        orchestrator.registry().get("gated").unwrap().circuit,
        CircuitState::Closed
    );
}

// ============================================================================
// Deadlines and cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn caller_deadline_interrupts_slow_provider() {
    let slow = SlowAdapter::new("slow");
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("slow", "m"), slow.clone())
        .build()
        .unwrap();

    let ctx = CallContext::new().timeout(Duration::from_millis(200));
    let err = orchestrator
        .generate_with(&scenario_request(), &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, SkaldError::DeadlineExceeded));
    assert!(err.is_retriable());
    // A caller giving up is not the provider's fault.
    assert_eq!(orchestrator.stats().providers["slow"].failures, 0);
    assert_eq!(
        orchestrator.registry().get("slow").unwrap().consecutive_failures,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_in_flight_call() {
    let slow = SlowAdapter::new("slow");
    let backup = StaticAdapter::new("backup", 2);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("slow", "m").cost_per_token(0.0001), slow.clone())
        .provider(ProviderSpec::new("backup", "m").cost_per_token(0.1), backup.clone())
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        })
    };

    let ctx = CallContext::new().cancellation(token);
    let err = orchestrator
        .generate_with(&scenario_request(), &ctx)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, SkaldError::Canceled));
    assert!(!err.is_retriable());
    assert_eq!(backup.calls(), 0, "no failover after cancellation");
    assert!(orchestrator.cache().is_empty());
}

#[tokio::test]
async fn already_canceled_call_never_reaches_a_provider() {
    let adapter = StaticAdapter::new("only", 2);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("only", "m"), adapter.clone())
        .build()
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = orchestrator
        .generate_with(&scenario_request(), &CallContext::new().cancellation(token))
        .await
        .unwrap_err();

    assert!(matches!(err, SkaldError::Canceled));
    assert_eq!(adapter.calls(), 0);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn invalid_request_is_rejected_before_any_call() {
    let adapter = StaticAdapter::new("only", 2);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("only", "m"), adapter.clone())
        .build()
        .unwrap();

    for request in [
        GenerationRequest::new(ContentKind::Title, "   "),
        scenario_request().max_tokens(0),
        scenario_request().temperature(1.5),
    ] {
        let err = orchestrator.generate(&request).await.unwrap_err();
        assert!(matches!(err, SkaldError::Validation(_)), "got {err:?}");
        assert!(!err.is_retriable());
    }
    assert_eq!(adapter.calls(), 0);
    assert_eq!(orchestrator.stats().cache.misses, 0);
}

#[test]
fn duplicate_provider_ids_fail_build() {
    let result = Orchestrator::builder()
        .provider(ProviderSpec::new("dup", "m"), StaticAdapter::new("dup", 1))
        .provider(ProviderSpec::new("dup", "m2"), StaticAdapter::new("dup", 1))
        .build();
    assert!(matches!(result, Err(SkaldError::DuplicateProvider(id)) if id == "dup"));
}

#[test]
fn zero_attempt_timeout_fails_build() {
    let result = Orchestrator::builder()
        .attempt_timeout(Duration::ZERO)
        .build();
    assert!(matches!(result, Err(SkaldError::Configuration(_))));
}

// ============================================================================
// Post-processing
// ============================================================================

#[tokio::test]
async fn post_processor_rewrite_is_cached() {
    let adapter = StaticAdapter::new("only", 2);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("only", "m"), adapter.clone())
        .post_processor(Arc::new(AppendSignature))
        .build()
        .unwrap();

    let fresh = orchestrator.generate(&scenario_request()).await.unwrap();
    assert!(fresh.content().ends_with("| edited"));

    let cached = orchestrator.generate(&scenario_request()).await.unwrap();
    assert!(cached.cache_hit());
    assert_eq!(cached.content(), fresh.content());
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn post_processor_rejection_is_not_cached() {
    let adapter = StaticAdapter::new("only", 2);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("only", "m"), adapter.clone())
        .post_processor(Arc::new(RejectEverything))
        .build()
        .unwrap();

    let err = orchestrator.generate(&scenario_request()).await.unwrap_err();

    assert!(matches!(err, SkaldError::ContentRejected { .. }));
    assert!(!err.is_retriable());
    assert!(orchestrator.cache().is_empty());
    // The provider did its job; the call still counts as a success.
    assert_eq!(orchestrator.stats().providers["only"].successes, 1);
}

// ============================================================================
// Statistics
// ============================================================================

#[tokio::test]
async fn stats_cover_every_registered_provider() {
    let used = StaticAdapter::new("used", 10);
    let idle = StaticAdapter::new("idle", 10);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("used", "m").cost_per_token(0.001), used.clone())
        .provider(ProviderSpec::new("idle", "m").cost_per_token(0.5), idle.clone())
        .build()
        .unwrap();

    orchestrator.generate(&scenario_request()).await.unwrap();

    let stats = orchestrator.stats();
    assert_eq!(stats.providers.len(), 2);
    let usage = &stats.providers["used"];
    assert_eq!(usage.requests, 1);
    assert_eq!(usage.total_tokens, 10);
    assert!((usage.total_cost - 0.01).abs() < 1e-12);
    assert!(usage.avg_latency.is_some());
    assert!(usage.avg_quality.is_some());
    assert_eq!(stats.providers["idle"].requests, 0);
    assert_eq!(stats.cache.size, 1);
    assert_eq!(stats.cache.capacity, 1000);
    assert_eq!(stats.quality.samples, 1);

    // Serializable for an admin UI.
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["providers"]["used"]["successes"], 1);
    assert!(json["cache"]["hit_rate"].is_number());
}

#[tokio::test]
async fn reset_clears_cache_stats_and_circuits() {
    let adapter = StaticAdapter::new("only", 2);
    let orchestrator = Orchestrator::builder()
        .provider(ProviderSpec::new("only", "m"), adapter.clone())
        .circuit_breaker(CircuitBreakerConfig::new().failure_threshold(1))
        .build()
        .unwrap();

    orchestrator.generate(&scenario_request()).await.unwrap();
    orchestrator
        .registry()
        .report_failure("only", ProviderErrorKind::Timeout);
    assert!(!orchestrator.providers()[0].available);

    orchestrator.reset();

    let stats = orchestrator.stats();
    assert_eq!(stats.cache.size, 0);
    assert_eq!(stats.cache.hits + stats.cache.misses, 0);
    assert_eq!(stats.providers["only"].requests, 0);
    assert_eq!(stats.quality.samples, 0);
    assert!(orchestrator.providers()[0].available);
    assert!(orchestrator.generate(&scenario_request()).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_orchestrator() {
    let adapter = StaticAdapter::new("only", 3);
    let orchestrator = Arc::new(
        Orchestrator::builder()
            .provider(ProviderSpec::new("only", "m"), adapter.clone())
            .build()
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..20 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            let request = GenerationRequest::new(
                ContentKind::Comment,
                format!("Comment on post number {i}"),
            );
            orchestrator.generate(&request).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let stats = orchestrator.stats();
    assert_eq!(stats.providers["only"].successes, 20);
    assert_eq!(stats.cache.size, 20);
    assert_eq!(adapter.calls(), 20);
}
