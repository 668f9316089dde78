//! Telemetry metric name constants.
//!
//! Centralised metric names for skald operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `skald_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider id from configuration (e.g. "openai-primary")
//! - `status`: "ok" or "error"
//! - `kind`: adapter failure kind, one of "timeout", "rejected", "malformed_reply"
//! - `state`: circuit state after a transition, one of "open", "half_open", "closed"

/// Total adapter calls dispatched by the orchestrator.
///
/// Labels: `provider`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "skald_requests_total";

/// Adapter call duration in seconds.
///
/// Labels: `provider`.
pub const REQUEST_DURATION_SECONDS: &str = "skald_request_duration_seconds";

/// Total tokens consumed.
///
/// Labels: `provider`.
pub const TOKENS_TOTAL: &str = "skald_tokens_total";

/// Adapter failures by kind.
///
/// Labels: `provider`, `kind`.
pub const PROVIDER_ERRORS_TOTAL: &str = "skald_provider_errors_total";

/// Failovers from one provider to the next within a single call.
///
/// Labels: `provider` (the provider that failed).
pub const FAILOVERS_TOTAL: &str = "skald_failovers_total";

/// Circuit breaker state transitions.
///
/// Labels: `provider`, `state`.
pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "skald_circuit_transitions_total";

/// Quality score of generated content (0.0–1.0).
///
/// Labels: `provider`.
pub const QUALITY_SCORE: &str = "skald_quality_score";

/// Generated content scoring below the configured warning threshold.
///
/// Labels: `provider`.
pub const LOW_QUALITY_TOTAL: &str = "skald_low_quality_total";

/// Total response cache hits.
pub const CACHE_HITS_TOTAL: &str = "skald_cache_hits_total";

/// Total response cache misses.
pub const CACHE_MISSES_TOTAL: &str = "skald_cache_misses_total";
