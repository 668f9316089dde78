//! The orchestrator: cache, selection, failover, scoring and accounting.
//!
//! # Call flow
//!
//! ```text
//! generate(request)
//!   │ validate ──────────────────────────────► Validation
//!   │ fingerprint → cache ── hit ────────────► cached copy (cache_hit = true)
//!   │ miss
//!   ▼
//!   loop (at most one attempt per available provider)
//!   │ select (skipping providers tried in this call)
//!   │ begin_attempt → adapter.generate() under attempt timeout + caller limits
//!   │   ok   → score, cost, report, post-process, cache put ──► response
//!   │   fail → report, record, fail over
//!   ▼
//!   GenerationFailed { attempts, last }   (NoProviderAvailable if none ran)
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use super::builder::OrchestratorBuilder;
use super::context::CallContext;
use crate::cache::{Fingerprint, ResponseCache};
use crate::config::{Config, SecretStore};
use crate::error::ProviderErrorKind;
use crate::monitor::{ErrorRecord, ProviderUsage, QualitySummary, UsageMonitor};
use crate::providers::{
    ProviderAdapter, ProviderDescriptor, ProviderRegistry, ProviderSelector, SelectionInput,
};
use crate::quality::QualityScorer;
use crate::telemetry;
use crate::types::{AdapterOutput, GenerationRequest, GenerationResponse, PromptRef};
use crate::{Result, SkaldError};

/// Hook run once on every fresh response, after scoring and before caching.
///
/// Return a (possibly rewritten) response to accept it, or
/// [`SkaldError::ContentRejected`] to refuse it. Refused content is neither
/// cached nor returned.
#[async_trait]
pub trait PostProcess: Send + Sync {
    async fn post_process(&self, response: GenerationResponse) -> Result<GenerationResponse>;
}

/// Response cache counters for [`Stats`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub capacity: usize,
}

/// Observability snapshot for an admin or monitoring UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    /// Usage per registered provider, keyed by id.
    pub providers: BTreeMap<String, ProviderUsage>,
    pub cache: CacheStats,
    pub quality: QualitySummary,
}

/// Why an attempt stopped without an adapter result.
enum Interrupted {
    Canceled,
    DeadlineExceeded,
}

/// Multi-provider generation orchestrator.
///
/// `Send + Sync`; share it behind an `Arc` across tasks.
pub struct Orchestrator {
    pub(super) registry: ProviderRegistry,
    pub(super) selector: ProviderSelector,
    pub(super) cache: ResponseCache,
    pub(super) scorer: QualityScorer,
    pub(super) monitor: UsageMonitor,
    pub(super) post_processor: Option<Arc<dyn PostProcess>>,
    pub(super) attempt_timeout: Duration,
    pub(super) low_quality_threshold: f64,
}

impl Orchestrator {
    /// Create a new builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Build an orchestrator from configuration.
    pub fn from_config(config: &Config, secrets: &dyn SecretStore) -> Result<Self> {
        OrchestratorBuilder::from_config(config, secrets)?.build()
    }

    /// Generate content for `request` with no caller deadline.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        self.generate_with(request, &CallContext::default()).await
    }

    /// Generate content for `request`, honoring the caller's deadline and
    /// cancellation token.
    #[instrument(
        skip(self, request, ctx),
        fields(
            kind = %request.kind,
            prompt = %PromptRef::new(&request.prompt),
            fingerprint = tracing::field::Empty,
        )
    )]
    pub async fn generate_with(
        &self,
        request: &GenerationRequest,
        ctx: &CallContext,
    ) -> Result<GenerationResponse> {
        request.validate()?;
        ctx.check()?;

        let prompt = PromptRef::new(&request.prompt);
        let fingerprint = Fingerprint::of(request);
        tracing::Span::current().record("fingerprint", tracing::field::display(fingerprint));

        if request.bypass_cache {
            debug!("cache bypassed");
        } else if let Some(cached) = self.cache_get(&fingerprint) {
            self.monitor.record_cache_hit();
            debug!(provider = cached.provider_id(), "cache hit");
            return Ok(cached.as_cache_hit());
        } else {
            self.monitor.record_cache_miss();
        }

        let budget = self.registry.list_available().len();
        if budget == 0 {
            warn!("no provider available");
            return Err(SkaldError::NoProviderAvailable);
        }

        let mut excluded = HashSet::new();
        let mut attempts = 0;
        let mut last_error: Option<SkaldError> = None;

        while attempts < budget {
            ctx.check()?;

            let descriptors = self.registry.list_available();
            let usage = self.monitor.selection_snapshot();
            let selected = self.selector.select(
                request,
                &SelectionInput {
                    descriptors: &descriptors,
                    usage: &usage,
                    excluded: &excluded,
                },
            );
            let provider_id = match selected {
                Ok(id) => id,
                Err(SkaldError::NoProviderAvailable) => break,
                Err(e) => return Err(e),
            };
            excluded.insert(provider_id.clone());

            let Some(descriptor) = descriptors.iter().find(|d| d.id == provider_id) else {
                continue;
            };
            let (Some(adapter), Some(permit)) = (
                self.registry.adapter(&provider_id),
                self.registry.begin_attempt(&provider_id),
            ) else {
                // Raced with another caller for a half-open trial.
                debug!(provider = %provider_id, "provider became unavailable before the call");
                continue;
            };

            attempts += 1;
            debug!(provider = %provider_id, attempt = attempts, trial = permit.is_trial(), "calling provider");
            let started = Instant::now();

            let output = match self.call(&provider_id, adapter.as_ref(), request, ctx).await {
                Err(Interrupted::Canceled) => return Err(SkaldError::Canceled),
                Err(Interrupted::DeadlineExceeded) => return Err(SkaldError::DeadlineExceeded),
                Ok(Ok(output)) => output,
                Ok(Err(err)) => {
                    let kind = err.provider_error_kind().unwrap_or(ProviderErrorKind::Rejected);
                    permit.fail(kind);
                    self.monitor.record_failure(&provider_id, kind, &prompt);
                    warn!(provider = %provider_id, %kind, error = %err, "provider attempt failed");
                    metrics::counter!(telemetry::FAILOVERS_TOTAL,
                        "provider" => provider_id.clone(),
                    )
                    .increment(1);
                    last_error = Some(err);
                    continue;
                }
            };

            let latency = started.elapsed();
            permit.succeed(output.tokens_used, latency);
            let response = self.finish(output, descriptor, request, latency);
            let store_under = (!request.bypass_cache).then_some(fingerprint);
            return self.accept(store_under, response).await;
        }

        match last_error {
            Some(last) => {
                warn!(attempts, "every attempted provider failed");
                Err(SkaldError::GenerationFailed {
                    attempts,
                    last: Box::new(last),
                })
            }
            None => Err(SkaldError::NoProviderAvailable),
        }
    }

    /// Run one adapter call under the attempt timeout and the caller's limits.
    async fn call(
        &self,
        provider_id: &str,
        adapter: &dyn ProviderAdapter,
        request: &GenerationRequest,
        ctx: &CallContext,
    ) -> std::result::Result<Result<AdapterOutput>, Interrupted> {
        let attempt = tokio::time::timeout(self.attempt_timeout, adapter.generate(request));
        tokio::select! {
            biased;
            _ = ctx.canceled() => Err(Interrupted::Canceled),
            _ = ctx.expired() => Err(Interrupted::DeadlineExceeded),
            result = attempt => Ok(result.unwrap_or_else(|_| {
                Err(SkaldError::ProviderTimeout {
                    provider: provider_id.to_string(),
                    after: self.attempt_timeout,
                })
            })),
        }
    }

    /// Score and cost a successful adapter result and record it.
    fn finish(
        &self,
        output: AdapterOutput,
        descriptor: &ProviderDescriptor,
        request: &GenerationRequest,
        latency: Duration,
    ) -> GenerationResponse {
        let quality = self.scorer.score(&output.content, request);
        let response = GenerationResponse::new(
            output,
            &descriptor.id,
            &descriptor.model,
            latency,
            quality,
            descriptor.cost_per_token,
        );
        self.monitor.record_success(
            &descriptor.id,
            response.tokens_used(),
            response.cost(),
            latency,
            response.quality_score(),
        );
        if response.quality_score() < self.low_quality_threshold {
            warn!(
                provider = %descriptor.id,
                quality = response.quality_score(),
                threshold = self.low_quality_threshold,
                "generated content scored below quality threshold"
            );
            metrics::counter!(telemetry::LOW_QUALITY_TOTAL,
                "provider" => descriptor.id.clone(),
            )
            .increment(1);
        }
        response
    }

    /// Post-process and cache a fresh response.
    async fn accept(
        &self,
        fingerprint: Option<Fingerprint>,
        response: GenerationResponse,
    ) -> Result<GenerationResponse> {
        let response = match &self.post_processor {
            Some(hook) => hook.post_process(response).await.inspect_err(|e| {
                warn!(error = %e, "post-processing refused generated content");
            })?,
            None => response,
        };
        if let Some(fingerprint) = fingerprint
            && let Err(e) = self.cache.put(fingerprint, response.clone())
        {
            error!(error = %e, "response cache store failed, returning uncached");
        }
        Ok(response)
    }

    fn cache_get(&self, fingerprint: &Fingerprint) -> Option<GenerationResponse> {
        self.cache.get(fingerprint).unwrap_or_else(|e| {
            error!(error = %e, "response cache lookup failed, treating as miss");
            None
        })
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Usage, cache and quality statistics.
    pub fn stats(&self) -> Stats {
        let snapshot = self.monitor.snapshot();
        let mut providers = snapshot.providers.clone();
        for d in self.registry.descriptors() {
            providers.entry(d.id).or_default();
        }
        Stats {
            providers,
            cache: CacheStats {
                hits: snapshot.cache_hits,
                misses: snapshot.cache_misses,
                hit_rate: snapshot.hit_rate(),
                size: self.cache.len(),
                capacity: self.cache.capacity(),
            },
            quality: snapshot.quality,
        }
    }

    /// Descriptors of every registered provider, in registration order.
    pub fn providers(&self) -> Vec<ProviderDescriptor> {
        self.registry.descriptors()
    }

    /// Most recent provider errors, newest first.
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        self.monitor.recent_errors(limit)
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn monitor(&self) -> &UsageMonitor {
        &self.monitor
    }

    /// Clear the cache and statistics and close every circuit.
    pub fn reset(&self) {
        if let Err(e) = self.cache.clear() {
            error!(error = %e, "response cache clear failed");
        }
        self.monitor.reset();
        self.registry.reset();
    }
}
