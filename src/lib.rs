//! Skald - multi-provider generative content orchestration
//!
//! This crate turns a normalized content request (a post title, body,
//! excerpt, tag list or comment draft) into generated text by routing it to
//! one of several interchangeable text-generation services. Along the way it
//! caches responses, scores output quality, tracks per-provider cost,
//! latency and errors, and fails over when a provider is unhealthy.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skald::{ContentKind, GenerationRequest, Orchestrator, ProviderSpec};
//! use skald::providers::{AnthropicAdapter, OpenAiAdapter};
//!
//! #[tokio::main]
//! async fn main() -> skald::Result<()> {
//!     let orchestrator = Orchestrator::builder()
//!         .provider(
//!             ProviderSpec::new("openai", "gpt-4o-mini").cost_per_token(0.0001),
//!             Arc::new(OpenAiAdapter::new("sk-your-key", "gpt-4o-mini")?),
//!         )
//!         .provider(
//!             ProviderSpec::new("claude", "claude-3-5-haiku-latest").cost_per_token(0.00015),
//!             Arc::new(AnthropicAdapter::new("sk-ant-your-key", "claude-3-5-haiku-latest")?),
//!         )
//!         .build()?;
//!
//!     let request = GenerationRequest::new(ContentKind::Title, "Title about renewable energy")
//!         .max_tokens(20)
//!         .temperature(0.8);
//!     let response = orchestrator.generate(&request).await?;
//!
//!     println!("{} (via {})", response.content(), response.provider_id());
//!     Ok(())
//! }
//! ```
//!
//! # From configuration
//!
//! ```rust,ignore
//! let config = skald::Config::load(None)?;
//! let secrets = skald::ChainSecretStore::standard()?;
//! let orchestrator = skald::Orchestrator::from_config(&config, &secrets)?;
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod monitor;
pub mod providers;
pub mod quality;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use error::{ProviderErrorKind, Result, SkaldError};
pub use gateway::{CacheStats, CallContext, Orchestrator, OrchestratorBuilder, PostProcess, Stats};

pub use cache::{CacheConfig, Fingerprint, ResponseCache};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ChainSecretStore, Config, EnvSecretStore, FileSecretStore, SecretStore};
pub use monitor::{ErrorRecord, ProviderUsage, QualitySummary, UsageMonitor, UsageSnapshot};
pub use providers::{
    CircuitBreakerConfig, CircuitState, ProviderAdapter, ProviderDescriptor, ProviderRegistry,
    ProviderSelector, ProviderSpec, SelectionWeights,
};
pub use quality::{QualityScorer, QualityWeights};
pub use types::{
    AdapterOutput, ContentKind, GenerationRequest, GenerationResponse, PromptRef, split_tags,
};
