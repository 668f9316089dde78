//! The adapter trait implemented once per text-generation vendor.
//!
//! Adapters are thin: they translate a [`GenerationRequest`] into one vendor
//! HTTP call and map the reply (or failure) back. Caching, scoring, retries
//! and failover live in the [`Orchestrator`](crate::Orchestrator).
//!
//! # Failure mapping
//!
//! Every failure must be one of the three single-attempt kinds so the
//! registry can feed its circuit breaker:
//! - [`SkaldError::ProviderTimeout`](crate::SkaldError::ProviderTimeout)
//! - [`SkaldError::ProviderRejected`](crate::SkaldError::ProviderRejected)
//! - [`SkaldError::ProviderMalformedReply`](crate::SkaldError::ProviderMalformedReply)
//!
//! # Example
//!
//! ```ignore
//! #[async_trait]
//! impl ProviderAdapter for EchoAdapter {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn generate(&self, request: &GenerationRequest) -> Result<AdapterOutput> {
//!         Ok(AdapterOutput::new(request.prompt.clone(), 1))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::Result;
use crate::types::{AdapterOutput, GenerationRequest};

/// A vendor-specific text generation client.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Adapter name for logging and error attribution.
    fn name(&self) -> &str;

    /// Perform one generation call.
    async fn generate(&self, request: &GenerationRequest) -> Result<AdapterOutput>;
}
