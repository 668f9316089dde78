//! Provider adapters, registry, circuit breaking and selection.
//!
//! Each vendor adapter sits behind its own feature flag (`openai`,
//! `anthropic`, `google`, `ollama`; all enabled by default). The registry, circuit
//! breaker and selector are always compiled.

#[cfg(feature = "anthropic")]
pub mod anthropic;
pub mod circuit;
#[cfg(feature = "google")]
pub mod google;
#[cfg(any(
    feature = "openai",
    feature = "anthropic",
    feature = "google",
    feature = "ollama"
))]
mod http;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
pub mod registry;
pub mod routing;
pub mod traits;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicAdapter;
pub use circuit::{CircuitBreakerConfig, CircuitState};
#[cfg(feature = "google")]
pub use google::GoogleAdapter;
#[cfg(feature = "ollama")]
pub use ollama::OllamaAdapter;
#[cfg(feature = "openai")]
pub use openai::OpenAiAdapter;
pub use registry::{AttemptPermit, ProviderDescriptor, ProviderRegistry, ProviderSpec};
pub use routing::{ProviderSelector, ScoredProvider, SelectionInput, SelectionWeights};
pub use traits::ProviderAdapter;
