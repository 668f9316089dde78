//! Skald error types

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Classification of a single failed adapter call.
///
/// Recorded by the registry (circuit breaker) and the usage monitor's error
/// log. Only adapter-level failures have a kind; orchestration errors such as
/// validation or exhaustion never reach the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    Rejected,
    MalformedReply,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Rejected => "rejected",
            ProviderErrorKind::MalformedReply => "malformed_reply",
        };
        f.write_str(s)
    }
}

/// Skald error types
#[derive(Debug, thiserror::Error)]
pub enum SkaldError {
    // Request errors
    #[error("invalid request: {0}")]
    Validation(String),

    // Single-attempt adapter failures
    #[error("provider {provider} timed out after {after:?}")]
    ProviderTimeout { provider: String, after: Duration },

    #[error("provider {provider} rejected the request{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    ProviderRejected {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("provider {provider} returned a malformed reply: {message}")]
    ProviderMalformedReply { provider: String, message: String },

    // Orchestration outcomes
    #[error("no provider available")]
    NoProviderAvailable,

    /// Every attempted provider failed. Carries the last adapter error.
    #[error("generation failed after {attempts} attempt(s)")]
    GenerationFailed {
        attempts: usize,
        #[source]
        last: Box<SkaldError>,
    },

    #[error("response cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("generation canceled")]
    Canceled,

    #[error("generation deadline exceeded")]
    DeadlineExceeded,

    /// A registered post-processing hook refused the generated content.
    #[error("content rejected: {reason}")]
    ContentRejected { reason: String },

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("duplicate provider id: {0}")]
    DuplicateProvider(String),
}

impl SkaldError {
    /// Whether a caller may reasonably retry the same request later.
    ///
    /// Validation, configuration, cancellation and content rejection are
    /// permanent for the given input. Provider health problems are not:
    /// circuits recover and exhausted attempts may succeed on a later call.
    pub fn is_retriable(&self) -> bool {
        match self {
            SkaldError::ProviderTimeout { .. } | SkaldError::ProviderMalformedReply { .. } => true,
            SkaldError::ProviderRejected { status, .. } => match status {
                Some(429) => true,
                Some(code) => *code >= 500,
                None => true,
            },
            SkaldError::NoProviderAvailable
            | SkaldError::GenerationFailed { .. }
            | SkaldError::CacheUnavailable(_)
            | SkaldError::DeadlineExceeded => true,
            SkaldError::Validation(_)
            | SkaldError::Canceled
            | SkaldError::ContentRejected { .. }
            | SkaldError::Configuration(_)
            | SkaldError::DuplicateProvider(_) => false,
        }
    }

    /// The adapter failure kind, if this error came from a single adapter call.
    pub fn provider_error_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            SkaldError::ProviderTimeout { .. } => Some(ProviderErrorKind::Timeout),
            SkaldError::ProviderRejected { .. } => Some(ProviderErrorKind::Rejected),
            SkaldError::ProviderMalformedReply { .. } => Some(ProviderErrorKind::MalformedReply),
            _ => None,
        }
    }

    /// The last underlying adapter error of a `GenerationFailed`.
    pub fn last_provider_error(&self) -> Option<&SkaldError> {
        match self {
            SkaldError::GenerationFailed { last, .. } => Some(last),
            _ => None,
        }
    }

    pub(crate) fn rejected(provider: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        SkaldError::ProviderRejected {
            provider: provider.to_string(),
            status,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(provider: &str, message: impl Into<String>) -> Self {
        SkaldError::ProviderMalformedReply {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for Skald operations
pub type Result<T> = std::result::Result<T, SkaldError>;
