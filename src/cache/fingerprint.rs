//! Deterministic request fingerprints used as response cache keys.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::types::GenerationRequest;

/// Provider component of the fingerprint when the request names no provider.
pub const AUTO_PROVIDER: &str = "auto";

/// Content hash of the normalized request fields.
///
/// Covers prompt, content kind, max tokens, temperature, language and the
/// resolved provider id. Requester id, creation time and the free-form
/// context are excluded, so two callers asking the same thing share an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Fingerprint a request. The provider component is the preferred
    /// provider when set, otherwise [`AUTO_PROVIDER`].
    pub fn of(request: &GenerationRequest) -> Self {
        let provider = request
            .preferred_provider
            .as_deref()
            .unwrap_or(AUTO_PROVIDER);
        Self::with_provider(request, provider)
    }

    /// Fingerprint a request against an explicit resolved provider id.
    ///
    /// Uses `DefaultHasher` (SipHash with fixed keys): deterministic for a
    /// given build, which is all an in-memory cache needs. Each field is
    /// length-prefixed by `Hash for str`, so field boundaries cannot alias.
    pub fn with_provider(request: &GenerationRequest, provider_id: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        request.prompt.hash(&mut hasher);
        request.kind.as_str().hash(&mut hasher);
        request.max_tokens.hash(&mut hasher);
        // -0.0 and 0.0 are the same temperature.
        (request.temperature + 0.0).to_bits().hash(&mut hasher);
        request.language.hash(&mut hasher);
        provider_id.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
