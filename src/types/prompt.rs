//! Log-safe prompt references.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

/// Hashed stand-in for a prompt in logs and the error ring buffer.
///
/// Prompts may carry user content, so diagnostics only ever record a digest
/// and the prompt length, never the text itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PromptRef {
    digest: String,
    chars: usize,
}

impl PromptRef {
    pub fn new(prompt: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        prompt.hash(&mut hasher);
        Self {
            digest: format!("{:016x}", hasher.finish()),
            chars: prompt.chars().count(),
        }
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn chars(&self) -> usize {
        self.chars
    }
}

impl fmt::Display for PromptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prompt#{} ({} chars)", &self.digest[..8], self.chars)
    }
}
