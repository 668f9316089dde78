//! Shared plumbing for the HTTP adapters.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::{Result, SkaldError};

/// Client-side request timeout. The orchestrator's per-attempt timeout is
/// normally shorter and fires first.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest slice of an error body carried into an error message.
const MAX_ERROR_BODY: usize = 200;

pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| SkaldError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Map a transport error from `send()`.
pub(crate) fn send_error(provider: &str, err: reqwest::Error) -> SkaldError {
    if err.is_timeout() {
        SkaldError::ProviderTimeout {
            provider: provider.to_string(),
            after: HTTP_TIMEOUT,
        }
    } else {
        SkaldError::rejected(provider, err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// Check the response status, then decode the JSON body.
///
/// Non-2xx replies become `ProviderRejected` with the status code and the
/// start of the vendor's error body. Undecodable bodies are malformed replies.
pub(crate) async fn decode<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = match status.as_u16() {
            401 | 403 => "authentication failed".to_string(),
            429 => "rate limited".to_string(),
            _ if body.trim().is_empty() => status.to_string(),
            _ => truncate(body.trim(), MAX_ERROR_BODY),
        };
        return Err(SkaldError::rejected(provider, Some(status.as_u16()), message));
    }

    let bytes = response.bytes().await.map_err(|e| send_error(provider, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SkaldError::malformed(provider, format!("invalid JSON reply: {e}")))
}

/// Rough token estimate for vendors that omit usage: whitespace-separated
/// words of prompt and completion.
pub(crate) fn estimate_tokens(prompt: &str, content: &str) -> u32 {
    let words = prompt.split_whitespace().count() + content.split_whitespace().count();
    u32::try_from(words).unwrap_or(u32::MAX)
}

/// Trim trailing slashes so `format!("{base}/path")` never doubles them.
pub(crate) fn normalize_base_url(base_url: impl Into<String>) -> String {
    let mut url = base_url.into();
    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_counts_words_of_both_sides() {
        assert_eq!(estimate_tokens("write a title", "Solar Rising"), 5);
        assert_eq!(estimate_tokens("", ""), 0);
    }

    #[test]
    fn base_url_trailing_slashes_are_trimmed() {
        assert_eq!(normalize_base_url("http://x/v1//"), "http://x/v1");
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("ёёёё", 2), "ёё...");
        assert_eq!(truncate("abc", 5), "abc");
    }
}
