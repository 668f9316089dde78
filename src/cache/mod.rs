//! Response caching.
//!
//! - [`Fingerprint`]: deterministic hash of the normalized request fields,
//!   used as the cache key.
//! - [`ResponseCache`]: bounded, strictly LRU, optionally TTL'd store of
//!   generated responses shared by all concurrent orchestrator calls.

pub mod fingerprint;
pub mod response;

pub use fingerprint::{AUTO_PROVIDER, Fingerprint};
pub use response::{CacheConfig, CacheEntry, ResponseCache};
