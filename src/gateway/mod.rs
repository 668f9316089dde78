//! Orchestrator, its builder and per-call context

mod builder;
mod context;
mod orchestrator;

pub use builder::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_LOW_QUALITY_THRESHOLD, OrchestratorBuilder};
pub use context::CallContext;
pub use orchestrator::{CacheStats, Orchestrator, PostProcess, Stats};
