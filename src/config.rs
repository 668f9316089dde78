//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. Explicit path (e.g. `--config <path>`)
//! 2. `~/.skald/config.toml` (user)
//! 3. `/etc/skald/config.toml` (system)
//!
//! Provider credentials are never written in the config itself. Each hosted
//! provider names a `credential` handle that a [`SecretStore`] resolves:
//! - `env:NAME`: environment variable `NAME` ([`EnvSecretStore`])
//! - `file:NAME`: key `NAME` in a `secrets.toml` ([`FileSecretStore`])
//! - bare `NAME`: whichever store in a [`ChainSecretStore`] knows it
//!
//! Secrets files are loaded with mandatory permission checks:
//! 1. `~/.skald/secrets.toml` (user, must be 0600 or 0400)
//! 2. `/etc/skald/secrets.toml` (system, must be 0600 or 0400)

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::providers::{CircuitBreakerConfig, ProviderAdapter, ProviderSpec, SelectionWeights};
use crate::quality::QualityWeights;
use crate::{Result, SkaldError};

/// Orchestrator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSection,
    #[serde(default)]
    pub selection: SelectionWeights,
    #[serde(default)]
    pub quality: QualitySection,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Maximum cached responses (default: 1000).
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Entry time-to-live in seconds (default: none).
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: None,
        }
    }
}

impl CacheSection {
    pub fn to_cache_config(&self) -> CacheConfig {
        let config = CacheConfig::new().max_entries(self.capacity);
        match self.ttl_secs {
            Some(secs) => config.ttl(Duration::from_secs(secs)),
            None => config,
        }
    }
}

fn default_cache_capacity() -> usize {
    1_000
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSection {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_failure_window")]
    pub failure_window_secs: u64,
    #[serde(default = "default_base_cooldown")]
    pub base_cooldown_secs: u64,
    #[serde(default = "default_max_cooldown")]
    pub max_cooldown_secs: u64,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window(),
            base_cooldown_secs: default_base_cooldown(),
            max_cooldown_secs: default_max_cooldown(),
        }
    }
}

impl CircuitBreakerSection {
    pub fn to_circuit_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .failure_threshold(self.failure_threshold)
            .failure_window(Duration::from_secs(self.failure_window_secs))
            .base_cooldown(Duration::from_secs(self.base_cooldown_secs))
            .max_cooldown(Duration::from_secs(self.max_cooldown_secs))
    }
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_failure_window() -> u64 {
    60
}

fn default_base_cooldown() -> u64 {
    30
}

fn default_max_cooldown() -> u64 {
    600
}

/// Quality scoring settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QualitySection {
    #[serde(default = "default_readability")]
    pub readability: f64,
    #[serde(default = "default_diversity")]
    pub diversity: f64,
    #[serde(default = "default_relevance")]
    pub relevance: f64,
    #[serde(default = "default_structure")]
    pub structure: f64,
    /// Scores below this are logged as low quality (default: 0.7).
    #[serde(default = "default_warn_below")]
    pub warn_below: f64,
}

impl Default for QualitySection {
    fn default() -> Self {
        Self {
            readability: default_readability(),
            diversity: default_diversity(),
            relevance: default_relevance(),
            structure: default_structure(),
            warn_below: default_warn_below(),
        }
    }
}

impl QualitySection {
    pub fn weights(&self) -> QualityWeights {
        QualityWeights {
            readability: self.readability,
            diversity: self.diversity,
            relevance: self.relevance,
            structure: self.structure,
        }
    }
}

fn default_readability() -> f64 {
    0.3
}

fn default_diversity() -> f64 {
    0.3
}

fn default_relevance() -> f64 {
    0.2
}

fn default_structure() -> f64 {
    0.2
}

fn default_warn_below() -> f64 {
    0.7
}

/// Call limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Per-attempt adapter timeout in seconds (default: 30).
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

fn default_attempt_timeout() -> u64 {
    30
}

/// Vendor API behind a provider entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    /// A local Ollama server; needs no credential.
    Ollama,
}

/// One `[[providers]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub model: String,
    /// Largest request this provider accepts (default: 4096).
    #[serde(default = "default_provider_max_tokens")]
    pub max_tokens: u32,
    /// Price per token (default: 0, a free or local provider).
    #[serde(default)]
    pub cost_per_token: f64,
    /// Secret handle for the API key, resolved by a [`SecretStore`].
    /// Required for every kind except `ollama`.
    #[serde(default)]
    pub credential: Option<String>,
    /// Override the vendor's API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_provider_max_tokens() -> u32 {
    4096
}

impl ProviderConfig {
    pub fn spec(&self) -> ProviderSpec {
        ProviderSpec::new(&self.id, &self.model)
            .max_tokens(self.max_tokens)
            .cost_per_token(self.cost_per_token)
    }

    /// Build the vendor adapter, resolving the credential through `secrets`.
    pub fn build_adapter(&self, secrets: &dyn SecretStore) -> Result<Arc<dyn ProviderAdapter>> {
        match self.kind {
            #[cfg(feature = "openai")]
            ProviderKind::OpenAi => {
                use crate::providers::OpenAiAdapter;
                let api_key = self.api_key(secrets)?;
                let adapter = match &self.base_url {
                    Some(url) => OpenAiAdapter::with_base_url(api_key, &self.model, url)?,
                    None => OpenAiAdapter::new(api_key, &self.model)?,
                };
                Ok(Arc::new(adapter.named(&self.id)))
            }
            #[cfg(feature = "anthropic")]
            ProviderKind::Anthropic => {
                use crate::providers::AnthropicAdapter;
                let api_key = self.api_key(secrets)?;
                let adapter = match &self.base_url {
                    Some(url) => AnthropicAdapter::with_base_url(api_key, &self.model, url)?,
                    None => AnthropicAdapter::new(api_key, &self.model)?,
                };
                Ok(Arc::new(adapter.named(&self.id)))
            }
            #[cfg(feature = "google")]
            ProviderKind::Google => {
                use crate::providers::GoogleAdapter;
                let api_key = self.api_key(secrets)?;
                let adapter = match &self.base_url {
                    Some(url) => GoogleAdapter::with_base_url(api_key, &self.model, url)?,
                    None => GoogleAdapter::new(api_key, &self.model)?,
                };
                Ok(Arc::new(adapter.named(&self.id)))
            }
            #[cfg(feature = "ollama")]
            ProviderKind::Ollama => {
                use crate::providers::OllamaAdapter;
                let adapter = match &self.base_url {
                    Some(url) => OllamaAdapter::with_base_url(&self.model, url)?,
                    None => OllamaAdapter::new(&self.model)?,
                };
                Ok(Arc::new(adapter.named(&self.id)))
            }
            #[allow(unreachable_patterns)]
            other => Err(SkaldError::Configuration(format!(
                "provider {}: support for {other:?} is not compiled in",
                self.id
            ))),
        }
    }

    #[cfg(any(feature = "openai", feature = "anthropic", feature = "google"))]
    fn api_key(&self, secrets: &dyn SecretStore) -> Result<String> {
        let handle = self.credential.as_deref().ok_or_else(|| {
            SkaldError::Configuration(format!("provider {}: no credential configured", self.id))
        })?;
        secrets
            .resolve(handle)
            .map_err(|e| SkaldError::Configuration(format!("provider {}: {e}", self.id)))
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.skald/config.toml`
    /// 3. `/etc/skald/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            SkaldError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content).map_err(|e| match e {
            SkaldError::Configuration(msg) => {
                SkaldError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| {
            SkaldError::Configuration(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.limits.attempt_timeout_secs == 0 {
            return Err(SkaldError::Configuration(
                "limits.attempt_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(SkaldError::Configuration(
                "circuit_breaker.failure_threshold must be greater than zero".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.providers {
            if !seen.insert(p.id.as_str()) {
                return Err(SkaldError::DuplicateProvider(p.id.clone()));
            }
        }
        Ok(())
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(SkaldError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".skald").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/skald/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(SkaldError::Configuration(
            "No config file found. Create ~/.skald/config.toml or /etc/skald/config.toml"
                .to_string(),
        ))
    }
}

// ============================================================================
// Secret stores
// ============================================================================

/// Resolves credential handles to secret material.
pub trait SecretStore: Send + Sync {
    /// Look up `handle`. Errors never include secret material.
    fn resolve(&self, handle: &str) -> Result<String>;
}

/// Resolves `env:NAME` (or bare `NAME`) from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn resolve(&self, handle: &str) -> Result<String> {
        let name = match handle.split_once(':') {
            Some(("env", name)) => name,
            Some(_) => {
                return Err(SkaldError::Configuration(format!(
                    "secret handle {handle:?} is not an environment handle"
                )));
            }
            None => handle,
        };
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(SkaldError::Configuration(format!(
                "environment variable {name} is not set"
            ))),
        }
    }
}

/// Secrets loaded from a permission-checked TOML file of `name = "value"`
/// pairs.
#[derive(Clone, Default)]
pub struct FileSecretStore {
    secrets: HashMap<String, String>,
}

impl fmt::Debug for FileSecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.secrets.keys().collect();
        names.sort();
        f.debug_struct("FileSecretStore")
            .field("names", &names)
            .finish()
    }
}

impl FileSecretStore {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.skald/secrets.toml` (if exists, must be 0600 or 0400)
    /// 2. `/etc/skald/secrets.toml` (if exists, must be 0600 or 0400)
    ///
    /// Returns an empty store if no file exists (credentials may come from
    /// the environment).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".skald").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/skald/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Self::default())
    }

    /// Load one secrets file, refusing group- or world-readable files.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            SkaldError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        // Parse errors may quote the offending line, so keep them out of the message.
        let secrets: HashMap<String, String> = toml::from_str(&content).map_err(|_| {
            SkaldError::Configuration(format!(
                "Failed to parse secrets file {path:?}: expected `name = \"value\"` pairs"
            ))
        })?;
        Ok(Self { secrets })
    }

    /// In-memory store, mainly for tests and embedding.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            secrets: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            SkaldError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(SkaldError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn resolve(&self, handle: &str) -> Result<String> {
        let name = match handle.split_once(':') {
            Some(("file", name)) => name,
            Some(_) => {
                return Err(SkaldError::Configuration(format!(
                    "secret handle {handle:?} is not a file handle"
                )));
            }
            None => handle,
        };
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| SkaldError::Configuration(format!("secret {name} not found")))
    }
}

/// Tries each store in order; the first hit wins.
#[derive(Default)]
pub struct ChainSecretStore {
    stores: Vec<Box<dyn SecretStore>>,
}

impl ChainSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, store: impl SecretStore + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }

    /// Secrets file first, then the environment.
    pub fn standard() -> Result<Self> {
        Ok(Self::new().with(FileSecretStore::load()?).with(EnvSecretStore))
    }
}

impl SecretStore for ChainSecretStore {
    fn resolve(&self, handle: &str) -> Result<String> {
        let mut last = None;
        for store in &self.stores {
            match store.resolve(handle) {
                Ok(secret) => return Ok(secret),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| {
            SkaldError::Configuration(format!("no secret store can resolve {handle:?}"))
        }))
    }
}
