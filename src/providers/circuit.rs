//! Per-provider circuit breaker.
//!
//! ```text
//!            threshold failures            cool-down elapsed
//!  Closed ───────────────────────► Open ───────────────────────► HalfOpen
//!    ▲                              ▲                               │
//!    │        trial success         │  trial failure (episode + 1)  │
//!    └──────────────────────────────┼───────────────────────────────┤
//!                                   └───────────────────────────────┘
//! ```
//!
//! [`Circuit`] is a plain state machine; the registry owns one per provider
//! behind a mutex and feeds it the current time from its [`Clock`](crate::Clock).

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Circuit breaker state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Healthy; calls flow normally.
    Closed,
    /// Tripped; no calls until the cool-down elapses.
    Open,
    /// Cool-down elapsed; exactly one trial call is permitted.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker thresholds and cool-downs.
///
/// ```rust
/// # use skald::CircuitBreakerConfig;
/// # use std::time::Duration;
/// let config = CircuitBreakerConfig::new()
///     .failure_threshold(5)
///     .base_cooldown(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit. Default: 3.
    pub failure_threshold: u32,
    /// A failure further than this from the previous one restarts the streak.
    /// Default: 60s.
    pub failure_window: Duration,
    /// Cool-down of the first open episode. Default: 30s.
    pub base_cooldown: Duration,
    /// Cap on the doubling cool-down. Default: 10 minutes.
    pub max_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window: Duration::from_secs(60),
            base_cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(600),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of consecutive failures that opens the circuit.
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Set the window within which failures count as consecutive.
    pub fn failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    /// Set the cool-down of the first open episode.
    pub fn base_cooldown(mut self, cooldown: Duration) -> Self {
        self.base_cooldown = cooldown;
        self
    }

    /// Set the maximum cool-down.
    pub fn max_cooldown(mut self, cooldown: Duration) -> Self {
        self.max_cooldown = cooldown;
        self
    }

    /// Cool-down for the given open episode (1-indexed).
    ///
    /// `base_cooldown * 2^(episode - 1)`, capped at `max_cooldown`.
    pub fn cooldown_for_episode(&self, episode: u32) -> Duration {
        let exponent = episode.saturating_sub(1);
        self.base_cooldown
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_cooldown)
    }
}

/// A state change worth logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Opened { cooldown: Duration },
    HalfOpened,
    Closed,
    Reopened { cooldown: Duration },
}

impl Transition {
    pub(crate) fn state(&self) -> CircuitState {
        match self {
            Transition::Opened { .. } | Transition::Reopened { .. } => CircuitState::Open,
            Transition::HalfOpened => CircuitState::HalfOpen,
            Transition::Closed => CircuitState::Closed,
        }
    }
}

/// Circuit breaker state for one provider.
#[derive(Debug, Clone)]
pub(crate) struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    open_since: Option<Instant>,
    /// Consecutive open episodes; drives the cool-down doubling.
    episode: u32,
    trial_in_flight: bool,
}

impl Default for Circuit {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            open_since: None,
            episode: 0,
            trial_in_flight: false,
        }
    }
}

impl Circuit {
    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub(crate) fn open_since(&self) -> Option<Instant> {
        self.open_since
    }

    /// Whether a new call may be started right now.
    pub(crate) fn is_available(&self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !self.trial_in_flight,
            CircuitState::Open => false,
        }
    }

    /// Move an open circuit to half-open once its cool-down has elapsed.
    pub(crate) fn refresh(
        &mut self,
        now: Instant,
        config: &CircuitBreakerConfig,
    ) -> Option<Transition> {
        if self.state != CircuitState::Open {
            return None;
        }
        let opened = self.open_since?;
        let cooldown = config.cooldown_for_episode(self.episode);
        if now.saturating_duration_since(opened) >= cooldown {
            self.state = CircuitState::HalfOpen;
            self.trial_in_flight = false;
            Some(Transition::HalfOpened)
        } else {
            None
        }
    }

    /// Claim permission for one call. Returns `Some(is_trial)` on success.
    pub(crate) fn try_acquire(&mut self) -> Option<bool> {
        match self.state {
            CircuitState::Closed => Some(false),
            CircuitState::HalfOpen if !self.trial_in_flight => {
                self.trial_in_flight = true;
                Some(true)
            }
            _ => None,
        }
    }

    /// Give back an unreported half-open trial.
    pub(crate) fn release_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    /// Record a successful call. `trial` is whether the call held the
    /// half-open trial.
    pub(crate) fn on_success(&mut self, trial: bool) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.last_failure = None;
                None
            }
            CircuitState::HalfOpen if trial => {
                *self = Circuit::default();
                Some(Transition::Closed)
            }
            // A call that began before the circuit opened; only the trial
            // decides a half-open circuit and the cool-down of an open one stands.
            CircuitState::HalfOpen | CircuitState::Open => None,
        }
    }

    /// Record a failed call. `trial` is whether the call held the
    /// half-open trial.
    pub(crate) fn on_failure(
        &mut self,
        now: Instant,
        config: &CircuitBreakerConfig,
        trial: bool,
    ) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                let stale = self
                    .last_failure
                    .is_some_and(|last| now.saturating_duration_since(last) > config.failure_window);
                if stale {
                    self.consecutive_failures = 0;
                }
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_failure = Some(now);
                if self.consecutive_failures >= config.failure_threshold.max(1) {
                    Some(Transition::Opened {
                        cooldown: self.open(now, config),
                    })
                } else {
                    None
                }
            }
            CircuitState::HalfOpen if trial => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_failure = Some(now);
                Some(Transition::Reopened {
                    cooldown: self.open(now, config),
                })
            }
            CircuitState::HalfOpen => None,
            CircuitState::Open => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_failure = Some(now);
                None
            }
        }
    }

    fn open(&mut self, now: Instant, config: &CircuitBreakerConfig) -> Duration {
        self.state = CircuitState::Open;
        self.open_since = Some(now);
        self.trial_in_flight = false;
        self.episode = self.episode.saturating_add(1);
        config.cooldown_for_episode(self.episode)
    }
}
