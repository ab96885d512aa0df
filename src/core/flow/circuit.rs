//! Circuit Breaker
//!
//! Process-wide availability gate shared by every pipeline that talks to the
//! same generator. After repeated transient failures the circuit opens and
//! runs fail fast with `CircuitOpen` instead of queueing more doomed calls.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::clock::{ClockSource, SystemClock};

// ============================================================================
// Circuit Breaker Pattern
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    /// Normal operation - attempts allowed
    #[default]
    Closed,
    /// Generator failing - attempts refused until the deadline
    Open { until: Instant },
    /// Testing recovery - a single trial attempt at a time
    HalfOpen { trial_in_flight: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a trial
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_duration: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                ..config
            },
        }
    }

    /// Ask permission for one attempt at `now`.
    ///
    /// An expired open circuit moves to half-open and grants the trial;
    /// while that trial is in flight everyone else is refused.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open { until } if now >= until => {
                self.state = CircuitState::HalfOpen {
                    trial_in_flight: true,
                };
                true
            }
            CircuitState::Open { .. } => false,
            CircuitState::HalfOpen {
                trial_in_flight: false,
            } => {
                self.state = CircuitState::HalfOpen {
                    trial_in_flight: true,
                };
                true
            }
            CircuitState::HalfOpen {
                trial_in_flight: true,
            } => false,
        }
    }

    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.state = CircuitState::Closed;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.failure_count = self.failure_count.saturating_add(1);
        let trip = match self.state {
            CircuitState::HalfOpen { .. } => true,
            CircuitState::Closed => self.failure_count >= self.config.failure_threshold,
            CircuitState::Open { .. } => false,
        };
        if trip {
            log::warn!(
                "Circuit opened after {} consecutive failures (retry in {:?})",
                self.failure_count,
                self.config.open_duration
            );
            self.state = CircuitState::Open {
                until: now + self.config.open_duration,
            };
        }
    }

    /// Give back a half-open trial that ended without a verdict.
    pub fn release_trial(&mut self) {
        if let CircuitState::HalfOpen {
            trial_in_flight: true,
        } = self.state
        {
            self.state = CircuitState::HalfOpen {
                trial_in_flight: false,
            };
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
    }
}

// ============================================================================
// Shared Breaker
// ============================================================================

/// Thread-safe breaker shared across pipelines.
///
/// Every state change happens under one mutex acquisition, so concurrent
/// runs see a single writer per transition.
#[derive(Clone)]
pub struct SharedCircuitBreaker {
    inner: Arc<Mutex<CircuitBreaker>>,
    clock: Arc<dyn ClockSource>,
}

impl fmt::Debug for SharedCircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCircuitBreaker").finish_non_exhaustive()
    }
}

impl Default for SharedCircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl SharedCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CircuitBreaker::with_config(config))),
            clock,
        }
    }

    pub async fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        self.inner.lock().await.try_acquire(now)
    }

    pub async fn record_success(&self) {
        self.inner.lock().await.record_success();
    }

    pub async fn record_failure(&self) {
        let now = self.clock.now();
        self.inner.lock().await.record_failure(now);
    }

    pub async fn release_trial(&self) {
        self.inner.lock().await.release_trial();
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state()
    }

    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.failure_count()
    }

    /// Force the breaker closed. Production paths never call this.
    #[doc(hidden)]
    pub async fn reset_for_tests(&self) {
        self.inner.lock().await.reset();
    }
}
