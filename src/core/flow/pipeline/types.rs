//! Generation pipeline types and configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::core::flow::collaborators::{GenerationAttempt, GenerationOutput};
use crate::core::flow::input::InputValidator;
use crate::core::flow::phase::PhaseState;
use crate::core::flow::retry::RetryPolicy;
use crate::core::flow::reveal::{RevealConfig, RevealUnit};

// ============================================================================
// Configuration
// ============================================================================

/// What `start` does while another run is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum RestartPolicy {
    /// Refuse with `AlreadyRunning`
    #[default]
    Reject,
    /// Cancel the active run and start the new one
    CancelAndRestart,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub validator: InputValidator,
    pub retry: RetryPolicy,
    /// Shortest time from `start` to the first revealed unit
    pub min_visible_duration: Duration,
    /// Watchdog deadline for the whole run; `None` disables the watchdog
    pub timeout: Option<Duration>,
    pub restart_policy: RestartPolicy,
    pub reveal: RevealConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validator: InputValidator::default(),
            retry: RetryPolicy::default(),
            min_visible_duration: Duration::ZERO,
            timeout: None,
            restart_policy: RestartPolicy::default(),
            reveal: RevealConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_validator(mut self, validator: InputValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_min_visible_duration(mut self, floor: Duration) -> Self {
        self.min_visible_duration = floor;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn with_reveal(mut self, reveal: RevealConfig) -> Self {
        self.reveal = reveal;
        self
    }
}

// ============================================================================
// Snapshots and Outcomes
// ============================================================================

/// Published on every transition of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseSnapshot {
    pub run_id: Uuid,
    pub phase: PhaseState,
    /// Generator calls that have returned so far. A successful call counts
    /// from the moment it returns, before its output is reviewed.
    pub attempts: u32,
}

impl PhaseSnapshot {
    pub(crate) fn new(run_id: Uuid, phase: PhaseState, attempts: u32) -> Self {
        Self {
            run_id,
            phase,
            attempts,
        }
    }

    /// True once observers should stop listening.
    pub fn is_final(&self) -> bool {
        self.phase.is_terminal() || self.phase == PhaseState::Idle
    }
}

/// Everything a finished run leaves behind.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub phase: PhaseState,
    /// Every phase the run passed through, oldest first
    pub history: Vec<PhaseState>,
    pub attempts: Vec<GenerationAttempt>,
    /// Units delivered to the handle, in order
    pub units: Vec<RevealUnit>,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.phase, PhaseState::Completed { .. })
    }

    pub fn output(&self) -> Option<&GenerationOutput> {
        self.phase.output()
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Explicit confirmation that the user saw the crisis support payload.
///
/// Only constructible through [`CrisisAcknowledgment::confirmed_by_user`], so
/// an interrupt can never be cleared by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrisisAcknowledgment {
    _private: (),
}

impl CrisisAcknowledgment {
    pub fn confirmed_by_user() -> Self {
        Self { _private: () }
    }
}

/// Caller commands delivered to a running flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FlowCommand {
    SkipReveal,
    Dismiss(CrisisAcknowledgment),
}
