//! Phase State Machine
//!
//! The finite set of phases a run moves through and the only legal ways to
//! move between them. The machine performs no side effects; the pipeline
//! applies events and performs the work each phase implies.
//!
//! ```text
//! Idle -> Validating -> Moderating(Pre) -> Generating(1..=max) -> Moderating(Post)
//!      -> Revealing(0..=total) -> Completed
//!
//! Moderating(Pre) -> Interrupted(crisis) --dismiss--> Idle
//! any running phase -> Failed(error) | Cancelled
//! ```

use serde::Serialize;

use super::collaborators::GenerationOutput;
use super::error::{
    FlowError, GenerationError, OperationalError, PolicyError, TransitionError, ValidationError,
};
use super::safety::{CrisisSupport, ExemptionReason, ModerationStage};

// ============================================================================
// Phase
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum PhaseState {
    Idle,
    Validating,
    Moderating {
        stage: ModerationStage,
    },
    Generating {
        /// 1-based
        attempt: u32,
    },
    /// Suspended until the user acknowledges the crisis support payload
    Interrupted {
        support: CrisisSupport,
    },
    Revealing {
        revealed: usize,
        total: usize,
    },
    Completed {
        output: GenerationOutput,
    },
    Failed {
        error: FlowError,
    },
    Cancelled,
}

impl PhaseState {
    pub fn name(&self) -> &'static str {
        match self {
            PhaseState::Idle => "idle",
            PhaseState::Validating => "validating",
            PhaseState::Moderating {
                stage: ModerationStage::Pre,
            } => "moderating(pre)",
            PhaseState::Moderating {
                stage: ModerationStage::Post,
            } => "moderating(post)",
            PhaseState::Generating { .. } => "generating",
            PhaseState::Interrupted { .. } => "interrupted",
            PhaseState::Revealing { .. } => "revealing",
            PhaseState::Completed { .. } => "completed",
            PhaseState::Failed { .. } => "failed",
            PhaseState::Cancelled => "cancelled",
        }
    }

    /// Completed, Failed or Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseState::Completed { .. } | PhaseState::Failed { .. } | PhaseState::Cancelled
        )
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, PhaseState::Interrupted { .. })
    }

    /// A run is active from Validating until it settles; a crisis interrupt
    /// counts as active.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && !matches!(self, PhaseState::Idle)
    }

    pub fn error(&self) -> Option<&FlowError> {
        match self {
            PhaseState::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn output(&self) -> Option<&GenerationOutput> {
        match self {
            PhaseState::Completed { output } => Some(output),
            _ => None,
        }
    }
}

impl Default for PhaseState {
    fn default() -> Self {
        PhaseState::Idle
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    Start,
    ValidationPassed,
    ValidationFailed(ValidationError),
    /// Pre-moderation found nothing to stop on
    InputCleared,
    CrisisDetected(CrisisSupport),
    PolicyViolation(PolicyError),
    GenerationSucceeded,
    TransientFailure(GenerationError),
    PermanentFailure(GenerationError),
    OperationalFailure(OperationalError),
    OutputCleared {
        total_units: usize,
    },
    OutputExempted {
        reason: ExemptionReason,
        total_units: usize,
    },
    RevealAdvanced,
    RevealSkipped,
    RevealFinished(GenerationOutput),
    Dismiss,
    Cancel,
}

impl PhaseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PhaseEvent::Start => "start",
            PhaseEvent::ValidationPassed => "validation_passed",
            PhaseEvent::ValidationFailed(_) => "validation_failed",
            PhaseEvent::InputCleared => "input_cleared",
            PhaseEvent::CrisisDetected(_) => "crisis_detected",
            PhaseEvent::PolicyViolation(_) => "policy_violation",
            PhaseEvent::GenerationSucceeded => "generation_succeeded",
            PhaseEvent::TransientFailure(_) => "transient_failure",
            PhaseEvent::PermanentFailure(_) => "permanent_failure",
            PhaseEvent::OperationalFailure(_) => "operational_failure",
            PhaseEvent::OutputCleared { .. } => "output_cleared",
            PhaseEvent::OutputExempted { .. } => "output_exempted",
            PhaseEvent::RevealAdvanced => "reveal_advanced",
            PhaseEvent::RevealSkipped => "reveal_skipped",
            PhaseEvent::RevealFinished(_) => "reveal_finished",
            PhaseEvent::Dismiss => "dismiss",
            PhaseEvent::Cancel => "cancel",
        }
    }
}

// ============================================================================
// Transition Function
// ============================================================================

fn failed(error: impl Into<FlowError>) -> PhaseState {
    PhaseState::Failed {
        error: error.into(),
    }
}

/// Compute the phase that follows `state` on `event`.
pub fn next_phase(
    state: &PhaseState,
    event: PhaseEvent,
    max_attempts: u32,
) -> Result<PhaseState, TransitionError> {
    use ModerationStage::{Post, Pre};
    use PhaseEvent as E;
    use PhaseState as S;

    let illegal = TransitionError {
        from: state.name(),
        event: event.name(),
    };

    let next = match (state, event) {
        (S::Idle, E::Start) => S::Validating,

        (S::Validating, E::ValidationPassed) => S::Moderating { stage: Pre },
        (S::Validating, E::ValidationFailed(err)) => failed(err),

        (S::Moderating { stage: Pre }, E::InputCleared) => S::Generating { attempt: 1 },
        (S::Moderating { stage: Pre }, E::CrisisDetected(support)) => S::Interrupted { support },
        (S::Moderating { stage: Pre }, E::PolicyViolation(err)) => failed(err),

        (S::Generating { .. }, E::GenerationSucceeded) => S::Moderating { stage: Post },
        (S::Generating { attempt }, E::TransientFailure(last_error)) => {
            if *attempt < max_attempts {
                S::Generating {
                    attempt: attempt + 1,
                }
            } else {
                failed(OperationalError::ExhaustedRetries {
                    attempts: *attempt,
                    last_error,
                })
            }
        }
        (S::Generating { .. }, E::PermanentFailure(err)) => failed(err),

        (S::Moderating { stage: Post }, E::OutputCleared { total_units })
        | (S::Moderating { stage: Post }, E::OutputExempted { total_units, .. }) => {
            S::Revealing {
                revealed: 0,
                total: total_units,
            }
        }
        (S::Moderating { stage: Post }, E::PolicyViolation(err)) => failed(err),

        (S::Revealing { revealed, total }, E::RevealAdvanced) if revealed < total => {
            S::Revealing {
                revealed: revealed + 1,
                total: *total,
            }
        }
        (S::Revealing { total, .. }, E::RevealSkipped) => S::Revealing {
            revealed: *total,
            total: *total,
        },
        (S::Revealing { .. }, E::RevealFinished(output)) => S::Completed { output },

        (S::Interrupted { .. }, E::Dismiss) => S::Idle,

        // Operational failures (timeout, circuit open) end any running phase.
        (s, E::OperationalFailure(err)) if s.is_active() && !s.is_interrupted() => failed(err),

        // The crisis path only leaves through an explicit Dismiss.
        (s, E::Cancel) if s.is_active() && !s.is_interrupted() => S::Cancelled,

        _ => return Err(illegal),
    };

    Ok(next)
}

// ============================================================================
// Phase Machine
// ============================================================================

/// Owns one run's phase and its transition history.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    state: PhaseState,
    max_attempts: u32,
    history: Vec<PhaseState>,
}

impl PhaseMachine {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: PhaseState::Idle,
            max_attempts: max_attempts.max(1),
            history: vec![PhaseState::Idle],
        }
    }

    pub fn state(&self) -> &PhaseState {
        &self.state
    }

    /// Every phase the machine has been in, oldest first.
    pub fn history(&self) -> &[PhaseState] {
        &self.history
    }

    pub fn apply(&mut self, event: PhaseEvent) -> Result<&PhaseState, TransitionError> {
        let next = next_phase(&self.state, event, self.max_attempts)?;
        log::debug!("phase {} -> {}", self.state.name(), next.name());
        self.history.push(next.clone());
        self.state = next;
        Ok(&self.state)
    }

    pub fn into_history(self) -> Vec<PhaseState> {
        self.history
    }
}
