//! Flow Error Taxonomy
//!
//! Every terminal `Failed` phase carries one of these values so callers can
//! render a specific, actionable message instead of a raw error string.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Validation
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ValidationError {
    #[error("Input is empty")]
    Empty,

    #[error("Input is {actual} characters, minimum is {min}")]
    TooShort { min: usize, actual: usize },

    #[error("Input is {actual} characters, maximum is {max}")]
    TooLong { max: usize, actual: usize },
}

// ============================================================================
// Policy
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PolicyError {
    /// Crisis content was detected and the flow is waiting for acknowledgment.
    #[error("Crisis content detected - acknowledgment required")]
    CrisisDetected,

    #[error("Request refused by content policy: {reason}")]
    PolicyRefused { reason: String },

    #[error("Generated output failed safety review: {reason}")]
    UnsafeOutput { reason: String },
}

// ============================================================================
// Generation
// ============================================================================

/// Error reported by a [`Generator`](super::Generator).
///
/// The transient / permanent split is the only classification the flow
/// needs; providers map their own failures onto it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "cause")]
pub enum GenerationError {
    #[error("Transient generation failure: {0}")]
    Transient(String),

    #[error("Generation failed: {0}")]
    Permanent(String),
}

impl GenerationError {
    pub fn transient(cause: impl Into<String>) -> Self {
        Self::Transient(cause.into())
    }

    pub fn permanent(cause: impl Into<String>) -> Self {
        Self::Permanent(cause.into())
    }

    pub fn timeout() -> Self {
        Self::Transient("upstream request timed out".to_string())
    }

    pub fn rate_limited() -> Self {
        Self::Transient("rate limited".to_string())
    }

    /// Classify an upstream HTTP status.
    ///
    /// 408, 429 and 5xx are retry-eligible; every other status is permanent.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let cause = format!("upstream status {}: {}", status, message.into());
        match status {
            408 | 429 | 500..=599 => Self::Transient(cause),
            _ => Self::Permanent(cause),
        }
    }

    /// Returns true if this error may succeed on a later attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn cause(&self) -> &str {
        match self {
            Self::Transient(cause) | Self::Permanent(cause) => cause,
        }
    }
}

// ============================================================================
// Operational
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OperationalError {
    #[error("Generation failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        last_error: GenerationError,
    },

    #[error("Flow timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("Flow was cancelled")]
    Cancelled,

    #[error("A flow is already running")]
    AlreadyRunning,

    /// The shared circuit breaker refused the attempt.
    #[error("Generation is temporarily unavailable (circuit open)")]
    CircuitOpen,
}

// ============================================================================
// Flow Error
// ============================================================================

/// Structured failure carried by `PhaseState::Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "category", content = "error")]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Operational(#[from] OperationalError),
}

impl FlowError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Operational(OperationalError::ExhaustedRetries { .. })
        )
    }

    pub fn is_unsafe_output(&self) -> bool {
        matches!(self, Self::Policy(PolicyError::UnsafeOutput { .. }))
    }
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;

// ============================================================================
// Transition / Handle Errors
// ============================================================================

/// An event was applied to a phase that does not accept it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal transition: {event} while {from}")]
pub struct TransitionError {
    pub from: &'static str,
    pub event: &'static str,
}

/// A caller command was rejected by the current phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    #[error("Crisis interrupt must be acknowledged with dismiss_crisis_interrupt")]
    AcknowledgmentRequired,

    #[error("No crisis interrupt is pending")]
    NotInterrupted,

    #[error("Flow is not revealing output")]
    NotRevealing,

    #[error("Flow has already finished")]
    Finished,
}

/// Failure inside a persistence sink. Never propagated into the flow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Persistence sink error: {0}")]
pub struct SinkError(pub String);
