//! Collaborator Interfaces
//!
//! Narrow traits the pipeline calls out through. Implementations (LLM
//! providers, analytics stores) live outside this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::cancel::CancellationToken;
use super::error::{GenerationError, SinkError};
use super::input::FlowInput;

// ============================================================================
// Output / Attempt Types
// ============================================================================

/// Completed generation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
    /// Source references the output quotes or paraphrases
    #[serde(default)]
    pub citations: Vec<String>,
}

impl GenerationOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: Vec::new(),
        }
    }

    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        self.citations.push(citation.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
    /// Generated, but the output was crisis-class
    CrisisFlagged,
}

/// Diagnostics for one call to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub run_id: Uuid,
    /// 1-based
    pub index: u32,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: AttemptOutcome,
    pub error: Option<GenerationError>,
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Produces content for a run. May be called up to `max_attempts` times.
///
/// Implementations must observe `signal` and stop promptly once it fires.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        input: &FlowInput,
        signal: &CancellationToken,
    ) -> Result<GenerationOutput, GenerationError>;
}

/// Best-effort analytics / persistence. Errors are logged and dropped.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record_attempt(&self, attempt: &GenerationAttempt) -> Result<(), SinkError>;

    async fn record_result(&self, run_id: Uuid, output: &GenerationOutput)
        -> Result<(), SinkError>;
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn record_attempt(&self, _attempt: &GenerationAttempt) -> Result<(), SinkError> {
        Ok(())
    }

    async fn record_result(
        &self,
        _run_id: Uuid,
        _output: &GenerationOutput,
    ) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that writes records to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl PersistenceSink for LogSink {
    async fn record_attempt(&self, attempt: &GenerationAttempt) -> Result<(), SinkError> {
        log::info!(
            "run {} attempt {} finished in {:?}: {:?}",
            attempt.run_id,
            attempt.index,
            attempt.duration,
            attempt.outcome
        );
        Ok(())
    }

    async fn record_result(
        &self,
        run_id: Uuid,
        output: &GenerationOutput,
    ) -> Result<(), SinkError> {
        log::info!(
            "run {} completed: {} chars, {} citations",
            run_id,
            output.text.chars().count(),
            output.citations.len()
        );
        Ok(())
    }
}
