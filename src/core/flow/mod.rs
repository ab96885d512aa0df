//! Generation Flow
//!
//! Phase-based controller for a long-running, retryable generation task:
//! input validation, safety moderation with a crisis interrupt, generation
//! with backoff, and progressive reveal of the result.

pub mod cancel;
pub mod circuit;
pub mod clock;
pub mod collaborators;
pub mod error;
pub mod experience;
pub mod input;
pub mod moderation;
pub mod phase;
pub mod pipeline;
pub mod retry;
pub mod reveal;
pub mod safety;

pub use cancel::CancellationToken;
pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState, SharedCircuitBreaker};
pub use clock::{ClockSource, Sleeper, SystemClock, TokioSleeper};
pub use collaborators::{
    AttemptOutcome, GenerationAttempt, GenerationOutput, Generator, LogSink, NullSink,
    PersistenceSink,
};
pub use error::{
    FlowError, FlowResult, GenerationError, HandleError, OperationalError, PolicyError,
    SinkError, TransitionError, ValidationError,
};
pub use experience::{Experience, UnknownExperience};
pub use input::{FlowInput, InputValidator};
pub use moderation::KeywordModerator;
pub use phase::{PhaseEvent, PhaseMachine, PhaseState};
pub use pipeline::{
    CrisisAcknowledgment, FlowHandle, GenerationPipeline, PhaseSnapshot, PipelineConfig,
    RestartPolicy, RunOutcome,
};
pub use retry::{Jitter, NoJitter, RetryDecision, RetryPolicy};
pub use reveal::{RevealConfig, RevealGranularity, RevealScheduler, RevealUnit};
pub use safety::{
    CrisisSupport, ExemptionReason, FlagCategory, Gate, ModerationStage, Moderator,
    SafetyInterceptor, SupportResource, Verdict,
};
