//! Generation Pipeline
//!
//! Orchestrates a run: validate, pre-moderate, generate with retry,
//! post-moderate, then reveal. Each run executes on its own tokio task and
//! reports through a [`FlowHandle`]; the pipeline keeps just enough of the
//! latest run to enforce one in-flight run at a time, and of any run it
//! replaced, so a late crisis interrupt still blocks new work.

mod handle;
mod run;
mod types;


pub use handle::FlowHandle;
pub use types::{
    CrisisAcknowledgment, PhaseSnapshot, PipelineConfig, RestartPolicy, RunOutcome,
};

use futures::Stream;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use self::handle::send_dismiss;
use self::run::{Collaborators, RunContext};
use self::types::FlowCommand;
use super::cancel::CancellationToken;
use super::circuit::SharedCircuitBreaker;
use super::clock::{ClockSource, Sleeper, SystemClock, TokioSleeper};
use super::collaborators::{Generator, NullSink, PersistenceSink};
use super::error::{FlowError, HandleError, OperationalError, PolicyError};
use super::input::FlowInput;
use super::phase::{PhaseEvent, PhaseMachine, PhaseState};
use super::safety::{Moderator, SafetyInterceptor};

/// Control side of a run the pipeline started.
struct ActiveRun {
    run_id: Uuid,
    token: CancellationToken,
    phase_rx: watch::Receiver<PhaseSnapshot>,
    /// Kept so a pending interrupt can be dismissed after the handle is gone.
    /// `None` for input that failed validation and never spawned a task.
    commands: Option<mpsc::UnboundedSender<FlowCommand>>,
}

impl ActiveRun {
    fn phase(&self) -> PhaseState {
        self.phase_rx.borrow().phase.clone()
    }
}

pub struct GenerationPipeline {
    config: PipelineConfig,
    generator: Arc<dyn Generator>,
    safety: SafetyInterceptor,
    sink: Arc<dyn PersistenceSink>,
    clock: Arc<dyn ClockSource>,
    sleeper: Arc<dyn Sleeper>,
    breaker: Option<SharedCircuitBreaker>,
    active: Option<ActiveRun>,
    /// Runs replaced under `CancelAndRestart` that have not settled yet
    displaced: Vec<ActiveRun>,
}

impl fmt::Debug for GenerationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationPipeline")
            .field("config", &self.config)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl GenerationPipeline {
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn Generator>,
        moderator: Arc<dyn Moderator>,
    ) -> Self {
        Self {
            config,
            generator,
            safety: SafetyInterceptor::new(moderator),
            sink: Arc::new(NullSink),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            breaker: None,
            active: None,
            displaced: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: SharedCircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Phase of the most recent run, or Idle. A pending crisis interrupt on
    /// any run this pipeline started takes precedence.
    pub fn phase(&self) -> PhaseState {
        if let Some(run) = self.pending_crisis() {
            return run.phase();
        }
        self.active
            .as_ref()
            .map(ActiveRun::phase)
            .unwrap_or_default()
    }

    fn pending_crisis(&self) -> Option<&ActiveRun> {
        self.active
            .iter()
            .chain(self.displaced.iter())
            .find(|run| run.phase().is_interrupted())
    }

    fn prune_displaced(&mut self) {
        self.displaced.retain(|run| run.phase().is_active());
    }

    /// Begin a run.
    ///
    /// Validation happens synchronously: invalid input returns the
    /// `ValidationError` and never reaches the generator. Must be called
    /// from within a tokio runtime.
    pub fn start(&mut self, input: FlowInput) -> Result<FlowHandle, FlowError> {
        self.prune_displaced();
        if self.pending_crisis().is_some() {
            return Err(PolicyError::CrisisDetected.into());
        }
        let live = self
            .active
            .as_ref()
            .is_some_and(|active| active.phase().is_active());

        let run_id = Uuid::new_v4();
        let started = self.clock.now();
        let max_attempts = self.config.retry.max_attempts();
        let mut machine = PhaseMachine::new(max_attempts);

        // Idle -> Validating -> (Failed | Moderating(Pre)) happens before any
        // observer can subscribe, so only the settled phase is published.
        let _ = machine.apply(PhaseEvent::Start);
        if let Err(err) = self.config.validator.validate(&input) {
            log::info!("Run {} rejected: {}", run_id, err);
            // A live run is left alone; the rejection only becomes the
            // pipeline's phase when nothing else is in flight.
            if !live {
                let phase = machine
                    .apply(PhaseEvent::ValidationFailed(err.clone()))
                    .map(PhaseState::clone)
                    .unwrap_or_default();
                let (_, phase_rx) = watch::channel(PhaseSnapshot::new(run_id, phase, 0));
                self.active = Some(ActiveRun {
                    run_id,
                    token: CancellationToken::new(),
                    phase_rx,
                    commands: None,
                });
            }
            return Err(err.into());
        }

        if live {
            match self.config.restart_policy {
                RestartPolicy::Reject => return Err(OperationalError::AlreadyRunning.into()),
                RestartPolicy::CancelAndRestart => {
                    if let Some(previous) = self.active.take() {
                        log::info!("Replacing active run {}", previous.run_id);
                        previous.token.cancel();
                        self.displaced.push(previous);
                    }
                }
            }
        }

        let phase = machine
            .apply(PhaseEvent::ValidationPassed)
            .map(PhaseState::clone)
            .unwrap_or_default();

        let token = CancellationToken::new();
        let (phase_tx, phase_rx) = watch::channel(PhaseSnapshot::new(run_id, phase, 0));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (units_tx, units_rx) = mpsc::unbounded_channel();

        let context = RunContext::new(
            run_id,
            input,
            machine,
            self.config.clone(),
            Collaborators {
                generator: Arc::clone(&self.generator),
                safety: self.safety.clone(),
                sink: Arc::clone(&self.sink),
                clock: Arc::clone(&self.clock),
                sleeper: Arc::clone(&self.sleeper),
                breaker: self.breaker.clone(),
            },
            token.clone(),
            phase_tx,
            command_rx,
            units_tx,
            started,
        );

        log::info!("Run {} started", run_id);
        let task = tokio::spawn(context.run());

        self.active = Some(ActiveRun {
            run_id,
            token: token.clone(),
            phase_rx: phase_rx.clone(),
            commands: Some(command_tx.clone()),
        });

        Ok(FlowHandle::new(
            run_id,
            phase_rx,
            command_tx,
            units_rx,
            token,
            task,
            self.config.reveal,
        ))
    }

    pub fn observe(
        &self,
        handle: &FlowHandle,
    ) -> impl Stream<Item = PhaseSnapshot> + Send + 'static {
        handle.observe()
    }

    pub fn cancel(&self, handle: &FlowHandle) -> Result<(), HandleError> {
        handle.cancel()
    }

    /// Clear the pending crisis interrupt, whichever run raised it. Works
    /// after the run's handle has been dropped.
    pub async fn dismiss_crisis_interrupt(
        &self,
        ack: CrisisAcknowledgment,
    ) -> Result<(), HandleError> {
        let run = self.pending_crisis().ok_or(HandleError::NotInterrupted)?;
        let commands = run.commands.clone().ok_or(HandleError::Finished)?;
        log::debug!("Dismissing crisis interrupt on run {}", run.run_id);
        send_dismiss(&commands, run.phase_rx.clone(), ack).await
    }

    pub fn skip_reveal(&self, handle: &FlowHandle) -> Result<(), HandleError> {
        handle.skip_reveal()
    }

    /// Forget the latest run and return to Idle, cancelling it if still live.
    ///
    /// Refused while a crisis interrupt is pending.
    pub fn reset(&mut self) -> Result<(), HandleError> {
        self.prune_displaced();
        if self.pending_crisis().is_some() {
            return Err(HandleError::AcknowledgmentRequired);
        }
        if let Some(active) = &self.active {
            active.token.cancel();
            log::debug!("Pipeline reset (run {})", active.run_id);
        }
        self.active = None;
        Ok(())
    }
}
