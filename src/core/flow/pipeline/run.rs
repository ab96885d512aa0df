//! The task that drives one run from moderation to a settled phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::types::{FlowCommand, PhaseSnapshot, PipelineConfig, RunOutcome};
use crate::core::flow::cancel::CancellationToken;
use crate::core::flow::circuit::SharedCircuitBreaker;
use crate::core::flow::clock::{ClockSource, Sleeper};
use crate::core::flow::collaborators::{
    AttemptOutcome, GenerationAttempt, GenerationOutput, Generator, PersistenceSink,
};
use crate::core::flow::error::{GenerationError, OperationalError, PolicyError};
use crate::core::flow::input::FlowInput;
use crate::core::flow::phase::{PhaseEvent, PhaseMachine, PhaseState};
use crate::core::flow::retry::RetryDecision;
use crate::core::flow::reveal::{segment, RevealScheduler, RevealUnit};
use crate::core::flow::safety::{
    CrisisSupport, ExemptionReason, Gate, SafetyInterceptor, CRISIS_LOG_TARGET,
    CRISIS_OUTPUT_REASON,
};

/// Why a run stopped short of revealing.
enum Halt {
    /// The run token fired: caller cancel or watchdog
    Signalled,
    /// The event that settles the run
    Event(PhaseEvent),
    Crisis(CrisisSupport),
}

type Step<T> = Result<T, Halt>;

/// Output that passed post-moderation, ready to reveal.
struct Reviewed {
    output: GenerationOutput,
    exemption: Option<ExemptionReason>,
}

pub(super) struct Collaborators {
    pub generator: Arc<dyn Generator>,
    pub safety: SafetyInterceptor,
    pub sink: Arc<dyn PersistenceSink>,
    pub clock: Arc<dyn ClockSource>,
    pub sleeper: Arc<dyn Sleeper>,
    pub breaker: Option<SharedCircuitBreaker>,
}

pub(super) struct RunContext {
    pub run_id: Uuid,
    pub input: FlowInput,
    pub machine: PhaseMachine,
    pub config: PipelineConfig,
    pub deps: Collaborators,
    pub token: CancellationToken,
    pub phase_tx: watch::Sender<PhaseSnapshot>,
    pub commands: mpsc::UnboundedReceiver<FlowCommand>,
    pub units_tx: mpsc::UnboundedSender<RevealUnit>,
    pub started: Instant,
    attempts: Vec<GenerationAttempt>,
    /// Generator calls that have returned, recorded or not
    calls: u32,
    revealed: Vec<RevealUnit>,
    timed_out: Arc<AtomicBool>,
    watchdog_guard: CancellationToken,
}

impl RunContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: Uuid,
        input: FlowInput,
        machine: PhaseMachine,
        config: PipelineConfig,
        deps: Collaborators,
        token: CancellationToken,
        phase_tx: watch::Sender<PhaseSnapshot>,
        commands: mpsc::UnboundedReceiver<FlowCommand>,
        units_tx: mpsc::UnboundedSender<RevealUnit>,
        started: Instant,
    ) -> Self {
        Self {
            run_id,
            input,
            machine,
            config,
            deps,
            token,
            phase_tx,
            commands,
            units_tx,
            started,
            attempts: Vec::new(),
            calls: 0,
            revealed: Vec::new(),
            timed_out: Arc::new(AtomicBool::new(false)),
            watchdog_guard: CancellationToken::new(),
        }
    }

    pub async fn run(mut self) -> RunOutcome {
        let watchdog = self.spawn_watchdog();

        match self.drive().await {
            Ok(()) => {}
            Err(Halt::Signalled) => {
                let event = if self.timed_out.load(Ordering::SeqCst) {
                    PhaseEvent::OperationalFailure(OperationalError::TimedOut {
                        after: self.config.timeout.unwrap_or_default(),
                    })
                } else {
                    PhaseEvent::Cancel
                };
                self.apply(event);
            }
            Err(Halt::Event(event)) => self.apply(event),
            Err(Halt::Crisis(support)) => {
                // The interrupt outlives any deadline.
                self.watchdog_guard.cancel();
                self.apply(PhaseEvent::CrisisDetected(support));
                self.await_dismissal().await;
            }
        }

        self.watchdog_guard.cancel();
        if let Some(watchdog) = watchdog {
            let _ = watchdog.await;
        }
        self.finish()
    }

    // ========================================================================
    // Stages
    // ========================================================================

    async fn drive(&mut self) -> Step<()> {
        // A verdict that is already in wins over a cancel raised alongside it.
        let gate = tokio::select! {
            biased;
            gate = self.deps.safety.pre_check(&self.input) => gate,
            _ = self.token.cancelled() => return Err(Halt::Signalled),
        };
        match gate {
            Gate::Pass | Gate::PassExempt(_) => self.apply(PhaseEvent::InputCleared),
            Gate::Interrupt(support) => return Err(Halt::Crisis(support)),
            Gate::Refuse(err) | Gate::Withhold(err) => {
                return Err(Halt::Event(PhaseEvent::PolicyViolation(err)))
            }
        }

        let reviewed = self.generate_with_floor().await?;
        self.reveal(reviewed).await
    }

    /// Generation and post-moderation raced against the visible-duration
    /// floor. Failures return at once; success waits out the floor.
    async fn generate_with_floor(&mut self) -> Step<Reviewed> {
        let elapsed = self.deps.clock.now().saturating_duration_since(self.started);
        let remaining = self.config.min_visible_duration.saturating_sub(elapsed);

        let sleeper = Arc::clone(&self.deps.sleeper);
        let token = self.token.clone();
        let floor = async move { sleeper.delay(remaining, &token).await };
        tokio::pin!(floor);
        let mut floor_done = false;

        let result = {
            let work = self.generate_and_review();
            tokio::pin!(work);
            loop {
                tokio::select! {
                    result = &mut work => break result,
                    _ = &mut floor, if !floor_done => floor_done = true,
                }
            }
        };

        let reviewed = result?;
        if !floor_done && floor.await.is_err() {
            return Err(Halt::Signalled);
        }
        if self.token.is_cancelled() {
            return Err(Halt::Signalled);
        }
        Ok(reviewed)
    }

    async fn generate_and_review(&mut self) -> Step<Reviewed> {
        let (output, attempt) = self.generate_with_retry().await?;
        self.apply(PhaseEvent::GenerationSucceeded);

        let gate = guarded(
            &self.token,
            self.deps.safety.post_check(&output, &self.input),
        )
        .await?;

        let outcome = if gate.is_crisis_refusal() {
            AttemptOutcome::CrisisFlagged
        } else {
            AttemptOutcome::Success
        };
        self.record_attempt(GenerationAttempt { outcome, ..attempt }).await;

        match gate {
            Gate::Pass => Ok(Reviewed {
                output,
                exemption: None,
            }),
            Gate::PassExempt(reason) => Ok(Reviewed {
                output,
                exemption: Some(reason),
            }),
            Gate::Refuse(err) | Gate::Withhold(err) => {
                Err(Halt::Event(PhaseEvent::PolicyViolation(err)))
            }
            // Post-moderation never interrupts; withhold the output instead.
            Gate::Interrupt(_) => Err(Halt::Event(PhaseEvent::PolicyViolation(
                PolicyError::UnsafeOutput {
                    reason: CRISIS_OUTPUT_REASON.to_string(),
                },
            ))),
        }
    }

    async fn generate_with_retry(&mut self) -> Step<(GenerationOutput, GenerationAttempt)> {
        loop {
            let attempt = match self.machine.state() {
                PhaseState::Generating { attempt } => *attempt,
                _ => return Err(Halt::Signalled),
            };

            if let Some(breaker) = &self.deps.breaker {
                if !breaker.try_acquire().await {
                    log::warn!("Run {} refused by open circuit", self.run_id);
                    return Err(Halt::Event(PhaseEvent::OperationalFailure(
                        OperationalError::CircuitOpen,
                    )));
                }
            }

            let started_at = self.deps.clock.timestamp();
            let t0 = self.deps.clock.now();
            log::debug!("Run {} attempt {} started", self.run_id, attempt);

            let result = {
                let generator = &self.deps.generator;
                let input = &self.input;
                let token = &self.token;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    result = generator.generate(input, token) => Some(result),
                }
            };
            let duration = self.deps.clock.now().saturating_duration_since(t0);
            if result.is_some() {
                self.calls += 1;
            }

            let record = |outcome, error| GenerationAttempt {
                run_id: self.run_id,
                index: attempt,
                started_at,
                duration,
                outcome,
                error,
            };

            let error = match result {
                None => {
                    self.breaker_release().await;
                    return Err(Halt::Signalled);
                }
                Some(Ok(output)) => {
                    if let Some(breaker) = &self.deps.breaker {
                        breaker.record_success().await;
                    }
                    return Ok((output, record(AttemptOutcome::Success, None)));
                }
                Some(Err(error)) => error,
            };

            let attempt_record = if error.is_transient() {
                record(AttemptOutcome::TransientFailure, Some(error.clone()))
            } else {
                record(AttemptOutcome::PermanentFailure, Some(error.clone()))
            };
            self.note_failure(&error).await;
            self.record_attempt(attempt_record).await;

            match self.config.retry.decide(attempt, &error) {
                RetryDecision::RetryAfter(delay) => {
                    log::info!(
                        "Run {} attempt {} failed ({}); retrying in {:?}",
                        self.run_id,
                        attempt,
                        error,
                        delay
                    );
                    if self.deps.sleeper.delay(delay, &self.token).await.is_err() {
                        return Err(Halt::Signalled);
                    }
                    self.apply(PhaseEvent::TransientFailure(error));
                }
                RetryDecision::Exhausted => {
                    return Err(Halt::Event(PhaseEvent::TransientFailure(error)));
                }
                RetryDecision::NotRetryable => {
                    return Err(Halt::Event(PhaseEvent::PermanentFailure(error)));
                }
            }
        }
    }

    async fn reveal(&mut self, reviewed: Reviewed) -> Step<()> {
        let units = segment(&reviewed.output.text, &self.config.reveal);
        let total_units = units.len();
        let event = match reviewed.exemption {
            Some(reason) => PhaseEvent::OutputExempted {
                reason,
                total_units,
            },
            None => PhaseEvent::OutputCleared { total_units },
        };
        self.apply(event);

        let mut scheduler = RevealScheduler::new(units, self.token.clone());
        let mut commands_open = true;

        while let Some(unit) = scheduler.advance() {
            let pause = unit.delay;
            self.emit(unit);
            self.apply(PhaseEvent::RevealAdvanced);
            if scheduler.is_complete() {
                break;
            }

            let sleeper = Arc::clone(&self.deps.sleeper);
            let token = self.token.clone();
            let wait = async move { sleeper.delay(pause, &token).await };
            tokio::pin!(wait);

            loop {
                tokio::select! {
                    biased;
                    command = self.commands.recv(), if commands_open => match command {
                        Some(FlowCommand::SkipReveal) => {
                            let rest = scheduler.skip_to_end().to_vec();
                            log::debug!("Run {} skipping {} units", self.run_id, rest.len());
                            for unit in rest {
                                self.emit(unit);
                            }
                            self.apply(PhaseEvent::RevealSkipped);
                            break;
                        }
                        Some(other) => log::debug!("Ignoring {:?} while revealing", other),
                        None => commands_open = false,
                    },
                    result = &mut wait => {
                        if result.is_err() {
                            return Err(Halt::Signalled);
                        }
                        break;
                    }
                }
            }
        }

        if self.token.is_cancelled() {
            return Err(Halt::Signalled);
        }

        if let Err(err) = self
            .deps
            .sink
            .record_result(self.run_id, &reviewed.output)
            .await
        {
            log::warn!("Run {}: {}", self.run_id, err);
        }
        self.apply(PhaseEvent::RevealFinished(reviewed.output));
        Ok(())
    }

    async fn await_dismissal(&mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                FlowCommand::Dismiss(_) => {
                    log::info!(
                        target: CRISIS_LOG_TARGET,
                        "Run {} crisis interrupt acknowledged",
                        self.run_id
                    );
                    self.apply(PhaseEvent::Dismiss);
                    return;
                }
                other => log::debug!("Ignoring {:?} while interrupted", other),
            }
        }
        log::warn!(
            target: CRISIS_LOG_TARGET,
            "Run {} dropped with a pending crisis interrupt",
            self.run_id
        );
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn spawn_watchdog(&self) -> Option<JoinHandle<()>> {
        let timeout = self.config.timeout?;
        let remaining =
            timeout.saturating_sub(self.deps.clock.now().saturating_duration_since(self.started));
        let sleeper = Arc::clone(&self.deps.sleeper);
        let guard = self.watchdog_guard.clone();
        let run_token = self.token.clone();
        let timed_out = Arc::clone(&self.timed_out);
        let run_id = self.run_id;

        Some(tokio::spawn(async move {
            if sleeper.delay(remaining, &guard).await.is_ok() && !run_token.is_cancelled() {
                log::warn!("Run {} timed out after {:?}", run_id, timeout);
                timed_out.store(true, Ordering::SeqCst);
                run_token.cancel();
            }
        }))
    }

    /// Apply a transition and publish the snapshot.
    fn apply(&mut self, event: PhaseEvent) {
        match self.machine.apply(event) {
            Ok(phase) => {
                let snapshot = PhaseSnapshot::new(self.run_id, phase.clone(), self.calls);
                self.phase_tx.send_replace(snapshot);
            }
            Err(err) => log::error!("Run {}: {}", self.run_id, err),
        }
    }

    fn emit(&mut self, unit: RevealUnit) {
        // The handle may have been dropped; the run still completes.
        let _ = self.units_tx.send(unit.clone());
        self.revealed.push(unit);
    }

    async fn record_attempt(&mut self, attempt: GenerationAttempt) {
        if let Err(err) = self.deps.sink.record_attempt(&attempt).await {
            log::warn!("Run {}: {}", self.run_id, err);
        }
        self.attempts.push(attempt);
    }

    async fn note_failure(&self, error: &GenerationError) {
        let Some(breaker) = &self.deps.breaker else {
            return;
        };
        if error.is_transient() {
            breaker.record_failure().await;
        } else {
            breaker.release_trial().await;
        }
    }

    async fn breaker_release(&self) {
        if let Some(breaker) = &self.deps.breaker {
            breaker.release_trial().await;
        }
    }

    fn finish(self) -> RunOutcome {
        let phase = self.machine.state().clone();
        match &phase {
            PhaseState::Completed { .. } => {
                log::info!("Run {} completed", self.run_id)
            }
            PhaseState::Failed { error } => log::warn!("Run {} failed: {}", self.run_id, error),
            other => log::info!("Run {} ended in {}", self.run_id, other.name()),
        }

        RunOutcome {
            run_id: self.run_id,
            phase,
            history: self.machine.into_history(),
            attempts: self.attempts,
            units: self.revealed,
            elapsed: self.deps.clock.now().saturating_duration_since(self.started),
        }
    }
}

/// Await `work` unless the token fires first.
async fn guarded<T>(
    token: &CancellationToken,
    work: impl std::future::Future<Output = T>,
) -> Step<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Halt::Signalled),
        value = work => Ok(value),
    }
}
