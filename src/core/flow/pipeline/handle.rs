//! Caller-side handle to one run.

use futures::{future, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use uuid::Uuid;

use super::types::{CrisisAcknowledgment, FlowCommand, PhaseSnapshot, RunOutcome};
use crate::core::flow::cancel::CancellationToken;
use crate::core::flow::error::HandleError;
use crate::core::flow::phase::PhaseState;
use crate::core::flow::reveal::{RevealConfig, RevealScheduler, RevealUnit};

/// Handle returned by `GenerationPipeline::start`.
///
/// Dropping the handle does not stop the run; use [`FlowHandle::cancel`].
#[derive(Debug)]
pub struct FlowHandle {
    run_id: Uuid,
    phase_rx: watch::Receiver<PhaseSnapshot>,
    commands: mpsc::UnboundedSender<FlowCommand>,
    units: mpsc::UnboundedReceiver<RevealUnit>,
    token: CancellationToken,
    task: JoinHandle<RunOutcome>,
    reveal: RevealConfig,
}

impl FlowHandle {
    pub(crate) fn new(
        run_id: Uuid,
        phase_rx: watch::Receiver<PhaseSnapshot>,
        commands: mpsc::UnboundedSender<FlowCommand>,
        units: mpsc::UnboundedReceiver<RevealUnit>,
        token: CancellationToken,
        task: JoinHandle<RunOutcome>,
        reveal: RevealConfig,
    ) -> Self {
        Self {
            run_id,
            phase_rx,
            commands,
            units,
            token,
            task,
            reveal,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn snapshot(&self) -> PhaseSnapshot {
        self.phase_rx.borrow().clone()
    }

    pub fn phase(&self) -> PhaseState {
        self.phase_rx.borrow().phase.clone()
    }

    /// Stream of phase snapshots: the current one, then each change, ending
    /// after a terminal phase (or Idle, once a crisis interrupt is dismissed).
    ///
    /// Each call starts an independent subscription. Rapid transitions may be
    /// coalesced; the final snapshot is always delivered.
    pub fn observe(&self) -> impl Stream<Item = PhaseSnapshot> + Send + 'static {
        WatchStream::new(self.phase_rx.clone()).scan(false, |finished, snapshot| {
            if *finished {
                return future::ready(None);
            }
            *finished = snapshot.is_final();
            future::ready(Some(snapshot))
        })
    }

    /// Signal cancellation. The run settles in `Cancelled` shortly after.
    pub fn cancel(&self) -> Result<(), HandleError> {
        let phase = self.phase();
        if phase.is_interrupted() {
            return Err(HandleError::AcknowledgmentRequired);
        }
        if !phase.is_active() {
            return Err(HandleError::Finished);
        }
        log::info!("Cancelling run {}", self.run_id);
        self.token.cancel();
        Ok(())
    }

    /// Clear a pending crisis interrupt. Resolves once the run is back in Idle.
    pub async fn dismiss_crisis_interrupt(
        &self,
        ack: CrisisAcknowledgment,
    ) -> Result<(), HandleError> {
        send_dismiss(&self.commands, self.phase_rx.clone(), ack).await
    }

    /// Reveal every remaining unit at once. Idempotent.
    pub fn skip_reveal(&self) -> Result<(), HandleError> {
        match self.phase() {
            PhaseState::Revealing { revealed, total } if revealed >= total => Ok(()),
            PhaseState::Revealing { .. } => self
                .commands
                .send(FlowCommand::SkipReveal)
                .map_err(|_| HandleError::Finished),
            _ => Err(HandleError::NotRevealing),
        }
    }

    /// Next revealed unit, in order. `None` once the run has ended.
    pub async fn next_unit(&mut self) -> Option<RevealUnit> {
        self.units.recv().await
    }

    /// A fresh reveal over the completed result, without regenerating.
    pub fn replay_reveal(&self, signal: CancellationToken) -> Option<RevealScheduler> {
        let snapshot = self.phase_rx.borrow();
        let output = snapshot.phase.output()?;
        Some(RevealScheduler::from_text(&output.text, &self.reveal, signal))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run task to end.
    pub async fn wait(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => {
                log::warn!("Run {} task aborted: {}", self.run_id, err);
                let phase = self.phase_rx.borrow().phase.clone();
                RunOutcome {
                    run_id: self.run_id,
                    phase,
                    history: Vec::new(),
                    attempts: Vec::new(),
                    units: Vec::new(),
                    elapsed: Duration::ZERO,
                }
            }
        }
    }
}

/// Send a dismissal to a run and wait until it leaves `Interrupted`.
pub(super) async fn send_dismiss(
    commands: &mpsc::UnboundedSender<FlowCommand>,
    mut phase_rx: watch::Receiver<PhaseSnapshot>,
    ack: CrisisAcknowledgment,
) -> Result<(), HandleError> {
    if !phase_rx.borrow().phase.is_interrupted() {
        return Err(HandleError::NotInterrupted);
    }
    commands
        .send(FlowCommand::Dismiss(ack))
        .map_err(|_| HandleError::Finished)?;

    phase_rx
        .wait_for(|snapshot| !snapshot.phase.is_interrupted())
        .await
        .map_err(|_| HandleError::Finished)?;
    Ok(())
}
