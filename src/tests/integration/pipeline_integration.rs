//! Pipeline Integration Tests
//!
//! Whole runs on a paused tokio clock: backoff timing, cancellation
//! reaching the generator, the watchdog, reveal control, keyword
//! moderation at both stages and crisis interrupts across replaced runs.

use std::sync::Arc;
use std::time::Duration;

use crate::core::flow::safety::CRISIS_OUTPUT_REASON;
use crate::core::flow::{
    AttemptOutcome, CancellationToken, CrisisAcknowledgment, FlowError, FlowInput,
    GenerationError, GenerationOutput, HandleError, ModerationStage, OperationalError,
    PhaseState, PolicyError, RestartPolicy, TokioSleeper,
};
use crate::tests::common::*;
use crate::tests::mocks::{
    FailingSink, GatedModerator, RecordingSink, RecordingSleeper, ScriptedGenerator,
    StageModerator,
};

fn never_completed(history: &[PhaseState]) -> bool {
    !history
        .iter()
        .any(|phase| matches!(phase, PhaseState::Completed { .. }))
}

// ============================================================================
// Retry Timing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_between_attempts() {
    let generator = Arc::new(
        ScriptedGenerator::new(SAMPLE_OUTPUT)
            .then(Err(GenerationError::timeout()))
            .then(Err(GenerationError::from_status(503, "unavailable"))),
    );
    let sleeper = Arc::new(RecordingSleeper::default());
    let sink = Arc::new(RecordingSink::default());
    let mut pipeline = quick_pipeline(generator.clone())
        .with_sleeper(sleeper.clone())
        .with_sink(sink.clone());

    let outcome = pipeline
        .start(FlowInput::new(SAMPLE_INPUT))
        .unwrap()
        .wait()
        .await;

    assert!(outcome.is_completed());
    assert_eq!(generator.calls(), 3);

    let delays = sleeper.delays();
    assert_eq!(
        &delays[..2],
        &[Duration::from_secs(1), Duration::from_secs(2)]
    );
    // The rest are reveal pauses
    assert!(delays[2..].iter().all(|d| *d < Duration::from_secs(1)));
    assert!(outcome.elapsed >= Duration::from_secs(3));

    let recorded: Vec<AttemptOutcome> = sink.attempts().iter().map(|a| a.outcome).collect();
    assert_eq!(
        recorded,
        vec![
            AttemptOutcome::TransientFailure,
            AttemptOutcome::TransientFailure,
            AttemptOutcome::Success,
        ]
    );
    assert_eq!(sink.results().len(), 1);
    assert_eq!(sink.results()[0].0, outcome.run_id);
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_before_next_attempt_phase() {
    let generator = Arc::new(
        ScriptedGenerator::new(SAMPLE_OUTPUT).then(Err(GenerationError::rate_limited())),
    );
    let mut pipeline = quick_pipeline(generator);
    let start = tokio::time::Instant::now();
    let handle = pipeline.start(FlowInput::new(SAMPLE_INPUT)).unwrap();

    wait_for_phase(&handle, |p| *p == PhaseState::Generating { attempt: 2 }).await;
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(handle.wait().await.is_completed());
}

// ============================================================================
// Cancellation and Watchdog
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_signals_in_flight_generator() {
    let generator = Arc::new(
        ScriptedGenerator::new(SAMPLE_OUTPUT).with_latency(Duration::from_secs(30)),
    );
    let mut pipeline = quick_pipeline(generator.clone());
    let handle = pipeline.start(FlowInput::new(SAMPLE_INPUT)).unwrap();

    wait_for_phase(&handle, |p| matches!(p, PhaseState::Generating { .. })).await;
    handle.cancel().unwrap();
    let outcome = handle.wait().await;

    assert_eq!(outcome.phase, PhaseState::Cancelled);
    assert!(outcome.elapsed < Duration::from_secs(1));
    assert!(outcome.units.is_empty());
    let signal = generator.last_signal().expect("generator was called");
    assert!(signal.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_stops_slow_generator() {
    let generator = Arc::new(
        ScriptedGenerator::new(SAMPLE_OUTPUT).with_latency(Duration::from_secs(30)),
    );
    let mut pipeline = pipeline_with(
        quick_config().with_timeout(Some(Duration::from_secs(5))),
        generator.clone(),
        Arc::new(StageModerator::clean()),
    );

    let outcome = pipeline
        .start(FlowInput::new(SAMPLE_INPUT))
        .unwrap()
        .wait()
        .await;

    assert_eq!(
        outcome.phase.error(),
        Some(&FlowError::Operational(OperationalError::TimedOut {
            after: Duration::from_secs(5)
        }))
    );
    assert_eq!(generator.calls(), 1);
    assert!(outcome.elapsed >= Duration::from_secs(5));
    assert!(outcome.elapsed < Duration::from_secs(6));
    assert!(generator.last_signal().unwrap().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_post_check_commits_nothing() {
    let generator = Arc::new(ScriptedGenerator::new(SAMPLE_OUTPUT));
    let sink = Arc::new(RecordingSink::default());
    let moderator = StageModerator::clean().with_post_latency(Duration::from_secs(30));
    let mut pipeline =
        pipeline_with(quick_config(), generator, Arc::new(moderator)).with_sink(sink.clone());
    let handle = pipeline.start(FlowInput::new(SAMPLE_INPUT)).unwrap();

    wait_for_phase(&handle, |p| {
        *p == PhaseState::Moderating {
            stage: ModerationStage::Post,
        }
    })
    .await;
    // The returned call is counted while its output is under review
    assert_eq!(handle.snapshot().attempts, 1);

    handle.cancel().unwrap();
    let outcome = handle.wait().await;

    assert_eq!(outcome.phase, PhaseState::Cancelled);
    assert!(outcome.elapsed < Duration::from_secs(1));
    assert!(outcome.units.is_empty());
    assert!(never_completed(&outcome.history));
    assert!(sink.results().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_reveal_commits_nothing() {
    let generator = Arc::new(ScriptedGenerator::new(SAMPLE_OUTPUT));
    let sink = Arc::new(RecordingSink::default());
    let mut pipeline = quick_pipeline(generator).with_sink(sink.clone());
    let handle = pipeline.start(FlowInput::new(SAMPLE_INPUT)).unwrap();

    wait_for_phase(&handle, |p| {
        matches!(p, PhaseState::Revealing { revealed, .. } if *revealed >= 2)
    })
    .await;
    handle.cancel().unwrap();
    let outcome = handle.wait().await;

    assert_eq!(outcome.phase, PhaseState::Cancelled);
    assert!(outcome.units.len() >= 2);
    assert!(outcome.units.len() < SAMPLE_WORDS);
    assert!(never_completed(&outcome.history));
    assert!(sink.results().is_empty());
}

// ============================================================================
// Reveal Control
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_reveal_is_idempotent() {
    let generator = Arc::new(ScriptedGenerator::new(SAMPLE_OUTPUT));
    let mut config = quick_config();
    config.reveal.unit_delay = Duration::from_secs(1);
    config.reveal.pause_delay = Duration::from_secs(2);
    let mut pipeline = pipeline_with(
        config,
        generator,
        Arc::new(StageModerator::clean()),
    );
    let handle = pipeline.start(FlowInput::new(SAMPLE_INPUT)).unwrap();

    wait_for_phase(&handle, |p| {
        matches!(p, PhaseState::Revealing { revealed, .. } if *revealed >= 1)
    })
    .await;
    handle.skip_reveal().unwrap();
    handle.skip_reveal().unwrap();

    wait_for_phase(&handle, PhaseState::is_terminal).await;
    assert_eq!(handle.skip_reveal(), Err(HandleError::NotRevealing));

    let outcome = handle.wait().await;
    assert!(outcome.is_completed());
    assert_eq!(outcome.units.len(), SAMPLE_WORDS);
    for (i, unit) in outcome.units.iter().enumerate() {
        assert_eq!(unit.index, i);
    }
    let text: String = outcome.units.iter().map(|u| u.text.as_str()).collect();
    assert_eq!(text, SAMPLE_OUTPUT);
    assert!(outcome.elapsed < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_units_stream_through_handle() {
    let generator = Arc::new(ScriptedGenerator::new(SAMPLE_OUTPUT));
    let mut pipeline = quick_pipeline(generator);
    let mut handle = pipeline.start(FlowInput::new(SAMPLE_INPUT)).unwrap();

    let mut units = Vec::new();
    while let Some(unit) = handle.next_unit().await {
        units.push(unit);
    }

    assert_eq!(units.len(), SAMPLE_WORDS);
    assert!(units.windows(2).all(|w| w[0].index + 1 == w[1].index));
    assert!(handle.wait().await.is_completed());
}

#[tokio::test(start_paused = true)]
async fn test_replay_reveal_reuses_stored_result() {
    let generator = Arc::new(ScriptedGenerator::new(SAMPLE_OUTPUT));
    let mut pipeline = quick_pipeline(generator.clone());
    let handle = pipeline.start(FlowInput::new(SAMPLE_INPUT)).unwrap();
    wait_for_phase(&handle, PhaseState::is_terminal).await;

    let mut replay = handle
        .replay_reveal(CancellationToken::new())
        .expect("completed run can replay");
    assert_eq!(replay.total(), SAMPLE_WORDS);

    let mut text = String::new();
    while let Some(unit) = replay.next(&TokioSleeper).await {
        text.push_str(&unit.text);
    }
    assert_eq!(text, SAMPLE_OUTPUT);
    assert_eq!(generator.calls(), 1);

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let mut stopped = handle.replay_reveal(cancelled).unwrap();
    assert!(stopped.advance().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_replay_unavailable_without_result() {
    let generator = Arc::new(ScriptedGenerator::failing(GenerationError::permanent(
        "model refused",
    )));
    let mut pipeline = quick_pipeline(generator);
    let handle = pipeline.start(FlowInput::new(SAMPLE_INPUT)).unwrap();
    wait_for_phase(&handle, PhaseState::is_terminal).await;

    assert!(handle.replay_reveal(CancellationToken::new()).is_none());
}

// ============================================================================
// Sinks
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failing_sink_is_ignored() {
    let generator = Arc::new(ScriptedGenerator::new(SAMPLE_OUTPUT));
    let mut pipeline = quick_pipeline(generator).with_sink(Arc::new(FailingSink));

    let outcome = pipeline
        .start(FlowInput::new(SAMPLE_INPUT))
        .unwrap()
        .wait()
        .await;
    assert!(outcome.is_completed());
}

// ============================================================================
// Keyword Moderation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_crisis_input_never_generates() {
    let generator = Arc::new(ScriptedGenerator::new(SAMPLE_OUTPUT));
    let mut pipeline = keyword_pipeline(generator.clone());
    let handle = pipeline
        .start(FlowInput::new("Some nights I just want to die"))
        .unwrap();

    let phase = wait_for_phase(&handle, PhaseState::is_interrupted).await;
    assert!(phase.is_interrupted());
    assert_eq!(generator.calls(), 0);

    handle
        .dismiss_crisis_interrupt(CrisisAcknowledgment::confirmed_by_user())
        .await
        .unwrap();
    assert_eq!(handle.wait().await.phase, PhaseState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_cited_violence_is_revealed() {
    let text = "Saul was told to slay the Amalekites (1 Samuel 15:3).";
    let generator = Arc::new(ScriptedGenerator::new(text));
    let mut pipeline = keyword_pipeline(generator);

    let outcome = pipeline
        .start(FlowInput::new("What happened with Saul?"))
        .unwrap()
        .wait()
        .await;

    assert_eq!(outcome.output(), Some(&GenerationOutput::new(text)));
}

#[tokio::test(start_paused = true)]
async fn test_uncited_violence_is_withheld() {
    let generator = Arc::new(ScriptedGenerator::new("Go and slay them all."));
    let mut pipeline = keyword_pipeline(generator);

    let outcome = pipeline
        .start(FlowInput::new("What should I do?"))
        .unwrap()
        .wait()
        .await;

    assert_eq!(
        outcome.phase.error(),
        Some(&FlowError::Policy(PolicyError::UnsafeOutput {
            reason: "violence".to_string()
        }))
    );
    assert!(outcome.units.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_crisis_output_is_withheld() {
    let generator = Arc::new(ScriptedGenerator::new("Maybe you are better off dead."));
    let mut pipeline = keyword_pipeline(generator);

    let outcome = pipeline
        .start(FlowInput::new("Why do I feel so tired?"))
        .unwrap()
        .wait()
        .await;

    assert_eq!(
        outcome.phase.error(),
        Some(&FlowError::Policy(PolicyError::UnsafeOutput {
            reason: CRISIS_OUTPUT_REASON.to_string()
        }))
    );
    assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::CrisisFlagged);
}

// ============================================================================
// Crisis Interrupts Across Runs
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_crisis_on_replaced_run_still_blocks_pipeline() {
    let generator = Arc::new(ScriptedGenerator::new(SAMPLE_OUTPUT));
    let moderator = Arc::new(GatedModerator::new("end my life"));
    let mut pipeline = pipeline_with(
        quick_config().with_restart_policy(RestartPolicy::CancelAndRestart),
        generator.clone(),
        moderator.clone(),
    );

    let first = pipeline
        .start(FlowInput::new("I want to end my life"))
        .unwrap();
    moderator.entered.notified().await;

    // Replace the first run while its crisis verdict is on the way
    let second = pipeline.start(FlowInput::new(SAMPLE_INPUT)).unwrap();
    moderator.release.notify_one();

    let phase = wait_for_phase(&first, PhaseState::is_interrupted).await;
    assert!(phase.is_interrupted());
    assert!(pipeline.phase().is_interrupted());
    assert_eq!(
        pipeline.start(FlowInput::new(SAMPLE_INPUT)).unwrap_err(),
        FlowError::Policy(PolicyError::CrisisDetected)
    );
    assert_eq!(pipeline.reset(), Err(HandleError::AcknowledgmentRequired));

    pipeline
        .dismiss_crisis_interrupt(CrisisAcknowledgment::confirmed_by_user())
        .await
        .unwrap();
    assert_eq!(first.wait().await.phase, PhaseState::Idle);
    assert!(second.wait().await.is_completed());
    assert_eq!(generator.calls(), 1);
}
