//! Test Fixtures
//!
//! Pipelines wired with fast reveal pacing and the hand-written mocks.

#![allow(dead_code)]

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::flow::{
    FlowHandle, GenerationPipeline, KeywordModerator, Moderator, PhaseState, PipelineConfig,
    RevealConfig, RevealGranularity,
};
use crate::tests::mocks::{ScriptedGenerator, StageModerator};

pub const SAMPLE_INPUT: &str = "A prayer for patience at work";

pub const SAMPLE_OUTPUT: &str =
    "Give me patience for this day. Let my words be kind and true.";

/// Word units in [`SAMPLE_OUTPUT`].
pub const SAMPLE_WORDS: usize = 13;

/// No floor, no watchdog, 10ms between units.
pub fn quick_config() -> PipelineConfig {
    PipelineConfig::default().with_reveal(RevealConfig {
        granularity: RevealGranularity::Word,
        unit_delay: Duration::from_millis(10),
        pause_delay: Duration::from_millis(20),
    })
}

pub fn pipeline_with(
    config: PipelineConfig,
    generator: Arc<ScriptedGenerator>,
    moderator: Arc<dyn Moderator>,
) -> GenerationPipeline {
    GenerationPipeline::new(config, generator, moderator)
}

/// Quick pipeline with a clean moderator.
pub fn quick_pipeline(generator: Arc<ScriptedGenerator>) -> GenerationPipeline {
    pipeline_with(quick_config(), generator, Arc::new(StageModerator::clean()))
}

/// Quick pipeline moderated by the keyword moderator.
pub fn keyword_pipeline(generator: Arc<ScriptedGenerator>) -> GenerationPipeline {
    pipeline_with(quick_config(), generator, Arc::new(KeywordModerator::new()))
}

/// Wait until the run reaches a phase matching `predicate`, or its
/// phase stream ends. Returns the phase it stopped on.
pub async fn wait_for_phase(
    handle: &FlowHandle,
    predicate: impl Fn(&PhaseState) -> bool,
) -> PhaseState {
    let mut snapshots = Box::pin(
        handle
            .observe()
            .skip_while(move |s| futures::future::ready(!predicate(&s.phase))),
    );
    match snapshots.next().await {
        Some(snapshot) => snapshot.phase,
        None => handle.phase(),
    }
}
