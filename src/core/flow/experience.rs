//! Experience Presets
//!
//! The three flows built on the pipeline differ only in configuration:
//! short prayers with a calm visible floor, long sermon transcripts with a
//! generous watchdog, and chat answers revealed in chunks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use super::input::InputValidator;
use super::pipeline::{PipelineConfig, RestartPolicy};
use super::retry::RetryPolicy;
use super::reveal::{RevealConfig, RevealGranularity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Experience {
    Prayer,
    Sermon,
    Ask,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown experience '{0}' (expected prayer, sermon or ask)")]
pub struct UnknownExperience(pub String);

impl Experience {
    pub const ALL: [Experience; 3] = [Experience::Prayer, Experience::Sermon, Experience::Ask];

    pub fn name(&self) -> &'static str {
        match self {
            Experience::Prayer => "prayer",
            Experience::Sermon => "sermon",
            Experience::Ask => "ask",
        }
    }

    pub fn validator(&self) -> InputValidator {
        match self {
            Experience::Prayer => InputValidator::new(2, 500),
            Experience::Sermon => InputValidator::new(2, 200_000),
            Experience::Ask => InputValidator::new(2, 2_000),
        }
    }

    /// Shortest time before the first unit appears.
    pub fn min_visible_duration(&self) -> Duration {
        match self {
            Experience::Prayer => Duration::from_secs(2),
            Experience::Sermon | Experience::Ask => Duration::ZERO,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            Experience::Prayer | Experience::Ask => Duration::from_secs(120),
            Experience::Sermon => Duration::from_secs(30 * 60),
        }
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        match self {
            // A new chat question supersedes the one still being answered.
            Experience::Ask => RestartPolicy::CancelAndRestart,
            Experience::Prayer | Experience::Sermon => RestartPolicy::Reject,
        }
    }

    pub fn reveal(&self) -> RevealConfig {
        match self {
            Experience::Prayer => RevealConfig {
                granularity: RevealGranularity::Word,
                unit_delay: Duration::from_millis(80),
                pause_delay: Duration::from_millis(400),
            },
            Experience::Sermon => RevealConfig {
                granularity: RevealGranularity::Sentence,
                unit_delay: Duration::from_millis(250),
                pause_delay: Duration::from_millis(600),
            },
            Experience::Ask => RevealConfig {
                granularity: RevealGranularity::Chunk(4),
                unit_delay: Duration::from_millis(60),
                pause_delay: Duration::from_millis(250),
            },
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_validator(self.validator())
            .with_retry(RetryPolicy::default())
            .with_min_visible_duration(self.min_visible_duration())
            .with_timeout(Some(self.timeout()))
            .with_restart_policy(self.restart_policy())
            .with_reveal(self.reveal())
    }
}

impl fmt::Display for Experience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Experience {
    type Err = UnknownExperience;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prayer" | "pray" => Ok(Experience::Prayer),
            "sermon" => Ok(Experience::Sermon),
            "ask" | "chat" => Ok(Experience::Ask),
            other => Err(UnknownExperience(other.to_string())),
        }
    }
}
