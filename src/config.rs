use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::flow::{
    CircuitBreakerConfig, Experience, InputValidator, KeywordModerator, PipelineConfig,
    RestartPolicy, RetryPolicy, RevealGranularity, SharedCircuitBreaker,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub prayer: FlowSettings,
    pub sermon: FlowSettings,
    pub ask: FlowSettings,
    pub circuit: CircuitSettings,
    pub moderation: ModerationSettings,
}

/// Per-experience overrides. Unset fields keep the experience preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    /// Minimum visible duration before the reveal starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_visible_ms: Option<u64>,
    /// Watchdog timeout; 0 disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<RevealGranularity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_delay_ms: Option<u64>,
}

/// Shared circuit breaker; disabled by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub open_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    /// Let flagged text through when it cites source material.
    pub citation_exemption: bool,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            enabled: false,
            failure_threshold: defaults.failure_threshold,
            open_duration_ms: defaults.open_duration.as_millis() as u64,
        }
    }
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            citation_exemption: true,
        }
    }
}

impl FlowSettings {
    /// Apply these overrides on top of the experience preset.
    pub fn apply(&self, experience: Experience) -> PipelineConfig {
        let mut config = experience.pipeline_config();

        if self.min_len.is_some() || self.max_len.is_some() {
            config.validator = InputValidator::new(
                self.min_len.unwrap_or(config.validator.min_len()),
                self.max_len.unwrap_or(config.validator.max_len()),
            );
        }

        if let Some(ms) = self.min_visible_ms {
            config.min_visible_duration = Duration::from_millis(ms);
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        if self.max_attempts.is_some() || self.base_delay_ms.is_some() {
            config.retry = RetryPolicy::new(
                self.base_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(config.retry.base_delay()),
                self.max_attempts.unwrap_or(config.retry.max_attempts()),
            );
        }
        if let Some(ms) = self.max_delay_ms {
            config.retry = config.retry.with_max_delay(Duration::from_millis(ms));
        }

        if let Some(policy) = self.restart_policy {
            config.restart_policy = policy;
        }
        if let Some(granularity) = self.granularity {
            config.reveal.granularity = granularity;
        }
        if let Some(ms) = self.unit_delay_ms {
            config.reveal.unit_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.pause_delay_ms {
            config.reveal.pause_delay = Duration::from_millis(ms);
        }

        config
    }
}

impl AppConfig {
    /// Load configuration from `~/.config/genflow/config.toml`.
    /// Returns `Default` if the file is missing or unparseable.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match Self::load_from(&config_path) {
            Ok(config) => {
                log::info!("Loaded config from {}", config_path.display());
                config
            }
            Err(ConfigError::Io(_)) => {
                log::debug!(
                    "No config file at {} - using defaults",
                    config_path.display()
                );
                Self::default()
            }
            Err(e) => {
                log::warn!("{} at {} - using defaults", e, config_path.display());
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn settings(&self, experience: Experience) -> &FlowSettings {
        match experience {
            Experience::Prayer => &self.prayer,
            Experience::Sermon => &self.sermon,
            Experience::Ask => &self.ask,
        }
    }

    pub fn pipeline_config(&self, experience: Experience) -> PipelineConfig {
        self.settings(experience).apply(experience)
    }

    pub fn circuit_breaker(&self) -> Option<SharedCircuitBreaker> {
        self.circuit.enabled.then(|| {
            SharedCircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: self.circuit.failure_threshold,
                open_duration: Duration::from_millis(self.circuit.open_duration_ms),
            })
        })
    }

    pub fn moderator(&self) -> KeywordModerator {
        if self.moderation.citation_exemption {
            KeywordModerator::new()
        } else {
            KeywordModerator::new().without_citation_exemption()
        }
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("genflow").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
