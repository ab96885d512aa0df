//! Flow Input and Validation
//!
//! The submitted text plus its context tags, and the length gate every run
//! passes before moderation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::ValidationError;

pub const DEFAULT_MIN_LEN: usize = 2;
pub const DEFAULT_MAX_LEN: usize = 500;

// ============================================================================
// Flow Input
// ============================================================================

/// User-submitted content for one run. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowInput {
    text: String,
    /// Context tags such as `category = "gratitude"` or `thread = "<id>"`
    tags: BTreeMap<String, String>,
}

impl FlowInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Length in characters of the trimmed text.
    pub fn char_len(&self) -> usize {
        self.text.trim().chars().count()
    }
}

// ============================================================================
// Input Validator
// ============================================================================

/// Length bounds applied to every input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputValidator {
    min_len: usize,
    max_len: usize,
}

impl InputValidator {
    /// Create a validator; `max_len` is raised to at least 1 and to `min_len`.
    pub fn new(min_len: usize, max_len: usize) -> Self {
        let max_len = max_len.max(1).max(min_len);
        Self { min_len, max_len }
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn validate(&self, input: &FlowInput) -> Result<(), ValidationError> {
        let actual = input.char_len();

        if actual == 0 {
            return Err(ValidationError::Empty);
        }

        if actual < self.min_len {
            return Err(ValidationError::TooShort {
                min: self.min_len,
                actual,
            });
        }

        if actual > self.max_len {
            return Err(ValidationError::TooLong {
                max: self.max_len,
                actual,
            });
        }

        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LEN, DEFAULT_MAX_LEN)
    }
}
