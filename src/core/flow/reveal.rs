//! Progressive Reveal
//!
//! Splits a completed result into ordered units and releases them one at a
//! time, pausing longer after punctuation to follow natural reading pace.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::cancel::CancellationToken;
use super::clock::Sleeper;

/// A word plus the whitespace that follows it, so units concatenate back to
/// the source text.
static WORD_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+\s*").unwrap());

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealGranularity {
    Word,
    Sentence,
    /// Fixed number of words per unit
    Chunk(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealConfig {
    pub granularity: RevealGranularity,
    /// Delay after an ordinary unit
    pub unit_delay: Duration,
    /// Delay after a unit ending in punctuation
    pub pause_delay: Duration,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            granularity: RevealGranularity::Word,
            unit_delay: Duration::from_millis(80),
            pause_delay: Duration::from_millis(400),
        }
    }
}

/// Smallest chunk of output scheduled for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealUnit {
    pub index: usize,
    pub text: String,
    /// Pause after this unit before the next one appears
    pub delay: Duration,
}

/// True if `text` ends in punctuation, ignoring closing quotes and brackets.
pub fn ends_with_punctuation(text: &str) -> bool {
    text.trim_end()
        .trim_end_matches(['"', '\'', '\u{201D}', '\u{2019}', ')', ']'])
        .ends_with(['.', ',', ';', ':', '!', '?', '\u{2026}'])
}

fn is_sentence_end(text: &str) -> bool {
    text.trim_end()
        .trim_end_matches(['"', '\'', '\u{201D}', '\u{2019}', ')', ']'])
        .ends_with(['.', '!', '?', '\u{2026}'])
}

/// Split `text` into reveal units. Deterministic; concatenating the unit
/// texts yields `text` without its leading whitespace.
pub fn segment(text: &str, config: &RevealConfig) -> Vec<RevealUnit> {
    let words: Vec<&str> = WORD_TOKEN.find_iter(text).map(|m| m.as_str()).collect();

    let pieces: Vec<String> = match config.granularity {
        RevealGranularity::Word => words.iter().map(|w| w.to_string()).collect(),
        RevealGranularity::Chunk(size) => words
            .chunks(size.max(1))
            .map(|chunk| chunk.concat())
            .collect(),
        RevealGranularity::Sentence => {
            let mut sentences = Vec::new();
            let mut current = String::new();
            for word in words {
                current.push_str(word);
                if is_sentence_end(word) {
                    sentences.push(std::mem::take(&mut current));
                }
            }
            if !current.is_empty() {
                sentences.push(current);
            }
            sentences
        }
    };

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let delay = if ends_with_punctuation(&text) {
                config.pause_delay
            } else {
                config.unit_delay
            };
            RevealUnit { index, text, delay }
        })
        .collect()
}

// ============================================================================
// Reveal Scheduler
// ============================================================================

/// Cursor over a fixed unit sequence.
///
/// Units are released strictly in order and never twice. The sequence is
/// shared, so restarting a reveal over a stored result costs no copy.
#[derive(Debug, Clone)]
pub struct RevealScheduler {
    units: Arc<[RevealUnit]>,
    cursor: usize,
    signal: CancellationToken,
}

impl RevealScheduler {
    pub fn new(units: Vec<RevealUnit>, signal: CancellationToken) -> Self {
        Self {
            units: Arc::from(units),
            cursor: 0,
            signal,
        }
    }

    pub fn from_text(text: &str, config: &RevealConfig, signal: CancellationToken) -> Self {
        Self::new(segment(text, config), signal)
    }

    pub fn total(&self) -> usize {
        self.units.len()
    }

    pub fn revealed_count(&self) -> usize {
        self.cursor
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.units.len()
    }

    pub fn units(&self) -> &[RevealUnit] {
        &self.units
    }

    pub fn revealed(&self) -> &[RevealUnit] {
        &self.units[..self.cursor]
    }

    pub fn revealed_text(&self) -> String {
        self.revealed().iter().map(|u| u.text.as_str()).collect()
    }

    /// Release the next unit without waiting. `None` once finished or cancelled.
    pub fn advance(&mut self) -> Option<RevealUnit> {
        if self.signal.is_cancelled() || self.is_complete() {
            return None;
        }
        let unit = self.units[self.cursor].clone();
        self.cursor += 1;
        Some(unit)
    }

    /// Wait out the previous unit's delay, then release the next unit.
    pub async fn next(&mut self, sleeper: &dyn Sleeper) -> Option<RevealUnit> {
        if self.is_complete() {
            return None;
        }
        if self.cursor > 0 {
            let pause = self.units[self.cursor - 1].delay;
            sleeper.delay(pause, &self.signal).await.ok()?;
        }
        self.advance()
    }

    /// Mark every remaining unit revealed and return the ones this call
    /// released. Calling it again returns an empty slice.
    pub fn skip_to_end(&mut self) -> &[RevealUnit] {
        let from = self.cursor;
        self.cursor = self.units.len();
        &self.units[from..]
    }

    /// A fresh reveal over the same units.
    pub fn restart(&self, signal: CancellationToken) -> Self {
        Self {
            units: Arc::clone(&self.units),
            cursor: 0,
            signal,
        }
    }
}
