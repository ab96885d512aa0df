//! Keyword Moderator
//!
//! Local, pattern-based [`Moderator`] used by the CLI driver and as a
//! fallback when no remote moderation service is configured.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::safety::{ExemptionReason, FlagCategory, ModerationStage, Moderator, Verdict};

// ============================================================================
// Patterns
// ============================================================================

static CRISIS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:kill|hurt|harm|cut)\s+myself\b",
        r"(?i)\bend(?:ing)?\s+(?:my\s+life|it\s+all)\b",
        r"(?i)\bsuicid(?:e|al)\b",
        r"(?i)\b(?:want|wish|going)\s+to\s+die\b",
        r"(?i)\bno\s+reason\s+to\s+live\b",
        r"(?i)\bself[-\s]?harm\b",
        r"(?i)\bbetter\s+off\s+(?:dead|without\s+me)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static POLICY_PATTERNS: Lazy<Vec<(FlagCategory, Regex)>> = Lazy::new(|| {
    vec![
        (
            FlagCategory::Violence,
            Regex::new(r"(?i)\b(?:kill|murder|slaughter|slay|massacre|behead)(?:s|ed|ing)?\b")
                .unwrap(),
        ),
        (
            FlagCategory::Hate,
            Regex::new(r"(?i)\b(?:subhuman|vermin|inferior\s+race)\b").unwrap(),
        ),
        (
            FlagCategory::Harassment,
            Regex::new(r"(?i)\b(?:shut\s+up|you(?:'re|\s+are)\s+(?:an?\s+)?(?:idiot|moron|loser))\b")
                .unwrap(),
        ),
        (
            FlagCategory::Sexual,
            Regex::new(r"(?i)\b(?:porn(?:ography)?|sexually\s+explicit|nude\s+photos?)\b")
                .unwrap(),
        ),
    ]
});

/// Book chapter:verse references such as `John 3:16`, `1 Samuel 15:3` or
/// `Ps. 23:1-4`.
static CITATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[1-3]\s?)?[A-Z][a-z]+\.?\s+\d{1,3}:\d{1,3}(?:\s?[-–]\s?\d{1,3})?\b")
        .unwrap()
});

/// True if `content` contains at least one source citation.
pub fn cites_source(content: &str) -> bool {
    CITATION_PATTERN.is_match(content)
}

// ============================================================================
// Keyword Moderator
// ============================================================================

#[derive(Debug, Clone)]
pub struct KeywordModerator {
    citation_exemption: bool,
    /// Additional lowercase terms, matched by substring
    extra_terms: Vec<(FlagCategory, String)>,
}

impl Default for KeywordModerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordModerator {
    pub fn new() -> Self {
        Self {
            citation_exemption: true,
            extra_terms: Vec::new(),
        }
    }

    /// Flag cited material like anything else.
    pub fn without_citation_exemption(mut self) -> Self {
        self.citation_exemption = false;
        self
    }

    pub fn with_term(mut self, category: FlagCategory, term: impl Into<String>) -> Self {
        self.extra_terms.push((category, term.into().to_lowercase()));
        self
    }

    /// Classify `content`. Same rules at both stages.
    pub fn classify(&self, content: &str) -> Verdict {
        if CRISIS_PATTERNS.iter().any(|re| re.is_match(content)) {
            return Verdict::CrisisFlagged;
        }

        let lower = content.to_lowercase();
        let mut categories: Vec<FlagCategory> = Vec::new();
        let matches = POLICY_PATTERNS
            .iter()
            .filter(|(_, re)| re.is_match(content))
            .map(|(category, _)| category)
            .chain(
                self.extra_terms
                    .iter()
                    .filter(|(_, term)| lower.contains(term.as_str()))
                    .map(|(category, _)| category),
            );
        for category in matches {
            if !categories.contains(category) {
                categories.push(category.clone());
            }
        }

        if categories.is_empty() {
            return Verdict::Clean;
        }
        if categories.iter().any(FlagCategory::is_crisis_class) {
            return Verdict::CrisisFlagged;
        }
        if self.citation_exemption && cites_source(content) {
            return Verdict::exempt(ExemptionReason::CitesSourceMaterial, categories);
        }
        Verdict::policy(categories)
    }
}

#[async_trait]
impl Moderator for KeywordModerator {
    async fn check(&self, content: &str, stage: ModerationStage) -> Verdict {
        let verdict = self.classify(content);
        if verdict != Verdict::Clean {
            log::debug!("{} moderation flagged content: {:?}", stage, verdict);
        }
        verdict
    }
}
