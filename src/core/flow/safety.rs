//! Safety Interceptor
//!
//! Pre- and post-generation moderation gate. Crisis-class content is the one
//! flag no exemption can override, at either stage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::collaborators::GenerationOutput;
use super::error::PolicyError;
use super::input::FlowInput;

/// Log target for crisis events, kept apart from ordinary failures.
pub const CRISIS_LOG_TARGET: &str = "genflow::crisis";

/// Refusal reason attached to withheld crisis-class output.
pub const CRISIS_OUTPUT_REASON: &str = "crisis-class content";

// ============================================================================
// Verdicts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStage {
    Pre,
    Post,
}

impl fmt::Display for ModerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModerationStage::Pre => write!(f, "pre"),
            ModerationStage::Post => write!(f, "post"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagCategory {
    SelfHarm,
    Violence,
    Sexual,
    Hate,
    Harassment,
    Other(String),
}

impl FlagCategory {
    /// Self-harm risk is the only crisis class.
    pub fn is_crisis_class(&self) -> bool {
        matches!(self, FlagCategory::SelfHarm)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExemptionReason {
    /// Quotes or cites source material (e.g. scripture)
    CitesSourceMaterial,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    Clean,
    CrisisFlagged,
    PolicyFlagged {
        categories: Vec<FlagCategory>,
    },
    /// Flagged, but the moderator considers it legitimate
    ExemptFlagged {
        reason: ExemptionReason,
        categories: Vec<FlagCategory>,
    },
}

impl Verdict {
    pub fn policy(categories: Vec<FlagCategory>) -> Self {
        Verdict::PolicyFlagged { categories }
    }

    pub fn exempt(reason: ExemptionReason, categories: Vec<FlagCategory>) -> Self {
        Verdict::ExemptFlagged { reason, categories }
    }

    /// True if the verdict is, or carries, crisis-class content.
    pub fn is_crisis(&self) -> bool {
        match self {
            Verdict::CrisisFlagged => true,
            Verdict::PolicyFlagged { categories } | Verdict::ExemptFlagged { categories, .. } => {
                categories.iter().any(FlagCategory::is_crisis_class)
            }
            Verdict::Clean => false,
        }
    }

    /// Collapse any verdict carrying a crisis-class category into `CrisisFlagged`.
    pub fn normalized(self) -> Self {
        if self.is_crisis() {
            Verdict::CrisisFlagged
        } else {
            self
        }
    }
}

/// Moderation service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn check(&self, content: &str, stage: ModerationStage) -> Verdict;
}

// ============================================================================
// Crisis Support Payload
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportResource {
    pub name: &'static str,
    pub contact: &'static str,
    pub availability: &'static str,
}

const SUPPORT_MESSAGE: &str = "It sounds like you may be going through something really painful. \
You don't have to face it alone - please reach out to someone who can help right now.";

const SUPPORT_RESOURCES: &[SupportResource] = &[
    SupportResource {
        name: "988 Suicide & Crisis Lifeline",
        contact: "Call or text 988",
        availability: "24/7",
    },
    SupportResource {
        name: "Crisis Text Line",
        contact: "Text HOME to 741741",
        availability: "24/7",
    },
    SupportResource {
        name: "Emergency Services",
        contact: "Call 911 or your local emergency number",
        availability: "24/7",
    },
];

/// Fixed payload attached to a crisis interrupt.
///
/// Built only from compiled-in constants; nothing in a run can alter it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrisisSupport {
    message: &'static str,
    resources: &'static [SupportResource],
}

impl CrisisSupport {
    pub fn standard() -> Self {
        Self {
            message: SUPPORT_MESSAGE,
            resources: SUPPORT_RESOURCES,
        }
    }

    pub fn message(&self) -> &'static str {
        self.message
    }

    pub fn resources(&self) -> &'static [SupportResource] {
        self.resources
    }
}

impl Default for CrisisSupport {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Gate
// ============================================================================

/// What the pipeline does with a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Pass,
    PassExempt(ExemptionReason),
    Interrupt(CrisisSupport),
    Refuse(PolicyError),
    /// Generated output carried crisis-class content
    Withhold(PolicyError),
}

impl Gate {
    /// True if this gate withholds generated output for crisis content.
    pub fn is_crisis_refusal(&self) -> bool {
        matches!(self, Gate::Withhold(_))
    }
}

fn describe(categories: &[FlagCategory]) -> String {
    if categories.is_empty() {
        return "unspecified".to_string();
    }
    categories
        .iter()
        .map(|c| match c {
            FlagCategory::Other(name) => name.clone(),
            other => serde_json::to_value(other)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| format!("{:?}", other)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone)]
pub struct SafetyInterceptor {
    moderator: Arc<dyn Moderator>,
}

impl SafetyInterceptor {
    pub fn new(moderator: Arc<dyn Moderator>) -> Self {
        Self { moderator }
    }

    pub async fn pre_check(&self, input: &FlowInput) -> Gate {
        let verdict = self.moderator.check(input.text(), ModerationStage::Pre).await;
        let gate = Self::resolve(ModerationStage::Pre, verdict);
        if matches!(gate, Gate::Interrupt(_)) {
            log::warn!(
                target: CRISIS_LOG_TARGET,
                "Crisis content detected in input (tags: {:?}); interrupting flow",
                input.tags()
            );
        }
        gate
    }

    pub async fn post_check(&self, output: &GenerationOutput, input: &FlowInput) -> Gate {
        let verdict = self.moderator.check(&output.text, ModerationStage::Post).await;
        if verdict.is_crisis() {
            log::warn!(
                target: CRISIS_LOG_TARGET,
                "Crisis-class content in generated output (tags: {:?}); withholding",
                input.tags()
            );
        }
        let gate = Self::resolve(ModerationStage::Post, verdict);
        if let Gate::PassExempt(reason) = &gate {
            log::info!(
                "Output flagged but exempt ({:?}, {} citations)",
                reason,
                output.citations.len()
            );
        }
        gate
    }

    /// Map a verdict onto a gate for the given stage.
    pub fn resolve(stage: ModerationStage, verdict: Verdict) -> Gate {
        match (stage, verdict.normalized()) {
            (_, Verdict::Clean) => Gate::Pass,
            (_, Verdict::ExemptFlagged { reason, .. }) => Gate::PassExempt(reason),
            (ModerationStage::Pre, Verdict::CrisisFlagged) => {
                Gate::Interrupt(CrisisSupport::standard())
            }
            (ModerationStage::Pre, Verdict::PolicyFlagged { categories }) => {
                Gate::Refuse(PolicyError::PolicyRefused {
                    reason: describe(&categories),
                })
            }
            (ModerationStage::Post, Verdict::CrisisFlagged) => {
                Gate::Withhold(PolicyError::UnsafeOutput {
                    reason: CRISIS_OUTPUT_REASON.to_string(),
                })
            }
            (ModerationStage::Post, Verdict::PolicyFlagged { categories }) => {
                Gate::Refuse(PolicyError::UnsafeOutput {
                    reason: describe(&categories),
                })
            }
        }
    }
}
