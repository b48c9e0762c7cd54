//! Decision types shared by the validation pipeline and its callers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// The four-valued eligibility outcome.
///
/// Anything the model writes is mapped onto exactly one of these; there is
/// no free-form decision value past normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Eligible,
    Ineligible,
    Uncertain,
    Error,
}

impl Decision {
    /// All decisions, in display order.
    pub const ALL: [Decision; 4] = [
        Decision::Eligible,
        Decision::Ineligible,
        Decision::Uncertain,
        Decision::Error,
    ];

    /// Canonical upper-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Eligible => "ELIGIBLE",
            Decision::Ineligible => "INELIGIBLE",
            Decision::Uncertain => "UNCERTAIN",
            Decision::Error => "ERROR",
        }
    }

    /// Map a model-written label onto a decision, accepting known synonyms.
    ///
    /// The label is trimmed and upper-cased; inner spaces and hyphens are
    /// treated as underscores so `"not eligible"` and `"Not-Eligible"` both
    /// resolve. Returns `None` for anything unrecognized.
    pub fn from_label(label: &str) -> Option<Self> {
        let key: String = label
            .trim()
            .to_uppercase()
            .split(|c: char| c.is_whitespace() || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_");

        match key.as_str() {
            "ELIGIBLE" => Some(Decision::Eligible),
            "INELIGIBLE" | "NOT_ELIGIBLE" => Some(Decision::Ineligible),
            "UNCERTAIN" | "UNKNOWN" | "UNSURE" => Some(Decision::Uncertain),
            "ERROR" => Some(Decision::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse of a canonical label. Synonyms are rejected; use
/// [`Decision::from_label`] for model output.
impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decision::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("not a canonical decision: {s:?}"))
    }
}

/// The validated outcome of screening one patient against one protocol.
///
/// Records are produced fresh per invocation and never edited after they
/// are returned; a re-screening replaces the old record wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: Decision,

    /// Human-readable rationale, including any override audit notes.
    pub reason: String,

    #[serde(default)]
    pub inclusion_criteria_met: Vec<String>,

    #[serde(default)]
    pub inclusion_criteria_not_met: Vec<String>,

    #[serde(default)]
    pub exclusion_criteria_met: Vec<String>,

    #[serde(default)]
    pub exclusion_criteria_not_met: Vec<String>,

    #[serde(default)]
    pub missing_info: Vec<String>,
}

impl DecisionRecord {
    /// A record carrying only a decision and reason.
    pub fn new(decision: Decision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            inclusion_criteria_met: Vec::new(),
            inclusion_criteria_not_met: Vec::new(),
            exclusion_criteria_met: Vec::new(),
            exclusion_criteria_not_met: Vec::new(),
            missing_info: Vec::new(),
        }
    }

    /// An ERROR record with the given diagnostic reason.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(Decision::Error, reason)
    }

    pub fn is_error(&self) -> bool {
        self.decision == Decision::Error
    }

    /// The record as a JSON object using the same field names the model is
    /// asked to emit.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "decision": self.decision.as_str(),
            "reason": self.reason,
            "inclusion_criteria_met": self.inclusion_criteria_met,
            "inclusion_criteria_not_met": self.inclusion_criteria_not_met,
            "exclusion_criteria_met": self.exclusion_criteria_met,
            "exclusion_criteria_not_met": self.exclusion_criteria_not_met,
            "missing_info": self.missing_info,
        })
    }
}
