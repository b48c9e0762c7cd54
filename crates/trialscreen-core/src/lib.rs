//! # trialscreen-core
//!
//! Deterministic validation of LLM clinical-trial eligibility decisions.
//!
//! This crate turns raw model text into a [`DecisionRecord`]:
//!
//! 1. **Extract** a JSON object from prose or markdown fences
//! 2. **Normalize** it into the fixed seven-field schema
//! 3. **Enforce** the override rules that downgrade contradictory ELIGIBLE
//!    decisions
//!
//! ## Key Guarantees
//!
//! 1. **No LLM calls**: everything here is pure and deterministic
//! 2. **Never fails the caller**: [`validate_response`] always returns a
//!    well-formed record; failures become `ERROR` with a diagnostic reason
//! 3. **Idempotent**: re-validating a record's own JSON yields the same record
//!
//! ## Example
//!
//! ```rust
//! use trialscreen_core::{validate_response, Decision};
//!
//! let raw = r#"Analysis complete:
//! {"decision": "ELIGIBLE", "reason": "Age and HbA1c in range", "missing_info": ["eGFR"]}
//! Let me know if you need more detail."#;
//!
//! let record = validate_response(raw);
//! assert_eq!(record.decision, Decision::Uncertain);
//! assert!(record.reason.starts_with("[AUTO-CORRECT]"));
//! ```

pub mod enforcer;
pub mod extract;
pub mod normalize;
pub mod patient;
pub mod protocol;
pub mod store;
pub mod types;

pub use enforcer::{ConsistencyEnforcer, Enforcement, OverrideRule};
pub use extract::extract_json_candidate;
pub use normalize::normalize;
pub use patient::{load_patients_csv, PatientError, PatientRecord, PatientValue};
pub use protocol::{sanitize_name, Protocol, ProtocolError, ProtocolLibrary};
pub use store::{DecisionSummary, MergeOutcome, ResultRow, ResultStore, StoreError};
pub use types::{Decision, DecisionRecord};

use thiserror::Error;

/// How many characters of raw model text are quoted in an extraction error.
pub const RAW_SNIPPET_CHARS: usize = 100;

/// Why a model response could not be turned into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    /// No JSON-shaped substring in the model text.
    #[error("No JSON found in response. Raw: {snippet}")]
    Extraction { snippet: String },

    /// The candidate was not valid JSON, or was not an object.
    #[error("Failed to parse model response: {message}")]
    Parse { message: String },
}

impl ResponseError {
    fn extraction(raw: &str) -> Self {
        ResponseError::Extraction {
            snippet: raw.chars().take(RAW_SNIPPET_CHARS).collect(),
        }
    }

    /// The ERROR record this failure is reported as.
    pub fn into_record(self) -> DecisionRecord {
        DecisionRecord::error(self.to_string())
    }
}

/// Extract, normalize and enforce, keeping the failure kind.
pub fn parse_response(raw: &str) -> Result<DecisionRecord, ResponseError> {
    parse_response_with_audit(raw).map(|enforcement| enforcement.record)
}

/// Like [`parse_response`], also reporting which override rules fired.
pub fn parse_response_with_audit(raw: &str) -> Result<Enforcement, ResponseError> {
    let candidate = extract_json_candidate(raw).ok_or_else(|| ResponseError::extraction(raw))?;

    let value: serde_json::Value =
        serde_json::from_str(candidate).map_err(|e| ResponseError::Parse {
            message: e.to_string(),
        })?;

    if let Some(object) = value.as_object() {
        let ignored = normalize::unknown_keys(object);
        if !ignored.is_empty() {
            tracing::trace!(keys = ?ignored, "Ignoring unexpected response keys");
        }
    }

    let draft = normalize(&value)?;
    Ok(ConsistencyEnforcer::new().enforce_with_audit(draft))
}

/// Validate raw model text into a record. Never fails; every failure path
/// becomes a `Decision::Error` record.
pub fn validate_response(raw: &str) -> DecisionRecord {
    parse_response(raw).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Model response rejected");
        err.into_record()
    })
}
