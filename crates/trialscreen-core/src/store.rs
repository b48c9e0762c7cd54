//! CSV result store shared with the dashboard.
//!
//! One row per (patient_id, trial_name). Writes are whole-file: load every
//! row, drop the keys being replaced, append the new rows, write back. There
//! is no locking; run one writer at a time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::{Decision, DecisionRecord};

/// Column order of the persisted file.
pub const COLUMNS: [&str; 7] = [
    "patient_id",
    "trial_name",
    "decision",
    "reason",
    "missing_info",
    "inclusion_criteria_not_met",
    "exclusion_criteria_met",
];

/// Errors from the result store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Result store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Result store CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to encode list column: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One persisted screening result.
///
/// The decision and list columns are plain strings so rows written by older
/// tools survive a rewrite unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub patient_id: String,
    pub trial_name: String,
    pub decision: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub missing_info: String,
    #[serde(default)]
    pub inclusion_criteria_not_met: String,
    #[serde(default)]
    pub exclusion_criteria_met: String,
}

impl ResultRow {
    /// Build a row from a decision record. List fields are stored as JSON
    /// array strings.
    pub fn from_decision(
        patient_id: impl Into<String>,
        trial_name: impl Into<String>,
        record: &DecisionRecord,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            patient_id: patient_id.into(),
            trial_name: trial_name.into(),
            decision: record.decision.to_string(),
            reason: record.reason.clone(),
            missing_info: serde_json::to_string(&record.missing_info)?,
            inclusion_criteria_not_met: serde_json::to_string(&record.inclusion_criteria_not_met)?,
            exclusion_criteria_met: serde_json::to_string(&record.exclusion_criteria_met)?,
        })
    }

    pub fn key(&self) -> (&str, &str) {
        (self.patient_id.as_str(), self.trial_name.as_str())
    }

    /// The stored decision, if it is a canonical label.
    pub fn parsed_decision(&self) -> Option<Decision> {
        self.decision.parse().ok()
    }
}

/// Counts of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub replaced: usize,
    pub appended: usize,
    pub total: usize,
}

/// Per-decision counts over stored rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DecisionSummary {
    pub total: usize,
    pub by_decision: BTreeMap<Decision, usize>,
    /// Rows whose decision column is not a canonical label.
    pub unrecognized: usize,
}

impl DecisionSummary {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a ResultRow>) -> Self {
        let mut summary = Self::default();
        for row in rows {
            summary.total += 1;
            match row.parsed_decision() {
                Some(decision) => *summary.by_decision.entry(decision).or_default() += 1,
                None => summary.unrecognized += 1,
            }
        }
        summary
    }

    pub fn count(&self, decision: Decision) -> usize {
        self.by_decision.get(&decision).copied().unwrap_or(0)
    }
}

/// Replace rows by (patient_id, trial_name) and append the new ones.
///
/// Existing rows keep their order; new rows go at the end in their given
/// order.
pub fn merge_rows(existing: Vec<ResultRow>, new_rows: Vec<ResultRow>) -> (Vec<ResultRow>, MergeOutcome) {
    let incoming: HashSet<(String, String)> = new_rows
        .iter()
        .map(|r| (r.patient_id.clone(), r.trial_name.clone()))
        .collect();

    let before = existing.len();
    let mut merged: Vec<ResultRow> = existing
        .into_iter()
        .filter(|r| !incoming.contains(&(r.patient_id.clone(), r.trial_name.clone())))
        .collect();
    let replaced = before - merged.len();
    let appended = new_rows.len();
    merged.extend(new_rows);

    let outcome = MergeOutcome {
        replaced,
        appended,
        total: merged.len(),
    };
    (merged, outcome)
}

/// File-backed result store.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored rows. A missing file is an empty store.
    pub fn load(&self) -> Result<Vec<ResultRow>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let rows = reader
            .deserialize()
            .collect::<Result<Vec<ResultRow>, csv::Error>>()?;
        tracing::debug!(path = %self.path.display(), rows = rows.len(), "Loaded result store");
        Ok(rows)
    }

    /// Overwrite the file with `rows`.
    pub fn save(&self, rows: &[ResultRow]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)?;
        writer.write_record(COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read-modify-write: replace matching keys and append the rest.
    pub fn merge(&self, new_rows: Vec<ResultRow>) -> Result<MergeOutcome, StoreError> {
        let existing = self.load()?;
        let (merged, outcome) = merge_rows(existing, new_rows);
        self.save(&merged)?;

        tracing::info!(
            path = %self.path.display(),
            replaced = outcome.replaced,
            appended = outcome.appended,
            total = outcome.total,
            "Result store updated"
        );
        Ok(outcome)
    }

    /// Decision counts, optionally limited to one trial.
    pub fn summary(&self, trial: Option<&str>) -> Result<DecisionSummary, StoreError> {
        let rows = self.load()?;
        Ok(DecisionSummary::from_rows(
            rows.iter().filter(|r| trial.map_or(true, |t| r.trial_name == t)),
        ))
    }
}
