//! Sequential batch screening.
//!
//! Patients are screened one (patient, trial) pair at a time, patient-major,
//! with a fixed pause between model calls. Nothing overlaps.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use trialscreen_core::{Decision, PatientRecord, Protocol, ResultRow, StoreError};

use crate::screener::{Screener, ScreeningReport};

/// Counts for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Pairs that ended in `ERROR`.
    pub failures: usize,
    pub by_decision: BTreeMap<Decision, usize>,
}

impl BatchSummary {
    fn record(&mut self, decision: Decision) {
        self.total += 1;
        if decision == Decision::Error {
            self.failures += 1;
        }
        *self.by_decision.entry(decision).or_default() += 1;
    }

    pub fn count(&self, decision: Decision) -> usize {
        self.by_decision.get(&decision).copied().unwrap_or(0)
    }
}

/// Reports in screening order, plus their summary.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub reports: Vec<ScreeningReport>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    /// Rows for the result store.
    pub fn rows(&self) -> Result<Vec<ResultRow>, StoreError> {
        self.reports
            .iter()
            .map(|r| ResultRow::from_decision(&r.patient_id, &r.trial_name, &r.record))
            .collect()
    }
}

/// Positional id for a patient without `patient_id`/`subject_id`.
pub fn fallback_patient_id(index: usize) -> String {
    format!("BATCH_{index}")
}

/// Runs a [`Screener`] over patients × protocols.
#[derive(Debug, Clone)]
pub struct BatchScreener {
    screener: Screener,
    delay: Duration,
}

impl BatchScreener {
    pub fn new(screener: Screener, delay: Duration) -> Self {
        Self { screener, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Screen every patient against every protocol.
    ///
    /// `index` in the fallback id is the patient's 0-based position in
    /// `patients`.
    pub async fn run(&self, patients: &[PatientRecord], protocols: &[Protocol]) -> BatchOutcome {
        let pairs = patients.len() * protocols.len();
        tracing::info!(
            patients = patients.len(),
            protocols = protocols.len(),
            provider = self.screener.provider_name(),
            model = self.screener.model(),
            "Starting batch screening"
        );

        let mut outcome = BatchOutcome {
            reports: Vec::with_capacity(pairs),
            summary: BatchSummary::default(),
        };

        for (index, patient) in patients.iter().enumerate() {
            let patient_id = patient
                .patient_id()
                .unwrap_or_else(|| fallback_patient_id(index));

            for protocol in protocols {
                if !outcome.reports.is_empty() && !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }

                let report = self
                    .screener
                    .screen_report(&patient_id, &protocol.name, patient, &protocol.criteria)
                    .await;

                tracing::info!(
                    progress = %format_args!("{}/{}", outcome.reports.len() + 1, pairs),
                    patient_id = %patient_id,
                    trial = %protocol.name,
                    decision = %report.record.decision,
                    failures = outcome.summary.failures + usize::from(report.record.is_error()),
                    "Screened pair"
                );

                outcome.summary.record(report.record.decision);
                outcome.reports.push(report);
            }
        }

        tracing::info!(
            total = outcome.summary.total,
            failures = outcome.summary.failures,
            "Batch screening complete"
        );
        outcome
    }
}
