//! Screening one patient against one trial.
//!
//! prompt → provider → validate. The provider call is the only fallible
//! step with side effects; its failures become `ERROR` records here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use trialscreen_core::{parse_response_with_audit, DecisionRecord, PatientRecord};

use crate::config::ScreenerConfig;
use crate::prompts::build_screening_prompt;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderRegistry};
use crate::RuntimeError;

/// A decision with the context it was produced in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreeningReport {
    pub patient_id: String,
    pub trial_name: String,
    /// Model that answered, when the call reached one.
    pub model: Option<String>,
    pub screened_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: DecisionRecord,
}

/// Prompt builder + model invoker + validation pipeline.
#[derive(Clone)]
pub struct Screener {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
}

impl std::fmt::Debug for Screener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screener")
            .field("provider", &self.provider.name())
            .field("completion", &self.completion)
            .finish()
    }
}

impl Screener {
    /// Wrap a provider. Temperature is forced to 0.
    pub fn new(provider: Arc<dyn LlmProvider>, mut completion: CompletionConfig) -> Self {
        completion.temperature = 0.0;
        Self {
            provider,
            completion,
        }
    }

    /// Build the configured provider from `registry`.
    pub fn from_config(
        registry: &ProviderRegistry,
        config: &ScreenerConfig,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let provider_config = config.provider_config_json();
        registry.validate(&config.provider, &provider_config)?;
        let provider = registry.create(&config.provider, &provider_config)?;

        let default_model = registry
            .default_model(&config.provider)
            .unwrap_or_else(|| CompletionConfig::default().model);

        Ok(Self::new(provider, config.completion_config(&default_model)))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.completion.model
    }

    /// Whether the provider has what it needs to make calls.
    pub async fn is_ready(&self) -> bool {
        self.provider.health_check().await
    }

    /// Screen one patient against one trial's criteria text.
    pub async fn screen(&self, patient: &PatientRecord, trial_text: &str) -> DecisionRecord {
        self.invoke(patient, trial_text).await.0
    }

    /// Like [`screen`](Self::screen), wrapped with ids, model and timestamp.
    pub async fn screen_report(
        &self,
        patient_id: impl Into<String>,
        trial_name: impl Into<String>,
        patient: &PatientRecord,
        trial_text: &str,
    ) -> ScreeningReport {
        let (record, model) = self.invoke(patient, trial_text).await;
        ScreeningReport {
            patient_id: patient_id.into(),
            trial_name: trial_name.into(),
            model,
            screened_at: Utc::now(),
            record,
        }
    }

    /// The record plus the answering model, if the call got that far.
    async fn invoke(
        &self,
        patient: &PatientRecord,
        trial_text: &str,
    ) -> (DecisionRecord, Option<String>) {
        if patient.is_empty() {
            tracing::warn!("Refusing to screen an empty patient record");
            return (DecisionRecord::error("Patient record is empty."), None);
        }

        let prompt = match build_screening_prompt(trial_text, patient) {
            Ok(prompt) => prompt,
            Err(e) => {
                return (
                    DecisionRecord::error(format!("Failed to build prompt: {e}")),
                    None,
                )
            }
        };

        let patient_id = patient.patient_id().unwrap_or_default();
        tracing::debug!(
            patient_id = %patient_id,
            provider = self.provider.name(),
            model = %self.completion.model,
            prompt_tokens = self.provider.estimate_tokens(&prompt),
            "Invoking model"
        );

        let response = match self
            .provider
            .complete(vec![ChatMessage::user(prompt)], &self.completion)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    patient_id = %patient_id,
                    provider = self.provider.name(),
                    error = %e,
                    "Model invocation failed"
                );
                return (DecisionRecord::error(e.to_string()), None);
            }
        };

        let record = match parse_response_with_audit(&response.content) {
            Ok(enforcement) => {
                if !enforcement.fired.is_empty() {
                    tracing::info!(
                        patient_id = %patient_id,
                        rules = ?enforcement.fired,
                        decision = %enforcement.record.decision,
                        "Override rules corrected the model decision"
                    );
                }
                enforcement.record
            }
            Err(e) => {
                tracing::warn!(patient_id = %patient_id, error = %e, "Model response rejected");
                e.into_record()
            }
        };

        tracing::debug!(
            patient_id = %patient_id,
            decision = %record.decision,
            total_tokens = response.usage.total(),
            "Screening complete"
        );
        (record, Some(response.model))
    }
}
