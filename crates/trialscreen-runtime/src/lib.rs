//! # trialscreen-runtime
//!
//! LLM invocation for clinical-trial eligibility screening.
//!
//! This crate owns everything that touches a model: the screening prompt,
//! provider backends, credentials, and the sequential batch runner. Every
//! model response is handed to `trialscreen-core` for extraction,
//! normalization and the override rules.
//!
//! ## Important
//!
//! [`Screener::screen`] never returns an error. Provider failures, empty
//! patients and unparseable responses all come back as `ERROR` records with
//! the cause in `reason`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use trialscreen_runtime::{ProviderRegistry, ScreenerConfig, Screener};
//!
//! let registry = ProviderRegistry::with_defaults();
//! let screener = Screener::from_config(&registry, &ScreenerConfig::default())?;
//!
//! let record = screener.screen(&patient, &protocol.criteria).await;
//! println!("{}: {}", record.decision, record.reason);
//! ```

pub mod batch;
pub mod config;
pub mod prompts;
pub mod providers;
pub mod screener;

pub use batch::{BatchOutcome, BatchScreener, BatchSummary};
pub use config::{ConfigError, ScreenerConfig};
pub use prompts::build_screening_prompt;
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, CredentialSource,
    LlmProvider, ProviderError, ProviderFactory, ProviderRegistry, TokenUsage,
};
pub use screener::{Screener, ScreeningReport};

use thiserror::Error;

/// Errors from building or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
