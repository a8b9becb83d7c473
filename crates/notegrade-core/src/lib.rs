//! Hybrid documentation-quality grading for clinical notes.
//!
//! A note (and optionally the encounter transcript) is graded by three
//! independent components, run concurrently:
//!
//! - **Rubric**: PDQI-9 scores from an LLM judge, either one call
//!   ([`SingleJudgeStrategy`]) or nine per-dimension sub-judges ([`MultiAgentStrategy`])
//! - **Heuristics**: deterministic length, redundancy and structure metrics
//! - **Factuality**: claim-by-claim entailment against the transcript
//!
//! The results are merged into a weighted score and letter grade. If one
//! component fails the outcome is [`GradeOutcome::Degraded`] and its weight is
//! redistributed; if all fail the request fails with
//! [`GradeError::AllComponentsFailed`].
//!
//! Each [`Grader`] counts requests by outcome, times them, and keeps
//! per-dimension score distributions in a [`GradingMetrics`] registry.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use notegrade_core::{
//!     GradeRequest, Grader, GradingSettings, OpenAiClient, OpenAiConfig, ResilientLlm,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = GradingSettings::default().apply_env_overrides()?;
//! let client = Arc::new(OpenAiClient::new(OpenAiConfig::from_env()?)?);
//! let port = Arc::new(ResilientLlm::new(client, &settings));
//! let grader = Grader::new(settings, port)?;
//!
//! let outcome = grader
//!     .grade(GradeRequest::new("Assessment: stable angina.\nPlan: start aspirin."))
//!     .await?;
//! println!("{} ({:.2})", outcome.result().grade, outcome.result().final_score);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `NOTEGRADE_LLM_BASE_URL` | Chat-completions base URL (default: `https://api.openai.com/v1`) |
//! | `NOTEGRADE_LLM_API_KEY` | Judge API key |
//! | `NOTEGRADE_LLM_MODEL` | Judge model (default: `gpt-4o-mini`) |
//! | `NOTEGRADE_*` | Grading overrides, see [`config`] |

pub mod config;
pub mod error;
pub mod factuality;
pub mod grader;
pub mod heuristics;
pub mod hybrid;
pub mod llm;
pub mod metrics;
pub mod model;
pub mod report;
pub mod rubric;

pub use config::GradingSettings;
pub use error::{
    ComponentError, ComponentKind, ConfigError, FailureKind, GradeError, LlmError, LlmResult,
    ValidationError,
};
pub use factuality::{ConsistencyChecker, FactualityChecker};
pub use grader::{GradeRequest, Grader};
pub use heuristics::{HeuristicAnalyzer, HeuristicError, TextAnalyzer};
pub use hybrid::{GradeThresholds, HybridScorer};
pub use llm::{
    ChatRequest, CircuitBreaker, CircuitState, LlmClient, LlmPort, OpenAiClient, OpenAiConfig,
    PromptPayload, ResilientLlm, ResponseSchema,
};
pub use metrics::GradingMetrics;
pub use model::{
    ClinicalNote, ComponentOutcome, ComponentWeights, EncounterTranscript, FactualityResult,
    Grade, GradeOutcome, HeuristicResult, HybridResult, Precision, RubricDimension, RubricScore,
};
pub use rubric::{MultiAgentStrategy, RubricStrategies, RubricStrategy, SingleJudgeStrategy, StrategyKind};
