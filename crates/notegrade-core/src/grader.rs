//! Grading orchestrator.
//!
//! Per request: `Dispatched → Collecting → Merging → Complete | Degraded | Failed`.
//! Rubric, heuristics and factuality run concurrently under one global deadline.
//! A branch that misses the deadline is dropped (its in-flight call is canceled)
//! and recorded as that component's failure; its siblings keep running.

use std::sync::Arc;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::GradingSettings;
use crate::error::{ComponentError, ComponentKind, ConfigError, GradeError};
use crate::factuality::{ConsistencyChecker, FactualityChecker};
use crate::heuristics::{HeuristicAnalyzer, TextAnalyzer};
use crate::hybrid::{HybridScorer, MergeInput};
use crate::llm::LlmPort;
use crate::metrics::GradingMetrics;
use crate::model::{
    ClinicalNote, ComponentOutcome, EncounterTranscript, GradeOutcome, GradePhase, Precision,
};
use crate::rubric::{RubricStrategies, StrategyKind};

/// One grading request in raw form; validated by [`Grader::grade`].
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRequest {
    pub note: String,
    pub transcript: Option<String>,
    pub precision: Precision,
    pub strategy: StrategyKind,
}

impl GradeRequest {
    pub fn new(note: impl Into<String>) -> Self {
        Self {
            note: note.into(),
            transcript: None,
            precision: Precision::default(),
            strategy: StrategyKind::default(),
        }
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Orchestrates one grading request at a time; share it behind an `Arc`
/// to grade concurrently.
pub struct Grader {
    settings: GradingSettings,
    strategies: RubricStrategies,
    analyzer: Arc<dyn TextAnalyzer>,
    checker: Arc<dyn ConsistencyChecker>,
    scorer: HybridScorer,
    metrics: Arc<GradingMetrics>,
}

impl Grader {
    /// Standard components over one shared judge port.
    pub fn new(settings: GradingSettings, port: Arc<dyn LlmPort>) -> Result<Self, ConfigError> {
        let strategies = RubricStrategies::from_port(port.clone());
        let analyzer = Arc::new(HeuristicAnalyzer::new(settings.heuristics.clone()));
        let checker = Arc::new(FactualityChecker::new(port, settings.factuality.clone()));
        Self::with_components(settings, strategies, analyzer, checker)
    }

    pub fn with_components(
        settings: GradingSettings,
        strategies: RubricStrategies,
        analyzer: Arc<dyn TextAnalyzer>,
        checker: Arc<dyn ConsistencyChecker>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let scorer = HybridScorer::new(settings.weights, settings.grade_thresholds);
        Ok(Self {
            settings,
            strategies,
            analyzer,
            checker,
            scorer,
            metrics: Arc::new(GradingMetrics::new()),
        })
    }

    /// Record into a registry shared with other graders.
    pub fn with_metrics(mut self, metrics: Arc<GradingMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &GradingSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<GradingMetrics> {
        &self.metrics
    }

    /// Grade from the caller's own async context.
    pub async fn grade(&self, request: GradeRequest) -> Result<GradeOutcome, GradeError> {
        let request_id = Uuid::new_v4();
        let (precision, strategy) = (request.precision, request.strategy);
        let span = info_span!(
            "grade",
            %request_id,
            %precision,
            %strategy
        );
        let started = Instant::now();
        let result = self.grade_inner(request_id, request).instrument(span).await;
        self.metrics
            .record_outcome(precision, strategy, &result, started.elapsed());
        result
    }

    /// Grade from synchronous code. Must not be called inside a Tokio runtime.
    pub fn grade_blocking(&self, request: GradeRequest) -> Result<GradeOutcome, GradeError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(GradeError::Runtime {
                message: "grade_blocking called inside an async runtime; use grade().await"
                    .to_string(),
            });
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GradeError::Runtime {
                message: format!("failed to start runtime: {}", e),
            })?;
        runtime.block_on(self.grade(request))
    }

    async fn grade_inner(
        &self,
        request_id: Uuid,
        request: GradeRequest,
    ) -> Result<GradeOutcome, GradeError> {
        let limits = &self.settings.limits;
        let validated = ClinicalNote::parse(request.note, limits).and_then(|note| {
            EncounterTranscript::parse_optional(request.transcript, limits).map(|t| (note, t))
        });
        let (note, transcript) = match validated {
            Ok(v) => v,
            Err(e) => {
                warn!(phase = %GradePhase::Failed, reason = "validation_error", error = %e, "rejected input");
                return Err(e.into());
            }
        };

        let precision = request.precision;
        let strategy = self.strategies.select(request.strategy);
        let global = self.settings.global_timeout();
        let deadline = Instant::now() + global;
        info!(
            phase = %GradePhase::Dispatched,
            note_chars = note.char_count(),
            transcript_supplied = transcript.is_some(),
            "grading dispatched"
        );

        let rubric_branch = async {
            match timeout_at(deadline, strategy.score(&note, precision)).await {
                Ok(result) => result,
                Err(_) => Err(ComponentError::timeout(ComponentKind::Rubric, global)),
            }
        };
        let heuristic_branch = async {
            self.analyzer
                .analyze(&note)
                .map_err(|e| ComponentError::internal(ComponentKind::Heuristic, e.to_string()))
        };
        let factuality_branch = async {
            match timeout_at(
                deadline,
                self.checker.check(&note, transcript.as_ref(), precision),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ComponentError::timeout(ComponentKind::Factuality, global)),
            }
        };

        debug!(phase = %GradePhase::Collecting, "awaiting components");
        let (rubric, heuristic, factuality) =
            tokio::join!(rubric_branch, heuristic_branch, factuality_branch);

        for failure in [rubric.as_ref().err(), heuristic.as_ref().err(), factuality.as_ref().err()]
            .into_iter()
            .flatten()
        {
            warn!(
                component = %failure.component,
                kind = %failure.kind,
                error = %failure.message,
                "component failed"
            );
        }

        let heuristic = match heuristic {
            Ok(h) => h,
            Err(heuristic_err) => {
                let err = match (rubric, factuality) {
                    (Err(r), Err(f)) => GradeError::AllComponentsFailed {
                        failures: vec![r, heuristic_err, f],
                    },
                    _ => GradeError::HeuristicInvariant {
                        message: heuristic_err.message,
                    },
                };
                warn!(phase = %GradePhase::Failed, reason = err.reason_code(), "grading failed");
                return Err(err);
            }
        };

        debug!(phase = %GradePhase::Merging, "merging component results");
        let result = self.scorer.merge(MergeInput {
            request_id,
            rubric: ComponentOutcome::from(rubric),
            heuristic,
            factuality: ComponentOutcome::from(factuality),
            transcript_supplied: transcript.is_some(),
        });

        let outcome = if result.degraded {
            GradeOutcome::Degraded(result)
        } else {
            GradeOutcome::Complete(result)
        };
        let r = outcome.result();
        info!(
            phase = %outcome.phase(),
            final_score = r.final_score,
            grade = %r.grade,
            failed_components = r.failed_components.len(),
            "grading finished"
        );
        Ok(outcome)
    }
}
