use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::findings::{FactualityResult, HeuristicResult};
use super::rubric::RubricScore;
use crate::error::{ComponentError, ComponentKind};

/// Weight triple over the three components.
///
/// Used both for the configured defaults and for the weights actually
/// applied to a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentWeights {
    #[serde(default = "default_rubric_weight")]
    pub rubric: f64,
    #[serde(default = "default_heuristic_weight")]
    pub heuristic: f64,
    #[serde(default = "default_factuality_weight")]
    pub factuality: f64,
}

fn default_rubric_weight() -> f64 {
    0.70
}

fn default_heuristic_weight() -> f64 {
    0.20
}

fn default_factuality_weight() -> f64 {
    0.10
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            rubric: default_rubric_weight(),
            heuristic: default_heuristic_weight(),
            factuality: default_factuality_weight(),
        }
    }
}

impl ComponentWeights {
    pub fn sum(&self) -> f64 {
        self.rubric + self.heuristic + self.factuality
    }

    pub fn get(&self, component: ComponentKind) -> f64 {
        match component {
            ComponentKind::Rubric => self.rubric,
            ComponentKind::Heuristic => self.heuristic,
            ComponentKind::Factuality => self.factuality,
        }
    }
}

/// Letter grade over the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A component's result, or the marker recording why it has none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComponentOutcome<T> {
    Succeeded { result: T },
    Failed { error: ComponentError },
}

impl<T> ComponentOutcome<T> {
    pub fn result(&self) -> Option<&T> {
        match self {
            Self::Succeeded { result } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ComponentError> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl<T> From<Result<T, ComponentError>> for ComponentOutcome<T> {
    fn from(r: Result<T, ComponentError>) -> Self {
        match r {
            Ok(result) => Self::Succeeded { result },
            Err(error) => Self::Failed { error },
        }
    }
}

/// Merged grading result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridResult {
    pub request_id: Uuid,
    /// Weighted score in [0, 5], two decimals.
    pub final_score: f64,
    pub grade: Grade,
    pub rubric: ComponentOutcome<RubricScore>,
    pub heuristic: HeuristicResult,
    pub factuality: ComponentOutcome<FactualityResult>,
    pub applied_weights: ComponentWeights,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_components: Vec<ComponentKind>,
    pub transcript_supplied: bool,
    /// Human-readable breakdown of the weighted sum.
    pub integration_note: String,
    pub graded_at: DateTime<Utc>,
}

/// Successful outcome of a grading request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GradeOutcome {
    Complete(HybridResult),
    /// At least one component failed; the score uses the remaining ones.
    Degraded(HybridResult),
}

impl GradeOutcome {
    pub fn result(&self) -> &HybridResult {
        match self {
            Self::Complete(r) | Self::Degraded(r) => r,
        }
    }

    pub fn into_result(self) -> HybridResult {
        match self {
            Self::Complete(r) | Self::Degraded(r) => r,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    pub fn phase(&self) -> GradePhase {
        match self {
            Self::Complete(_) => GradePhase::Complete,
            Self::Degraded(_) => GradePhase::Degraded,
        }
    }
}

/// Per-request orchestrator state, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradePhase {
    Dispatched,
    Collecting,
    Merging,
    Complete,
    Degraded,
    Failed,
}

impl GradePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Collecting => "collecting",
            Self::Merging => "merging",
            Self::Complete => "complete",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for GradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
