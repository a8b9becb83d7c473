//! Per-request domain types.

mod findings;
mod input;
mod outcome;
mod rubric;

pub use findings::{
    ClaimJudgment, FactualityResult, HeuristicResult, SupportLabel, NEUTRAL_CONSISTENCY,
};
pub use input::{ClinicalNote, EncounterTranscript, Precision};
pub use outcome::{
    ComponentOutcome, ComponentWeights, Grade, GradeOutcome, GradePhase, HybridResult,
};
pub use rubric::{
    DimensionNarrative, RubricDimension, RubricError, RubricProvenance, RubricScore,
    MAX_DIMENSION_SCORE, MIN_DIMENSION_SCORE,
};
