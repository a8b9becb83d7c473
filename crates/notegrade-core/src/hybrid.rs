//! Weighted merge of component results into a final score and letter grade.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ComponentKind, ConfigError};
use crate::model::{
    ComponentOutcome, ComponentWeights, FactualityResult, Grade, HeuristicResult, HybridResult,
    RubricScore,
};

pub const MIN_FINAL_SCORE: f64 = 0.0;
pub const MAX_FINAL_SCORE: f64 = 5.0;

/// Lower bounds (inclusive) of each passing grade. Anything below `d` is F.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GradeThresholds {
    #[serde(default = "default_a")]
    pub a: f64,
    #[serde(default = "default_b")]
    pub b: f64,
    #[serde(default = "default_c")]
    pub c: f64,
    #[serde(default = "default_d")]
    pub d: f64,
}

fn default_a() -> f64 {
    4.5
}

fn default_b() -> f64 {
    3.5
}

fn default_c() -> f64 {
    2.5
}

fn default_d() -> f64 {
    1.5
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self {
            a: default_a(),
            b: default_b(),
            c: default_c(),
            d: default_d(),
        }
    }
}

impl GradeThresholds {
    /// Thresholds must be strictly descending inside (0, 5].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = MAX_FINAL_SCORE >= self.a
            && self.a > self.b
            && self.b > self.c
            && self.c > self.d
            && self.d > MIN_FINAL_SCORE;
        if !ordered {
            return Err(ConfigError::invalid(format!(
                "grade thresholds must satisfy 5 >= a > b > c > d > 0, got a={} b={} c={} d={}",
                self.a, self.b, self.c, self.d
            )));
        }
        Ok(())
    }

    pub fn grade_for(&self, score: f64) -> Grade {
        if score >= self.a {
            Grade::A
        } else if score >= self.b {
            Grade::B
        } else if score >= self.c {
            Grade::C
        } else if score >= self.d {
            Grade::D
        } else {
            Grade::F
        }
    }
}

impl ComponentWeights {
    /// Zero the weights of `failed` components and scale the rest to sum to 1.0.
    ///
    /// If the surviving components carried no weight at all they share it equally.
    pub fn redistribute(&self, failed: &[ComponentKind]) -> ComponentWeights {
        let keep = |c: ComponentKind| !failed.contains(&c);
        let survivors: Vec<ComponentKind> = [
            ComponentKind::Rubric,
            ComponentKind::Heuristic,
            ComponentKind::Factuality,
        ]
        .into_iter()
        .filter(|c| keep(*c))
        .collect();

        if survivors.is_empty() {
            return ComponentWeights {
                rubric: 0.0,
                heuristic: 0.0,
                factuality: 0.0,
            };
        }

        let remaining: f64 = survivors.iter().map(|c| self.get(*c)).sum();
        let share = |c: ComponentKind| {
            if !keep(c) {
                0.0
            } else if remaining > 0.0 {
                self.get(c) / remaining
            } else {
                1.0 / survivors.len() as f64
            }
        };

        ComponentWeights {
            rubric: share(ComponentKind::Rubric),
            heuristic: share(ComponentKind::Heuristic),
            factuality: share(ComponentKind::Factuality),
        }
    }
}

/// Inputs to a merge, collected by the grader.
#[derive(Debug, Clone)]
pub struct MergeInput {
    pub request_id: Uuid,
    pub rubric: ComponentOutcome<RubricScore>,
    pub heuristic: HeuristicResult,
    pub factuality: ComponentOutcome<FactualityResult>,
    pub transcript_supplied: bool,
}

#[derive(Debug, Clone)]
pub struct HybridScorer {
    weights: ComponentWeights,
    thresholds: GradeThresholds,
}

impl HybridScorer {
    pub fn new(weights: ComponentWeights, thresholds: GradeThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    pub fn merge(&self, input: MergeInput) -> HybridResult {
        let mut failed = Vec::new();
        if input.rubric.is_failed() {
            failed.push(ComponentKind::Rubric);
        }
        if input.factuality.is_failed() {
            failed.push(ComponentKind::Factuality);
        }

        // A missing transcript leaves factuality at its neutral score and full weight.
        let applied = if failed.is_empty() {
            self.weights
        } else {
            self.weights.redistribute(&failed)
        };

        let rubric_score = input.rubric.result().map(|r| r.average());
        let heuristic_score = input.heuristic.composite_score;
        let factuality_score = input.factuality.result().map(|f| f.consistency_score());

        let raw = rubric_score.unwrap_or(0.0) * applied.rubric
            + heuristic_score * applied.heuristic
            + factuality_score.unwrap_or(0.0) * applied.factuality;
        let final_score = round2(raw.clamp(MIN_FINAL_SCORE, MAX_FINAL_SCORE));
        let grade = self.thresholds.grade_for(final_score);

        let mut parts = Vec::with_capacity(3);
        parts.push(contribution(
            "rubric",
            rubric_score,
            applied.rubric,
            input.rubric.error().map(|e| e.kind.as_str()),
        ));
        parts.push(contribution(
            "heuristic",
            Some(heuristic_score),
            applied.heuristic,
            None,
        ));
        let mut factuality_part = contribution(
            "factuality",
            factuality_score,
            applied.factuality,
            input.factuality.error().map(|e| e.kind.as_str()),
        );
        if !input.transcript_supplied && factuality_score.is_some() {
            factuality_part.push_str(" (neutral, no transcript)");
        }
        parts.push(factuality_part);

        let mut integration_note = format!(
            "{}; final {:.2} -> {}",
            parts.join("; "),
            final_score,
            grade
        );
        if !failed.is_empty() {
            integration_note.push_str(" (weights redistributed over succeeded components)");
        }

        HybridResult {
            request_id: input.request_id,
            final_score,
            grade,
            rubric: input.rubric,
            heuristic: input.heuristic,
            factuality: input.factuality,
            applied_weights: applied,
            degraded: !failed.is_empty(),
            failed_components: failed,
            transcript_supplied: input.transcript_supplied,
            integration_note,
            graded_at: Utc::now(),
        }
    }
}

fn contribution(name: &str, score: Option<f64>, weight: f64, failure: Option<&str>) -> String {
    match (score, failure) {
        (Some(s), _) => format!("{} {:.2} x {:.2} = {:.2}", name, s, weight, s * weight),
        (None, Some(kind)) => format!("{} failed ({})", name, kind),
        (None, None) => format!("{} unavailable", name),
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ComponentError, FailureKind};
    use crate::model::{RubricDimension, RubricProvenance};
    use std::collections::BTreeMap;

    fn rubric(score: u8) -> RubricScore {
        let scores: BTreeMap<_, _> = RubricDimension::ALL.iter().map(|&d| (d, score)).collect();
        RubricScore::new(scores, RubricProvenance::SingleJudge).unwrap()
    }

    fn heuristic(composite: f64) -> HeuristicResult {
        HeuristicResult {
            length_score: composite,
            redundancy_score: composite,
            structure_score: composite,
            composite_score: composite,
            word_count: 200,
            character_count: 1200,
        }
    }

    fn input(
        rubric: ComponentOutcome<RubricScore>,
        factuality: ComponentOutcome<FactualityResult>,
    ) -> MergeInput {
        MergeInput {
            request_id: Uuid::new_v4(),
            rubric,
            heuristic: heuristic(3.0),
            factuality,
            transcript_supplied: true,
        }
    }

    fn failed<T>(component: ComponentKind) -> ComponentOutcome<T> {
        ComponentOutcome::Failed {
            error: ComponentError::new(component, FailureKind::TimeoutExceeded, "late"),
        }
    }

    #[test]
    fn thresholds_partition_zero_to_five() {
        let t = GradeThresholds::default();
        t.validate().unwrap();
        assert_eq!(t.grade_for(5.0), Grade::A);
        assert_eq!(t.grade_for(4.5), Grade::A);
        assert_eq!(t.grade_for(4.49), Grade::B);
        assert_eq!(t.grade_for(3.5), Grade::B);
        assert_eq!(t.grade_for(2.5), Grade::C);
        assert_eq!(t.grade_for(1.5), Grade::D);
        assert_eq!(t.grade_for(1.49), Grade::F);
        assert_eq!(t.grade_for(0.0), Grade::F);

        let mut last = Grade::A;
        for i in 0..=500 {
            let g = t.grade_for(5.0 - f64::from(i) / 100.0);
            assert!(g >= last, "grade must not improve as the score drops");
            last = g;
        }
    }

    #[test]
    fn thresholds_must_descend() {
        let t = GradeThresholds {
            a: 4.0,
            b: 4.0,
            c: 2.0,
            d: 1.0,
        };
        assert!(t.validate().is_err());
        let t = GradeThresholds {
            a: 5.5,
            ..GradeThresholds::default()
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn redistributes_proportionally() {
        let w = ComponentWeights::default().redistribute(&[ComponentKind::Factuality]);
        assert_eq!(w.factuality, 0.0);
        assert!((w.rubric - 0.7 / 0.9).abs() < 1e-12);
        assert!((w.heuristic - 0.2 / 0.9).abs() < 1e-12);
        assert!((w.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_weight_survivors_share_equally() {
        let w = ComponentWeights {
            rubric: 1.0,
            heuristic: 0.0,
            factuality: 0.0,
        }
        .redistribute(&[ComponentKind::Rubric]);
        assert_eq!(w.heuristic, 0.5);
        assert_eq!(w.factuality, 0.5);
    }

    #[test]
    fn complete_merge_uses_configured_weights() {
        let scorer = HybridScorer::new(ComponentWeights::default(), GradeThresholds::default());
        let result = scorer.merge(input(
            ComponentOutcome::Succeeded { result: rubric(4) },
            ComponentOutcome::Succeeded {
                result: FactualityResult::neutral("none"),
            },
        ));
        // 4*0.7 + 3*0.2 + 3*0.1
        assert_eq!(result.final_score, 3.7);
        assert_eq!(result.grade, Grade::B);
        assert!(!result.degraded);
        assert_eq!(result.applied_weights, ComponentWeights::default());
        assert!(result.integration_note.contains("rubric 4.00 x 0.70 = 2.80"));
    }

    #[test]
    fn no_transcript_keeps_factuality_weight() {
        let scorer = HybridScorer::new(ComponentWeights::default(), GradeThresholds::default());
        let mut i = input(
            ComponentOutcome::Succeeded { result: rubric(5) },
            ComponentOutcome::Succeeded {
                result: FactualityResult::neutral("no transcript"),
            },
        );
        i.transcript_supplied = false;
        let result = scorer.merge(i);
        assert_eq!(result.applied_weights.factuality, 0.10);
        assert!(result.integration_note.contains("neutral, no transcript"));
    }

    #[test]
    fn failed_factuality_redistributes_to_rubric_and_heuristic() {
        let scorer = HybridScorer::new(ComponentWeights::default(), GradeThresholds::default());
        let result = scorer.merge(input(
            ComponentOutcome::Succeeded { result: rubric(4) },
            failed(ComponentKind::Factuality),
        ));
        assert!(result.degraded);
        assert_eq!(result.failed_components, vec![ComponentKind::Factuality]);
        assert_eq!(result.applied_weights.factuality, 0.0);
        let w = result.applied_weights;
        assert!((w.rubric + w.heuristic - 1.0).abs() < 1e-9);
        assert!(result.integration_note.contains("factuality failed (timeout_exceeded)"));
    }

    #[test]
    fn final_score_stays_in_range() {
        let scorer = HybridScorer::new(ComponentWeights::default(), GradeThresholds::default());
        let mut i = input(
            ComponentOutcome::Succeeded { result: rubric(5) },
            ComponentOutcome::Succeeded {
                result: FactualityResult::neutral("x"),
            },
        );
        i.heuristic = heuristic(5.0);
        let r = scorer.merge(i);
        assert!((MIN_FINAL_SCORE..=MAX_FINAL_SCORE).contains(&r.final_score));

        let r = scorer.merge(input(
            failed(ComponentKind::Rubric),
            failed(ComponentKind::Factuality),
        ));
        assert_eq!(r.applied_weights.heuristic, 1.0);
        assert_eq!(r.final_score, 3.0);
    }
}
