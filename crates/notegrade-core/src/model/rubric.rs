use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowest and highest score a PDQI-9 dimension can take.
pub const MIN_DIMENSION_SCORE: u8 = 1;
pub const MAX_DIMENSION_SCORE: u8 = 5;

/// The nine PDQI-9 documentation-quality dimensions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RubricDimension {
    UpToDate,
    Accurate,
    Thorough,
    Useful,
    Organized,
    Concise,
    Consistent,
    Complete,
    Actionable,
}

impl RubricDimension {
    pub const ALL: [RubricDimension; 9] = [
        Self::UpToDate,
        Self::Accurate,
        Self::Thorough,
        Self::Useful,
        Self::Organized,
        Self::Concise,
        Self::Consistent,
        Self::Complete,
        Self::Actionable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpToDate => "up_to_date",
            Self::Accurate => "accurate",
            Self::Thorough => "thorough",
            Self::Useful => "useful",
            Self::Organized => "organized",
            Self::Concise => "concise",
            Self::Consistent => "consistent",
            Self::Complete => "complete",
            Self::Actionable => "actionable",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::UpToDate => "Current, evidence-based information",
            Self::Accurate => "Factually correct medical information",
            Self::Thorough => "Comprehensive coverage of relevant details",
            Self::Useful => "Practical value for clinical decision-making",
            Self::Organized => "Logical structure and flow",
            Self::Concise => "Appropriate length without redundancy",
            Self::Consistent => "Internal consistency and coherence",
            Self::Complete => "All necessary information included",
            Self::Actionable => "Clear next steps and recommendations",
        }
    }
}

impl fmt::Display for RubricDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Narrative attached to one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionNarrative {
    pub dimension: RubricDimension,
    pub narrative: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_excerpts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub improvement_suggestions: Vec<String>,
}

/// Which strategy produced a rubric score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RubricProvenance {
    SingleJudge,
    MultiAgent {
        /// Dimensions whose sub-judge failed and were given the neutral score.
        failed_dimensions: Vec<RubricDimension>,
    },
}

impl RubricProvenance {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::MultiAgent { failed_dimensions } if !failed_dimensions.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RubricError {
    #[error("missing rubric dimensions: {}", join(.0))]
    MissingDimensions(Vec<RubricDimension>),

    #[error("score {score} for '{dimension}' is outside 1-5")]
    OutOfRange { dimension: RubricDimension, score: u8 },
}

fn join(dims: &[RubricDimension]) -> String {
    dims.iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// PDQI-9 score: all nine dimensions in 1..=5 plus their mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RubricScore {
    scores: BTreeMap<RubricDimension, u8>,
    average: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    narratives: Vec<DimensionNarrative>,
    provenance: RubricProvenance,
}

impl RubricScore {
    pub fn new(
        scores: BTreeMap<RubricDimension, u8>,
        provenance: RubricProvenance,
    ) -> Result<Self, RubricError> {
        let missing: Vec<_> = RubricDimension::ALL
            .iter()
            .copied()
            .filter(|d| !scores.contains_key(d))
            .collect();
        if !missing.is_empty() {
            return Err(RubricError::MissingDimensions(missing));
        }
        if let Some((&dimension, &score)) = scores
            .iter()
            .find(|(_, s)| !(MIN_DIMENSION_SCORE..=MAX_DIMENSION_SCORE).contains(*s))
        {
            return Err(RubricError::OutOfRange { dimension, score });
        }

        let total: u32 = scores.values().map(|&s| u32::from(s)).sum();
        let average = f64::from(total) / RubricDimension::ALL.len() as f64;

        Ok(Self {
            scores,
            average,
            summary: None,
            narratives: Vec::new(),
            provenance,
        })
    }

    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_narratives(mut self, narratives: Vec<DimensionNarrative>) -> Self {
        self.narratives = narratives;
        self
    }

    pub fn score(&self, dimension: RubricDimension) -> u8 {
        self.scores.get(&dimension).copied().unwrap_or(MIN_DIMENSION_SCORE)
    }

    pub fn scores(&self) -> &BTreeMap<RubricDimension, u8> {
        &self.scores
    }

    /// Mean of the nine scores (1-5 scale).
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Sum of the nine scores (9-45 scale).
    pub fn total(&self) -> u32 {
        self.scores.values().map(|&s| u32::from(s)).sum()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn narratives(&self) -> &[DimensionNarrative] {
        &self.narratives
    }

    pub fn provenance(&self) -> &RubricProvenance {
        &self.provenance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(score: u8) -> BTreeMap<RubricDimension, u8> {
        RubricDimension::ALL.iter().map(|&d| (d, score)).collect()
    }

    #[test]
    fn average_is_mean_of_nine() {
        let mut scores = uniform(4);
        scores.insert(RubricDimension::Concise, 1);
        scores.insert(RubricDimension::Accurate, 5);
        let rubric = RubricScore::new(scores, RubricProvenance::SingleJudge).unwrap();
        assert_eq!(rubric.total(), 4 * 7 + 1 + 5);
        assert!((rubric.average() - 34.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_missing_dimension() {
        let mut scores = uniform(3);
        scores.remove(&RubricDimension::Actionable);
        let err = RubricScore::new(scores, RubricProvenance::SingleJudge).unwrap_err();
        assert_eq!(
            err,
            RubricError::MissingDimensions(vec![RubricDimension::Actionable])
        );
        assert!(err.to_string().contains("actionable"));
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let mut scores = uniform(3);
        scores.insert(RubricDimension::Useful, 6);
        assert!(matches!(
            RubricScore::new(scores, RubricProvenance::SingleJudge),
            Err(RubricError::OutOfRange { score: 6, .. })
        ));
        let mut scores = uniform(3);
        scores.insert(RubricDimension::Useful, 0);
        assert!(RubricScore::new(scores, RubricProvenance::SingleJudge).is_err());
    }

    #[test]
    fn blank_summary_is_dropped() {
        let rubric = RubricScore::new(uniform(3), RubricProvenance::SingleJudge)
            .unwrap()
            .with_summary(Some("  ".into()));
        assert_eq!(rubric.summary(), None);
    }

    #[test]
    fn serializes_dimension_keys_in_snake_case() {
        let rubric = RubricScore::new(
            uniform(2),
            RubricProvenance::MultiAgent {
                failed_dimensions: vec![RubricDimension::UpToDate],
            },
        )
        .unwrap();
        let v = serde_json::to_value(&rubric).unwrap();
        assert_eq!(v["scores"]["up_to_date"], 2);
        assert_eq!(v["provenance"]["strategy"], "multi_agent");
        assert_eq!(v["provenance"]["failed_dimensions"][0], "up_to_date");
        assert!(rubric.provenance().is_degraded());
    }
}
