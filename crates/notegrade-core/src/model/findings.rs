use serde::{Deserialize, Serialize};

/// Consistency score reported when no transcript is available to check against.
pub const NEUTRAL_CONSISTENCY: f64 = 3.0;

/// Deterministic text metrics for a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicResult {
    pub length_score: f64,
    pub redundancy_score: f64,
    pub structure_score: f64,
    /// Fixed weighted mean of the three scores above.
    pub composite_score: f64,
    pub word_count: usize,
    pub character_count: usize,
}

/// Entailment label for one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportLabel {
    Supported,
    #[serde(rename = "Not Supported")]
    NotSupported,
    Uncertain,
}

impl SupportLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supported => "Supported",
            Self::NotSupported => "Not Supported",
            Self::Uncertain => "Uncertain",
        }
    }

    /// Contribution of one claim to the consistency ratio.
    pub fn credit(&self) -> f64 {
        match self {
            Self::Supported => 1.0,
            Self::Uncertain => 0.5,
            Self::NotSupported => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimJudgment {
    pub claim: String,
    pub support: SupportLabel,
    pub explanation: String,
}

/// Outcome of checking note claims against the transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactualityResult {
    consistency_score: f64,
    claims_checked: usize,
    claims: Vec<ClaimJudgment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
}

impl FactualityResult {
    /// Neutral result: nothing was checked.
    pub fn neutral(summary: impl Into<String>) -> Self {
        Self {
            consistency_score: NEUTRAL_CONSISTENCY,
            claims_checked: 0,
            claims: Vec::new(),
            summary: Some(summary.into()),
        }
    }

    /// Aggregate per-claim judgments; an empty list is neutral.
    pub fn from_judgments(claims: Vec<ClaimJudgment>) -> Self {
        if claims.is_empty() {
            return Self::neutral("no verifiable claims found in the note");
        }
        let credit: f64 = claims.iter().map(|c| c.support.credit()).sum();
        let ratio = credit / claims.len() as f64;
        let consistency_score = (ratio * 5.0 * 100.0).round() / 100.0;

        let supported = claims
            .iter()
            .filter(|c| c.support == SupportLabel::Supported)
            .count();
        let unsupported = claims
            .iter()
            .filter(|c| c.support == SupportLabel::NotSupported)
            .count();
        let summary = format!(
            "{} of {} claims supported by the transcript, {} not supported",
            supported,
            claims.len(),
            unsupported
        );

        Self {
            consistency_score,
            claims_checked: claims.len(),
            claims,
            summary: Some(summary),
        }
    }

    pub fn consistency_score(&self) -> f64 {
        self.consistency_score
    }

    pub fn claims_checked(&self) -> usize {
        self.claims_checked
    }

    pub fn claims(&self) -> &[ClaimJudgment] {
        &self.claims
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }
}
