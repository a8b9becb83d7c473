use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::prompt;
use super::{RubricStrategy, StrategyKind};
use crate::error::{ComponentError, ComponentKind};
use crate::llm::{LlmPort, PromptPayload, ResponseSchema};
use crate::model::{
    ClinicalNote, DimensionNarrative, Precision, RubricDimension, RubricProvenance, RubricScore,
    MAX_DIMENSION_SCORE, MIN_DIMENSION_SCORE,
};

/// Score substituted for a dimension whose sub-judge failed.
pub const NEUTRAL_DIMENSION_SCORE: u8 = 3;
const MAX_EVIDENCE: usize = 3;
const STRONG_AT: u8 = 4;
const WEAK_AT: u8 = 2;

static SCHEMA: OnceLock<Result<ResponseSchema, String>> = OnceLock::new();

fn response_schema() -> Result<&'static ResponseSchema, ComponentError> {
    SCHEMA
        .get_or_init(|| {
            ResponseSchema::compile(
                "pdqi9_dimension",
                &json!({
                    "type": "object",
                    "required": ["score", "rationale"],
                    "properties": {
                        "score": {
                            "type": "integer",
                            "minimum": MIN_DIMENSION_SCORE,
                            "maximum": MAX_DIMENSION_SCORE
                        },
                        "rationale": {"type": "string"},
                        "evidence": {"type": "array", "items": {"type": "string"}}
                    }
                }),
            )
        })
        .as_ref()
        .map_err(|e| ComponentError::internal(ComponentKind::Rubric, e.clone()))
}

/// One sub-judge's answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DimensionVerdict {
    pub score: u8,
    pub rationale: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Nine independent sub-judges, one per dimension, reduced into one score.
pub struct MultiAgentStrategy {
    port: Arc<dyn LlmPort>,
}

impl MultiAgentStrategy {
    pub fn new(port: Arc<dyn LlmPort>) -> Self {
        Self { port }
    }

    async fn judge_dimension(
        &self,
        dimension: RubricDimension,
        content: &str,
        schema: &ResponseSchema,
        precision: Precision,
    ) -> Result<DimensionVerdict, ComponentError> {
        let payload = PromptPayload::new(
            prompt::dimension_instruction(dimension),
            content,
            schema.clone(),
        );
        let value = self
            .port
            .call(&payload, precision)
            .await
            .map_err(|e| ComponentError::from_llm(ComponentKind::Rubric, &e))?;
        serde_json::from_value(value).map_err(|e| {
            ComponentError::schema_invalid(
                ComponentKind::Rubric,
                format!("{} verdict: {}", dimension, e),
            )
        })
    }
}

#[async_trait]
impl RubricStrategy for MultiAgentStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MultiAgent
    }

    async fn score(
        &self,
        note: &ClinicalNote,
        precision: Precision,
    ) -> Result<RubricScore, ComponentError> {
        let schema = response_schema()?;
        let content = prompt::note_content(note.as_str());
        let verdicts = join_all(RubricDimension::ALL.iter().map(|&d| {
            let content = content.as_str();
            async move { (d, self.judge_dimension(d, content, schema, precision).await) }
        }))
        .await;
        reduce(verdicts)
    }
}

/// Deterministic reducer over the nine sub-judge results.
///
/// Failed dimensions get [`NEUTRAL_DIMENSION_SCORE`] and are listed in the
/// provenance. If every sub-judge failed the first failure is returned.
pub fn reduce(
    verdicts: Vec<(RubricDimension, Result<DimensionVerdict, ComponentError>)>,
) -> Result<RubricScore, ComponentError> {
    let mut scores = BTreeMap::new();
    let mut narratives = Vec::new();
    let mut failed = Vec::new();
    let mut first_error = None;

    for (dimension, verdict) in verdicts {
        match verdict {
            Ok(v) => {
                scores.insert(dimension, v.score);
                narratives.push(DimensionNarrative {
                    dimension,
                    narrative: v.rationale,
                    evidence_excerpts: v.evidence.into_iter().take(MAX_EVIDENCE).collect(),
                    improvement_suggestions: Vec::new(),
                });
            }
            Err(e) => {
                warn!(dimension = %dimension, error = %e, "sub-judge failed, using neutral score");
                scores.insert(dimension, NEUTRAL_DIMENSION_SCORE);
                failed.push(dimension);
                first_error.get_or_insert(e);
            }
        }
    }

    if failed.len() == RubricDimension::ALL.len() {
        return Err(first_error.unwrap_or_else(|| {
            ComponentError::internal(ComponentKind::Rubric, "no sub-judge results")
        }));
    }

    let summary = summarize(&scores, &failed);
    debug!(failed = failed.len(), "multi-agent rubric reduced");
    RubricScore::new(
        scores,
        RubricProvenance::MultiAgent {
            failed_dimensions: failed,
        },
    )
    .map(|r| r.with_summary(Some(summary)).with_narratives(narratives))
    .map_err(|e| ComponentError::schema_invalid(ComponentKind::Rubric, e.to_string()))
}

fn summarize(scores: &BTreeMap<RubricDimension, u8>, failed: &[RubricDimension]) -> String {
    let pick = |keep: fn(u8) -> bool| -> Vec<&'static str> {
        scores
            .iter()
            .filter(|(d, s)| !failed.contains(*d) && keep(**s))
            .map(|(d, _)| d.as_str())
            .collect()
    };
    let strong = pick(|s| s >= STRONG_AT);
    let weak = pick(|s| s <= WEAK_AT);

    let mut parts = Vec::new();
    if !strong.is_empty() {
        parts.push(format!("Strong in {}", strong.join(", ")));
    }
    if !weak.is_empty() {
        parts.push(format!("Needs improvement in {}", weak.join(", ")));
    }
    if parts.is_empty() {
        parts.push("Scores are moderate across all dimensions".to_string());
    }
    let mut summary = parts.join("; ");
    summary.push('.');
    summary
}
