use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::prompt;
use super::{RubricStrategy, StrategyKind};
use crate::error::{ComponentError, ComponentKind};
use crate::llm::{LlmPort, PromptPayload, ResponseSchema};
use crate::model::{
    ClinicalNote, DimensionNarrative, Precision, RubricDimension, RubricProvenance, RubricScore,
    MAX_DIMENSION_SCORE, MIN_DIMENSION_SCORE,
};

static SCHEMA: OnceLock<Result<ResponseSchema, String>> = OnceLock::new();

fn response_schema() -> Result<&'static ResponseSchema, ComponentError> {
    SCHEMA
        .get_or_init(|| {
            let mut score_props = Map::new();
            for d in RubricDimension::ALL {
                score_props.insert(
                    d.as_str().to_string(),
                    json!({
                        "type": "integer",
                        "minimum": MIN_DIMENSION_SCORE,
                        "maximum": MAX_DIMENSION_SCORE
                    }),
                );
            }
            let required: Vec<&str> = RubricDimension::ALL.iter().map(|d| d.as_str()).collect();
            ResponseSchema::compile(
                "pdqi9_single_judge",
                &json!({
                    "type": "object",
                    "required": ["scores", "summary"],
                    "properties": {
                        "scores": {
                            "type": "object",
                            "required": required,
                            "properties": score_props,
                            "additionalProperties": false
                        },
                        "average": {"type": "number"},
                        "summary": {"type": "string"},
                        "dimension_explanations": {
                            "type": "object",
                            "additionalProperties": {
                                "type": "object",
                                "required": ["narrative"],
                                "properties": {
                                    "narrative": {"type": "string"},
                                    "evidence": {"type": "array", "items": {"type": "string"}},
                                    "suggestions": {"type": "array", "items": {"type": "string"}}
                                }
                            }
                        }
                    }
                }),
            )
        })
        .as_ref()
        .map_err(|e| ComponentError::internal(ComponentKind::Rubric, e.clone()))
}

#[derive(Debug, Deserialize)]
struct JudgeResponse {
    scores: BTreeMap<RubricDimension, f64>,
    summary: String,
    #[serde(default)]
    dimension_explanations: BTreeMap<String, ExplanationWire>,
}

#[derive(Debug, Deserialize)]
struct ExplanationWire {
    narrative: String,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// All nine dimensions from one judge call.
pub struct SingleJudgeStrategy {
    port: Arc<dyn LlmPort>,
}

impl SingleJudgeStrategy {
    pub fn new(port: Arc<dyn LlmPort>) -> Self {
        Self { port }
    }
}

#[async_trait]
impl RubricStrategy for SingleJudgeStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SingleJudge
    }

    async fn score(
        &self,
        note: &ClinicalNote,
        precision: Precision,
    ) -> Result<RubricScore, ComponentError> {
        let payload = PromptPayload::new(
            prompt::single_judge_instruction(),
            prompt::note_content(note.as_str()),
            response_schema()?.clone(),
        );
        let value = self
            .port
            .call(&payload, precision)
            .await
            .map_err(|e| ComponentError::from_llm(ComponentKind::Rubric, &e))?;
        let rubric = parse_response(value)?;
        debug!(average = rubric.average(), "single-judge rubric scored");
        Ok(rubric)
    }
}

fn parse_response(value: Value) -> Result<RubricScore, ComponentError> {
    let invalid = |msg: String| ComponentError::schema_invalid(ComponentKind::Rubric, msg);
    let wire: JudgeResponse =
        serde_json::from_value(value).map_err(|e| invalid(format!("rubric response: {}", e)))?;

    let mut scores = BTreeMap::new();
    for (dimension, raw) in wire.scores {
        if raw.fract() != 0.0 || !(0.0..=255.0).contains(&raw) {
            return Err(invalid(format!("score {} for '{}' is not an integer", raw, dimension)));
        }
        scores.insert(dimension, raw as u8);
    }

    // Explanations under unknown keys are dropped rather than failing the score.
    let narratives = wire
        .dimension_explanations
        .into_iter()
        .filter_map(|(key, e)| {
            let dimension = RubricDimension::ALL.into_iter().find(|d| d.as_str() == key)?;
            Some(DimensionNarrative {
                dimension,
                narrative: e.narrative,
                evidence_excerpts: e.evidence,
                improvement_suggestions: e.suggestions,
            })
        })
        .collect();

    Ok(RubricScore::new(scores, RubricProvenance::SingleJudge)
        .map_err(|e| invalid(e.to_string()))?
        .with_summary(Some(wire.summary))
        .with_narratives(narratives))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputLimits;
    use crate::error::{FailureKind, LlmError};
    use crate::llm::mock::FnPort;

    fn note() -> ClinicalNote {
        ClinicalNote::parse("Assessment: stable. Plan: discharge.", &InputLimits::default())
            .unwrap()
    }

    fn full_response(score: u8) -> Value {
        let scores: Map<String, Value> = RubricDimension::ALL
            .iter()
            .map(|d| (d.as_str().to_string(), json!(score)))
            .collect();
        json!({
            "scores": scores,
            "average": score,
            "summary": "Clear and actionable.",
            "dimension_explanations": {
                "concise": {"narrative": "Short.", "evidence": ["Plan: discharge."]},
                "bogus": {"narrative": "ignored"}
            }
        })
    }

    #[test]
    fn schema_compiles() {
        response_schema().unwrap();
    }

    #[test]
    fn schema_rejects_missing_dimension_and_out_of_range() {
        let schema = response_schema().unwrap();
        let mut v = full_response(4);
        v["scores"].as_object_mut().unwrap().remove("actionable");
        assert!(!schema.is_valid(&v));

        let mut v = full_response(4);
        v["scores"]["accurate"] = json!(7);
        assert!(!schema.is_valid(&v));

        assert!(schema.is_valid(&full_response(4)));
    }

    #[tokio::test]
    async fn scores_all_dimensions_in_one_call() {
        let port = Arc::new(FnPort::new(|_| Ok(full_response(4))));
        let strategy = SingleJudgeStrategy::new(port.clone());
        let rubric = strategy.score(&note(), Precision::Medium).await.unwrap();

        assert_eq!(port.calls(), 1);
        assert_eq!(rubric.scores().len(), 9);
        assert_eq!(rubric.average(), 4.0);
        assert_eq!(rubric.summary(), Some("Clear and actionable."));
        assert_eq!(rubric.provenance(), &RubricProvenance::SingleJudge);
        assert_eq!(rubric.narratives().len(), 1);
        assert_eq!(rubric.narratives()[0].dimension, RubricDimension::Concise);
    }

    #[tokio::test]
    async fn average_is_recomputed_locally() {
        let port = Arc::new(FnPort::new(|_| {
            let mut v = full_response(2);
            v["average"] = json!(4.9);
            v["scores"]["useful"] = json!(5);
            Ok(v)
        }));
        let rubric = SingleJudgeStrategy::new(port)
            .score(&note(), Precision::Low)
            .await
            .unwrap();
        assert!((rubric.average() - 19.0 / 9.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn port_failures_become_component_errors() {
        let port = Arc::new(FnPort::new(|_| Err(LlmError::Unavailable)));
        let err = SingleJudgeStrategy::new(port)
            .score(&note(), Precision::Medium)
            .await
            .unwrap_err();
        assert_eq!(err.component, ComponentKind::Rubric);
        assert_eq!(err.kind, FailureKind::ServiceUnavailable);

        let port = Arc::new(FnPort::new(|_| {
            let mut v = full_response(3);
            v["scores"].as_object_mut().unwrap().remove("thorough");
            Ok(v)
        }));
        let err = SingleJudgeStrategy::new(port)
            .score(&note(), Precision::Medium)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::SchemaInvalidResponse);
    }
}
