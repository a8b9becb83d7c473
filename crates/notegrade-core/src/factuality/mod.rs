//! Claim-level consistency of a note against the encounter transcript.
//!
//! One extraction call splits the note into claims (at most
//! `factuality.max_claims`), then one entailment call per claim labels it.
//! Claims whose entailment call fails are labelled `Uncertain`.
//! Consistency is `5 × (supported + 0.5 × uncertain) / claims`.

mod prompt;

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::FactualityConfig;
use crate::error::{ComponentError, ComponentKind};
use crate::llm::{LlmPort, PromptPayload, ResponseSchema};
use crate::model::{
    ClaimJudgment, ClinicalNote, EncounterTranscript, FactualityResult, Precision, SupportLabel,
};

static EXTRACTION_SCHEMA: OnceLock<Result<ResponseSchema, String>> = OnceLock::new();
static ENTAILMENT_SCHEMA: OnceLock<Result<ResponseSchema, String>> = OnceLock::new();

fn extraction_schema() -> Result<&'static ResponseSchema, ComponentError> {
    EXTRACTION_SCHEMA
        .get_or_init(|| {
            ResponseSchema::compile(
                "claim_extraction",
                &json!({
                    "type": "object",
                    "required": ["claims"],
                    "properties": {
                        "claims": {"type": "array", "items": {"type": "string"}}
                    }
                }),
            )
        })
        .as_ref()
        .map_err(|e| ComponentError::internal(ComponentKind::Factuality, e.clone()))
}

fn entailment_schema() -> Result<&'static ResponseSchema, ComponentError> {
    ENTAILMENT_SCHEMA
        .get_or_init(|| {
            ResponseSchema::compile(
                "claim_entailment",
                &json!({
                    "type": "object",
                    "required": ["label"],
                    "properties": {
                        "label": {"enum": ["Supported", "Not Supported", "Uncertain"]},
                        "explanation": {"type": "string"}
                    }
                }),
            )
        })
        .as_ref()
        .map_err(|e| ComponentError::internal(ComponentKind::Factuality, e.clone()))
}

#[derive(Debug, Deserialize)]
struct ExtractedClaims {
    claims: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Entailment {
    label: SupportLabel,
    #[serde(default)]
    explanation: String,
}

#[async_trait]
pub trait ConsistencyChecker: Send + Sync {
    async fn check(
        &self,
        note: &ClinicalNote,
        transcript: Option<&EncounterTranscript>,
        precision: Precision,
    ) -> Result<FactualityResult, ComponentError>;
}

pub struct FactualityChecker {
    port: Arc<dyn LlmPort>,
    config: FactualityConfig,
}

impl FactualityChecker {
    pub fn new(port: Arc<dyn LlmPort>, config: FactualityConfig) -> Self {
        Self { port, config }
    }

    async fn extract_claims(
        &self,
        note: &ClinicalNote,
        precision: Precision,
    ) -> Result<Vec<String>, ComponentError> {
        let payload = PromptPayload::new(
            prompt::EXTRACTION_INSTRUCTION,
            prompt::extraction_content(note.as_str()),
            extraction_schema()?.clone(),
        );
        let value = self
            .port
            .call(&payload, precision)
            .await
            .map_err(|e| ComponentError::from_llm(ComponentKind::Factuality, &e))?;
        let extracted: ExtractedClaims = serde_json::from_value(value).map_err(|e| {
            ComponentError::schema_invalid(ComponentKind::Factuality, format!("claims: {}", e))
        })?;

        let mut seen = HashSet::new();
        let claims: Vec<String> = extracted
            .claims
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && seen.insert(c.to_lowercase()))
            .collect();
        if claims.len() > self.config.max_claims {
            debug!(
                extracted = claims.len(),
                max_claims = self.config.max_claims,
                "truncating extracted claims"
            );
        }
        Ok(claims.into_iter().take(self.config.max_claims).collect())
    }

    async fn judge_claim(
        &self,
        claim: String,
        transcript: &str,
        schema: &ResponseSchema,
        precision: Precision,
    ) -> ClaimJudgment {
        let payload = PromptPayload::new(
            prompt::ENTAILMENT_INSTRUCTION,
            prompt::entailment_content(transcript, &claim),
            schema.clone(),
        );
        let result = self
            .port
            .call(&payload, precision)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::from_value::<Entailment>(v).map_err(|e| e.to_string()));

        match result {
            Ok(e) => ClaimJudgment {
                claim,
                support: e.label,
                explanation: e.explanation,
            },
            Err(reason) => {
                warn!(error = %reason, "claim entailment failed, marking uncertain");
                ClaimJudgment {
                    claim,
                    support: SupportLabel::Uncertain,
                    explanation: format!("could not be resolved: {}", reason),
                }
            }
        }
    }
}

#[async_trait]
impl ConsistencyChecker for FactualityChecker {
    async fn check(
        &self,
        note: &ClinicalNote,
        transcript: Option<&EncounterTranscript>,
        precision: Precision,
    ) -> Result<FactualityResult, ComponentError> {
        let Some(transcript) = transcript else {
            debug!("no transcript, factuality is neutral");
            return Ok(FactualityResult::neutral(
                "no transcript supplied, consistency not checked",
            ));
        };

        let claims = self.extract_claims(note, precision).await?;
        if claims.is_empty() {
            return Ok(FactualityResult::from_judgments(Vec::new()));
        }

        let schema = entailment_schema()?;
        let judgments = join_all(
            claims
                .into_iter()
                .map(|claim| self.judge_claim(claim, transcript.as_str(), schema, precision)),
        )
        .await;

        let result = FactualityResult::from_judgments(judgments);
        debug!(
            claims_checked = result.claims_checked(),
            consistency = result.consistency_score(),
            "factuality checked"
        );
        Ok(result)
    }
}
