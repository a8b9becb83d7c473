use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use super::breaker::CircuitBreaker;
use super::json::{extract_json, repair_prompt};
use super::{ChatRequest, LlmClient, LlmPort, PromptPayload};
use crate::config::{GradingSettings, PrecisionBudgets, RetryConfig};
use crate::error::{LlmError, LlmResult};
use crate::model::Precision;

const JSON_ONLY_SUFFIX: &str = "Respond with a single JSON object only.";

/// [`LlmPort`] over an [`LlmClient`] with retry, circuit breaking and repair.
///
/// Cheap to clone; clones share the client and the breaker.
#[derive(Clone)]
pub struct ResilientLlm {
    client: Arc<dyn LlmClient>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
    budgets: PrecisionBudgets,
}

impl ResilientLlm {
    pub fn new(client: Arc<dyn LlmClient>, settings: &GradingSettings) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(&settings.circuit));
        Self::with_breaker(client, breaker, settings)
    }

    /// Share an existing breaker, e.g. between several ports to one provider.
    pub fn with_breaker(
        client: Arc<dyn LlmClient>,
        breaker: Arc<CircuitBreaker>,
        settings: &GradingSettings,
    ) -> Self {
        Self {
            client,
            breaker,
            retry: settings.retry.clone(),
            budgets: settings.precision.clone(),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    async fn send_with_retry(&self, request: &ChatRequest, timeout: Duration) -> LlmResult<String> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            // Open circuit: fail without touching the network.
            let permit = self.breaker.try_acquire()?;

            let result = match tokio::time::timeout(timeout, self.client.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout { after: timeout }),
            };

            let err = match result {
                Ok(text) => {
                    permit.succeed();
                    return Ok(text);
                }
                Err(e) => e,
            };

            if err.counts_against_circuit() {
                permit.fail();
            } else {
                drop(permit);
            }

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(err);
            }

            let backoff = self.backoff(attempt, &err);
            warn!(
                error = %err,
                provider = self.client.provider_name(),
                attempt,
                max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                "retrying judge call"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Full jitter over an exponential base; provider `Retry-After` hints get ±10%.
    fn backoff(&self, attempt: u32, err: &LlmError) -> Duration {
        let max = self.retry.max_delay_ms;
        let mut rng = rand::thread_rng();
        match err {
            LlmError::Transient {
                retry_after: Some(hint),
                ..
            } => {
                let base_ms = (hint.as_millis() as u64).min(max);
                let factor: f64 = rng.gen_range(0.9_f64..=1.1_f64);
                Duration::from_millis(((base_ms as f64) * factor).round() as u64)
            }
            _ => {
                let exp = 1_u64 << (attempt - 1).min(20);
                let base_ms = self.retry.base_delay_ms.saturating_mul(exp).min(max);
                Duration::from_millis(rng.gen_range(0..=base_ms))
            }
        }
    }
}

#[async_trait]
impl LlmPort for ResilientLlm {
    async fn call(&self, payload: &PromptPayload, precision: Precision) -> LlmResult<Value> {
        let budget = self.budgets.for_precision(precision);
        let request = ChatRequest {
            system: format!("{}\n\n{}", payload.instruction, JSON_ONLY_SUFFIX),
            user: payload.content.clone(),
            max_tokens: budget.max_tokens,
            model_override: budget.model.clone(),
        };
        let schema = &payload.schema;
        debug!(
            schema = schema.name(),
            precision = %precision,
            provider = self.client.provider_name(),
            content_chars = payload.content.chars().count(),
            "judge call"
        );

        let raw = self.send_with_retry(&request, budget.timeout()).await?;
        let problem = match parse_and_validate(&raw, payload) {
            Ok(value) => return Ok(value),
            Err(problem) => problem,
        };

        warn!(schema = schema.name(), problem = %problem, "judge response invalid, requesting repair");
        let repair = ChatRequest {
            user: format!(
                "{}\n\n{}",
                payload.content,
                repair_prompt(&schema.as_json().to_string(), &problem, &raw)
            ),
            ..request
        };
        let repaired = self.send_with_retry(&repair, budget.timeout()).await?;
        parse_and_validate(&repaired, payload)
            .map_err(|problem| LlmError::schema_invalid(format!("after repair: {}", problem)))
    }
}

fn parse_and_validate(raw: &str, payload: &PromptPayload) -> Result<Value, String> {
    let value = extract_json(raw)?;
    payload.schema.validate(&value)?;
    Ok(value)
}
