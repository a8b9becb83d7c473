//! LLM judge access.
//!
//! Two layers:
//! - [`LlmClient`]: one raw chat completion over some transport.
//! - [`LlmPort`]: schema-validated structured calls, with retry, backoff,
//!   circuit breaking, per-precision timeouts and one JSON repair pass.
//!   [`ResilientLlm`] is the only implementation; components depend on the trait.

mod breaker;
mod json;
#[cfg(test)]
pub(crate) mod mock;
mod openai;
mod resilient;
mod schema;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LlmResult;
use crate::model::Precision;

pub use breaker::{CircuitBreaker, CircuitState, Permit};
pub use json::extract_json;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use resilient::ResilientLlm;
pub use schema::ResponseSchema;

/// One chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    /// Model to use instead of the client's default.
    pub model_override: Option<String>,
}

/// Raw transport to a chat-completion judge.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one request and return the assistant text.
    async fn complete(&self, request: &ChatRequest) -> LlmResult<String>;

    fn provider_name(&self) -> &'static str;
}

/// Instruction plus the schema its answer must satisfy.
#[derive(Debug, Clone)]
pub struct PromptPayload {
    /// System instruction for the judge.
    pub instruction: String,
    /// User content (note, claim, transcript excerpt).
    pub content: String,
    pub schema: ResponseSchema,
}

impl PromptPayload {
    pub fn new(
        instruction: impl Into<String>,
        content: impl Into<String>,
        schema: ResponseSchema,
    ) -> Self {
        Self {
            instruction: instruction.into(),
            content: content.into(),
            schema,
        }
    }
}

/// Structured calls to the judge. Safe to share across concurrent requests.
#[async_trait]
pub trait LlmPort: Send + Sync {
    /// Returns JSON that satisfies `payload.schema`.
    async fn call(&self, payload: &PromptPayload, precision: Precision) -> LlmResult<Value>;
}
