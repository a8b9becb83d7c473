use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::{LlmPort, PromptPayload};
use crate::error::{LlmError, LlmResult};
use crate::model::Precision;

type Handler = Box<dyn Fn(&PromptPayload) -> LlmResult<Value> + Send + Sync>;

/// Port answering every call through a closure, validated like the real port.
pub(crate) struct FnPort {
    handler: Handler,
    calls: AtomicUsize,
}

impl FnPort {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&PromptPayload) -> LlmResult<Value> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmPort for FnPort {
    async fn call(&self, payload: &PromptPayload, _precision: Precision) -> LlmResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = (self.handler)(payload)?;
        payload
            .schema
            .validate(&value)
            .map_err(LlmError::schema_invalid)?;
        Ok(value)
    }
}
