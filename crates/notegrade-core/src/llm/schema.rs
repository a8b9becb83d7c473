use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Maximum validation errors reported per response.
const MAX_REPORTED_ERRORS: usize = 5;

/// A compiled JSON Schema a judge response must satisfy.
#[derive(Clone)]
pub struct ResponseSchema {
    name: &'static str,
    source: Arc<Value>,
    validator: Arc<jsonschema::Validator>,
}

impl ResponseSchema {
    /// Compile `schema`. Schemas are crate constants, so failure here is a
    /// programming error reported as a message.
    pub fn compile(name: &'static str, schema: &Value) -> Result<Self, String> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| format!("invalid {} schema: {}", name, e))?;
        Ok(Self {
            name,
            source: Arc::new(schema.clone()),
            validator: Arc::new(validator),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The schema document, sent to the judge on repair.
    pub fn as_json(&self) -> &Value {
        &self.source
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    pub fn validate(&self, instance: &Value) -> Result<(), String> {
        if self.validator.is_valid(instance) {
            return Ok(());
        }
        let errors: Vec<String> = self
            .validator
            .iter_errors(instance)
            .take(MAX_REPORTED_ERRORS)
            .map(|e| e.to_string())
            .collect();
        Err(format!("{}: {}", self.name, errors.join("; ")))
    }
}

impl fmt::Debug for ResponseSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSchema")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label_schema() -> ResponseSchema {
        ResponseSchema::compile(
            "label",
            &json!({
                "type": "object",
                "required": ["label"],
                "properties": {"label": {"enum": ["yes", "no"]}}
            }),
        )
        .unwrap()
    }

    #[test]
    fn validates_and_reports_errors() {
        let schema = label_schema();
        assert!(schema.validate(&json!({"label": "yes"})).is_ok());
        let err = schema.validate(&json!({"label": "maybe"})).unwrap_err();
        assert!(err.starts_with("label:"));
        assert!(err.contains("maybe"));
        assert!(!schema.is_valid(&json!({})));
    }

    #[test]
    fn rejects_malformed_schema() {
        let err = ResponseSchema::compile("bad", &json!({"type": 12})).unwrap_err();
        assert!(err.contains("invalid bad schema"));
    }
}
