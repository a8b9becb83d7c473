//! Error types for grading.
//!
//! Three layers, from the wire upwards:
//!
//! - [`LlmError`]: what a single judge call can fail with.
//! - [`ComponentError`]: the failure marker a pipeline component hands to the
//!   grader. Never escapes a request on its own.
//! - [`GradeError`]: request-level failures returned to the caller.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Failures surfaced by the LLM port.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    /// Network error, rate limit or 5xx. Retried with backoff.
    #[error("transient provider error: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Credentials rejected (401/403).
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Request exceeds provider limits (413 or context length).
    #[error("payload exceeds provider limits: {message}")]
    PayloadTooLarge { message: String },

    /// Any other non-retryable 4xx.
    #[error("provider rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response could not be parsed or failed schema validation after repair.
    #[error("response failed schema validation: {message}")]
    SchemaInvalid { message: String },

    /// Circuit breaker is open; no network call was made.
    #[error("service unavailable: circuit open")]
    Unavailable,

    /// A single attempt exceeded its precision budget.
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },
}

impl LlmError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn schema_invalid(message: impl Into<String>) -> Self {
        Self::SchemaInvalid {
            message: message.into(),
        }
    }

    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Whether the error says something about provider health.
    ///
    /// Client-side faults (auth, oversized payloads, bad JSON) do not trip the breaker.
    pub fn counts_against_circuit(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// Every transport failure is transient. An envelope that is not JSON is a
/// provider fault (proxy error page, truncated body), so it is retried too.
impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Transient {
                message: format!("failed to decode provider envelope: {}", err),
                retry_after: None,
            };
        }
        Self::Transient {
            message: err.to_string(),
            retry_after: None,
        }
    }
}

/// The three independent grading pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Rubric,
    Heuristic,
    Factuality,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rubric => "rubric",
            Self::Heuristic => "heuristic",
            Self::Factuality => "factuality",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a component failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransientProviderError,
    AuthError,
    SchemaInvalidResponse,
    ServiceUnavailable,
    TimeoutExceeded,
    ProviderRejected,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientProviderError => "transient_provider_error",
            Self::AuthError => "auth_error",
            Self::SchemaInvalidResponse => "schema_invalid_response",
            Self::ServiceUnavailable => "service_unavailable",
            Self::TimeoutExceeded => "timeout_exceeded",
            Self::ProviderRejected => "provider_rejected",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-component failure marker.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{component} failed ({kind}): {message}")]
pub struct ComponentError {
    pub component: ComponentKind,
    pub kind: FailureKind,
    pub message: String,
}

impl ComponentError {
    pub fn new(component: ComponentKind, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            component,
            kind,
            message: message.into(),
        }
    }

    pub fn from_llm(component: ComponentKind, err: &LlmError) -> Self {
        let kind = match err {
            LlmError::Transient { .. } => FailureKind::TransientProviderError,
            LlmError::Auth { .. } => FailureKind::AuthError,
            LlmError::PayloadTooLarge { .. } | LlmError::Rejected { .. } => {
                FailureKind::ProviderRejected
            }
            LlmError::SchemaInvalid { .. } => FailureKind::SchemaInvalidResponse,
            LlmError::Unavailable => FailureKind::ServiceUnavailable,
            LlmError::Timeout { .. } => FailureKind::TimeoutExceeded,
        };
        Self::new(component, kind, err.to_string())
    }

    pub fn schema_invalid(component: ComponentKind, message: impl Into<String>) -> Self {
        Self::new(component, FailureKind::SchemaInvalidResponse, message)
    }

    pub fn timeout(component: ComponentKind, after: Duration) -> Self {
        Self::new(
            component,
            FailureKind::TimeoutExceeded,
            format!("canceled at the request deadline ({} ms)", after.as_millis()),
        )
    }

    pub fn internal(component: ComponentKind, message: impl Into<String>) -> Self {
        Self::new(component, FailureKind::Internal, message)
    }
}

/// Input rejected at the validation boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("clinical note is empty")]
    EmptyNote,

    #[error("clinical note has {len} characters, maximum is {max}")]
    NoteTooLong { len: usize, max: usize },

    #[error("encounter transcript has {len} characters, maximum is {max}")]
    TranscriptTooLong { len: usize, max: usize },
}

/// Settings could not be loaded or are inconsistent.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid settings: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Request-level grading failure. No score is produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradeError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("all grading components failed: {}", summarize(.failures))]
    AllComponentsFailed { failures: Vec<ComponentError> },

    #[error("heuristic analyzer invariant violated: {message}")]
    HeuristicInvariant { message: String },

    #[error("runtime error: {message}")]
    Runtime { message: String },
}

impl GradeError {
    /// Stable reason code for callers that branch on failures.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::AllComponentsFailed { .. } => "all_components_failed",
            Self::HeuristicInvariant { .. } => "heuristic_invariant",
            Self::Runtime { .. } => "runtime_error",
        }
    }
}

fn summarize(failures: &[ComponentError]) -> String {
    failures
        .iter()
        .map(|f| format!("{}={}", f.component, f.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for port calls.
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_and_timeout_are_retryable() {
        assert!(LlmError::transient("503").is_retryable());
        assert!(LlmError::Timeout {
            after: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!LlmError::Auth {
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!LlmError::PayloadTooLarge {
            message: "too long".into()
        }
        .is_retryable());
        assert!(!LlmError::schema_invalid("missing key").is_retryable());
        assert!(!LlmError::Unavailable.is_retryable());
    }

    #[test]
    fn llm_errors_map_to_component_failure_kinds() {
        let cases = [
            (LlmError::transient("x"), FailureKind::TransientProviderError),
            (
                LlmError::Auth {
                    message: "x".into(),
                },
                FailureKind::AuthError,
            ),
            (
                LlmError::schema_invalid("x"),
                FailureKind::SchemaInvalidResponse,
            ),
            (LlmError::Unavailable, FailureKind::ServiceUnavailable),
            (
                LlmError::Timeout {
                    after: Duration::from_millis(5),
                },
                FailureKind::TimeoutExceeded,
            ),
            (
                LlmError::Rejected {
                    status: 400,
                    message: "x".into(),
                },
                FailureKind::ProviderRejected,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(ComponentError::from_llm(ComponentKind::Rubric, &err).kind, kind);
        }
    }

    #[test]
    fn all_failed_message_lists_components() {
        let err = GradeError::AllComponentsFailed {
            failures: vec![
                ComponentError::new(
                    ComponentKind::Rubric,
                    FailureKind::ServiceUnavailable,
                    "open",
                ),
                ComponentError::internal(ComponentKind::Heuristic, "boom"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("rubric=service_unavailable"));
        assert!(msg.contains("heuristic=internal"));
        assert_eq!(err.reason_code(), "all_components_failed");
    }
}
