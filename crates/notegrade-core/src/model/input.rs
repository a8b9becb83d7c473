use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::InputLimits;
use crate::error::ValidationError;

/// Validated note text: non-empty and within the configured ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicalNote {
    text: String,
    chars: usize,
}

impl ClinicalNote {
    pub fn parse(text: impl Into<String>, limits: &InputLimits) -> Result<Self, ValidationError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyNote);
        }
        let chars = text.chars().count();
        if chars > limits.max_note_chars {
            return Err(ValidationError::NoteTooLong {
                len: chars,
                max: limits.max_note_chars,
            });
        }
        Ok(Self { text, chars })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.chars
    }
}

/// Optional reference transcript of the encounter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncounterTranscript {
    text: String,
}

impl EncounterTranscript {
    /// Blank transcripts are treated as absent.
    pub fn parse_optional(
        text: Option<String>,
        limits: &InputLimits,
    ) -> Result<Option<Self>, ValidationError> {
        let Some(text) = text else {
            return Ok(None);
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        let len = text.chars().count();
        if len > limits.max_transcript_chars {
            return Err(ValidationError::TranscriptTooLong {
                len,
                max: limits.max_transcript_chars,
            });
        }
        Ok(Some(Self { text }))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Judge precision level; selects token and time budgets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Low,
    #[default]
    Medium,
    High,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "unknown precision '{}' (expected low|medium|high)",
                other
            )),
        }
    }
}
