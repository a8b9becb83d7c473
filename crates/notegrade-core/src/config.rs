//! Grading settings.
//!
//! [`GradingSettings`] is an immutable snapshot built once by the caller and
//! handed to the [`Grader`](crate::Grader) and every component at construction.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `NOTEGRADE_WEIGHT_RUBRIC` | `weights.rubric` |
//! | `NOTEGRADE_WEIGHT_HEURISTIC` | `weights.heuristic` |
//! | `NOTEGRADE_WEIGHT_FACTUALITY` | `weights.factuality` |
//! | `NOTEGRADE_GLOBAL_TIMEOUT_MS` | `global_timeout_ms` |
//! | `NOTEGRADE_MAX_NOTE_CHARS` | `limits.max_note_chars` |
//! | `NOTEGRADE_MAX_TRANSCRIPT_CHARS` | `limits.max_transcript_chars` |
//! | `NOTEGRADE_RETRY_MAX_ATTEMPTS` | `retry.max_attempts` |
//! | `NOTEGRADE_CIRCUIT_FAILURE_THRESHOLD` | `circuit.failure_threshold` |
//! | `NOTEGRADE_CIRCUIT_COOLDOWN_MS` | `circuit.cooldown_ms` |

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::hybrid::GradeThresholds;
use crate::model::{ComponentWeights, Precision};

const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradingSettings {
    pub weights: ComponentWeights,
    pub grade_thresholds: GradeThresholds,
    pub limits: InputLimits,
    /// Deadline for a whole request, shared by all three components.
    pub global_timeout_ms: u64,
    pub retry: RetryConfig,
    pub circuit: CircuitConfig,
    pub precision: PrecisionBudgets,
    pub heuristics: HeuristicConfig,
    pub factuality: FactualityConfig,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            weights: ComponentWeights::default(),
            grade_thresholds: GradeThresholds::default(),
            limits: InputLimits::default(),
            global_timeout_ms: 180_000,
            retry: RetryConfig::default(),
            circuit: CircuitConfig::default(),
            precision: PrecisionBudgets::default(),
            heuristics: HeuristicConfig::default(),
            factuality: FactualityConfig::default(),
        }
    }
}

impl GradingSettings {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Apply `NOTEGRADE_*` environment overrides and re-validate.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an explicit lookup.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "NOTEGRADE_WEIGHT_RUBRIC", &mut self.weights.rubric)?;
        override_from(&lookup, "NOTEGRADE_WEIGHT_HEURISTIC", &mut self.weights.heuristic)?;
        override_from(
            &lookup,
            "NOTEGRADE_WEIGHT_FACTUALITY",
            &mut self.weights.factuality,
        )?;
        override_from(&lookup, "NOTEGRADE_GLOBAL_TIMEOUT_MS", &mut self.global_timeout_ms)?;
        override_from(
            &lookup,
            "NOTEGRADE_MAX_NOTE_CHARS",
            &mut self.limits.max_note_chars,
        )?;
        override_from(
            &lookup,
            "NOTEGRADE_MAX_TRANSCRIPT_CHARS",
            &mut self.limits.max_transcript_chars,
        )?;
        override_from(
            &lookup,
            "NOTEGRADE_RETRY_MAX_ATTEMPTS",
            &mut self.retry.max_attempts,
        )?;
        override_from(
            &lookup,
            "NOTEGRADE_CIRCUIT_FAILURE_THRESHOLD",
            &mut self.circuit.failure_threshold,
        )?;
        override_from(
            &lookup,
            "NOTEGRADE_CIRCUIT_COOLDOWN_MS",
            &mut self.circuit.cooldown_ms,
        )?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        if [w.rubric, w.heuristic, w.factuality]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigError::invalid("weights must be finite and non-negative"));
        }
        if (w.sum() - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::invalid(format!(
                "weights must sum to 1.0, got {:.6}",
                w.sum()
            )));
        }
        self.grade_thresholds.validate()?;

        if self.limits.max_note_chars == 0 || self.limits.max_transcript_chars == 0 {
            return Err(ConfigError::invalid("input limits must be positive"));
        }
        if self.global_timeout_ms == 0 {
            return Err(ConfigError::invalid("global_timeout_ms must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms",
            ));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit.failure_threshold must be at least 1",
            ));
        }
        for level in [Precision::Low, Precision::Medium, Precision::High] {
            let budget = self.precision.for_precision(level);
            if budget.max_tokens == 0 || budget.timeout_ms == 0 {
                return Err(ConfigError::invalid(format!(
                    "precision.{} budget must be positive",
                    level
                )));
            }
        }
        let h = &self.heuristics;
        if h.ideal_min_words == 0 || h.ideal_min_words >= h.ideal_max_words {
            return Err(ConfigError::invalid(
                "heuristics.ideal_min_words must be positive and below ideal_max_words",
            ));
        }
        if !(0.0..1.0).contains(&h.redundancy_threshold) {
            return Err(ConfigError::invalid(
                "heuristics.redundancy_threshold must be in [0, 1)",
            ));
        }
        if h.min_structure_markers == 0 {
            return Err(ConfigError::invalid(
                "heuristics.min_structure_markers must be at least 1",
            ));
        }
        if self.factuality.max_claims == 0 {
            return Err(ConfigError::invalid("factuality.max_claims must be at least 1"));
        }
        Ok(())
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(format!("{}: cannot parse '{}'", key, raw)))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputLimits {
    pub max_note_chars: usize,
    pub max_transcript_chars: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_note_chars: 20_000,
            max_transcript_chars: 60_000,
        }
    }
}

/// Backoff for transient provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before a half-open trial call.
    pub cooldown_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

impl CircuitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrecisionBudget {
    pub max_tokens: u32,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl PrecisionBudget {
    fn new(max_tokens: u32, timeout_ms: u64) -> Self {
        Self {
            max_tokens,
            timeout_ms,
            model: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrecisionBudgets {
    pub low: PrecisionBudget,
    pub medium: PrecisionBudget,
    pub high: PrecisionBudget,
}

impl Default for PrecisionBudgets {
    fn default() -> Self {
        Self {
            low: PrecisionBudget::new(2_000, 30_000),
            medium: PrecisionBudget::new(4_000, 60_000),
            high: PrecisionBudget::new(8_000, 120_000),
        }
    }
}

impl PrecisionBudgets {
    pub fn for_precision(&self, precision: Precision) -> &PrecisionBudget {
        match precision {
            Precision::Low => &self.low,
            Precision::Medium => &self.medium,
            Precision::High => &self.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeuristicConfig {
    pub ideal_min_words: usize,
    pub ideal_max_words: usize,
    /// Repetition ratio at or below which a note counts as non-redundant.
    pub redundancy_threshold: f64,
    /// Distinct section markers needed for a full structure score.
    pub min_structure_markers: usize,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            ideal_min_words: 150,
            ideal_max_words: 600,
            redundancy_threshold: 0.05,
            min_structure_markers: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FactualityConfig {
    /// Claims beyond this count are dropped before entailment.
    pub max_claims: usize,
}

impl Default for FactualityConfig {
    fn default() -> Self {
        Self { max_claims: 12 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let s = GradingSettings::default();
        s.validate().unwrap();
        assert_eq!(s.weights, ComponentWeights::default());
        assert_eq!(s.precision.for_precision(Precision::High).max_tokens, 8_000);
        assert_eq!(s.global_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn partial_yaml_keeps_remaining_defaults() {
        let s = GradingSettings::from_yaml_str(
            "retry:\n  max_attempts: 5\nlimits:\n  max_note_chars: 1000\n",
        )
        .unwrap();
        assert_eq!(s.retry.max_attempts, 5);
        assert_eq!(s.retry.base_delay_ms, 500);
        assert_eq!(s.limits.max_note_chars, 1000);
        assert_eq!(s.limits.max_transcript_chars, 60_000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = GradingSettings::from_yaml_str("retries: 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = GradingSettings::from_yaml_str(
            "weights:\n  rubric: 0.5\n  heuristic: 0.2\n  factuality: 0.1\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn inverted_word_band_is_rejected() {
        let mut s = GradingSettings::default();
        s.heuristics.ideal_min_words = 700;
        assert!(s.validate().is_err());
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let vars: HashMap<&str, &str> = [
            ("NOTEGRADE_RETRY_MAX_ATTEMPTS", "7"),
            ("NOTEGRADE_CIRCUIT_COOLDOWN_MS", "250"),
        ]
        .into_iter()
        .collect();
        let s = GradingSettings::default()
            .apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(s.retry.max_attempts, 7);
        assert_eq!(s.circuit.cooldown(), Duration::from_millis(250));

        let err = GradingSettings::default()
            .apply_overrides_from(|k| (k == "NOTEGRADE_RETRY_MAX_ATTEMPTS").then(|| "x".into()))
            .unwrap_err();
        assert!(err.to_string().contains("NOTEGRADE_RETRY_MAX_ATTEMPTS"));

        let err = GradingSettings::default()
            .apply_overrides_from(|k| (k == "NOTEGRADE_WEIGHT_RUBRIC").then(|| "0.9".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grading.yaml");
        std::fs::write(&path, "global_timeout_ms: 1000\n").unwrap();
        let s = GradingSettings::from_yaml_file(&path).unwrap();
        assert_eq!(s.global_timeout_ms, 1000);

        let missing = GradingSettings::from_yaml_file(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
