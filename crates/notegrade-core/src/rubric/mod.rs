//! PDQI-9 rubric scoring.
//!
//! Both strategies implement [`RubricStrategy`]; the grader picks one by
//! [`StrategyKind`] through [`RubricStrategies::select`].

mod multi_agent;
mod prompt;
mod single;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ComponentError;
use crate::llm::LlmPort;
use crate::model::{ClinicalNote, Precision, RubricScore};

pub use multi_agent::{reduce, DimensionVerdict, MultiAgentStrategy, NEUTRAL_DIMENSION_SCORE};
pub use single::SingleJudgeStrategy;

#[async_trait]
pub trait RubricStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn score(
        &self,
        note: &ClinicalNote,
        precision: Precision,
    ) -> Result<RubricScore, ComponentError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One call scoring all nine dimensions.
    #[default]
    SingleJudge,
    /// Nine concurrent sub-judges, one per dimension.
    MultiAgent,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleJudge => "single_judge",
            Self::MultiAgent => "multi_agent",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single" | "single_judge" => Ok(Self::SingleJudge),
            "multi" | "multi_agent" | "nine_rings" => Ok(Self::MultiAgent),
            other => Err(format!(
                "unknown rubric strategy '{}' (expected single|multi)",
                other
            )),
        }
    }
}

/// The two strategies, constructed once and selected per request.
#[derive(Clone)]
pub struct RubricStrategies {
    single: Arc<dyn RubricStrategy>,
    multi: Arc<dyn RubricStrategy>,
}

impl RubricStrategies {
    pub fn new(single: Arc<dyn RubricStrategy>, multi: Arc<dyn RubricStrategy>) -> Self {
        Self { single, multi }
    }

    /// Both strategies over one shared port.
    pub fn from_port(port: Arc<dyn LlmPort>) -> Self {
        Self::new(
            Arc::new(SingleJudgeStrategy::new(port.clone())),
            Arc::new(MultiAgentStrategy::new(port)),
        )
    }

    pub fn select(&self, kind: StrategyKind) -> &Arc<dyn RubricStrategy> {
        match kind {
            StrategyKind::SingleJudge => &self.single,
            StrategyKind::MultiAgent => &self.multi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kind_parses_aliases() {
        assert_eq!("single".parse::<StrategyKind>(), Ok(StrategyKind::SingleJudge));
        assert_eq!("Multi-Agent".parse::<StrategyKind>(), Ok(StrategyKind::MultiAgent));
        assert_eq!("nine_rings".parse::<StrategyKind>(), Ok(StrategyKind::MultiAgent));
        assert!("ensemble".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::default(), StrategyKind::SingleJudge);
    }
}
