//! Deterministic text metrics: length, redundancy, structure.
//!
//! No I/O. The same note always yields the same [`HeuristicResult`].
//!
//! - **Length**: 5.0 inside `[ideal_min_words, ideal_max_words]`; outside the
//!   band `5·exp(-(excess/half_width)²)`, where `excess` is the distance past
//!   the nearest band edge and `half_width` is half the band width.
//! - **Redundancy**: repetition ratio is the larger of the repeated-trigram
//!   ratio and the duplicate-sentence ratio. 5.0 at or below the threshold
//!   `t`, then linear down to 0 at full repetition: `5·(1 - (ratio - t)/(1 - t))`.
//!   Continuous at the threshold.
//! - **Structure**: distinct section headers plus one marker each for numbered
//!   and bulleted lists. Reaches 5.0 at `min_structure_markers`.
//! - **Composite**: unweighted mean of the three.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::HeuristicConfig;
use crate::model::{ClinicalNote, HeuristicResult};

/// Notes shorter than this are too short to measure repetition.
const MIN_WORDS_FOR_REDUNDANCY: usize = 10;
const WALL_OF_TEXT_SCORE: f64 = 1.0;
const PARAGRAPHED_TEXT_SCORE: f64 = 1.5;
const MAX_SCORE: f64 = 5.0;

lazy_static! {
    /// `Assessment:`-style label at line start.
    static ref LABEL_HEADER: Regex =
        Regex::new(r"(?m)^[ \t]*([A-Za-z][A-Za-z /&()-]{1,40}?)[ \t]*:").unwrap();
    /// Markdown heading.
    static ref MARKDOWN_HEADER: Regex = Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+(\S.*)$").unwrap();
    /// Line in capitals only, e.g. `PLAN`.
    static ref CAPS_HEADER: Regex = Regex::new(r"(?m)^[ \t]*([A-Z][A-Z /&-]{2,40})[ \t]*$").unwrap();
    static ref NUMBERED_ITEM: Regex = Regex::new(r"(?m)^[ \t]*\d{1,3}[.)][ \t]+\S").unwrap();
    static ref BULLET_ITEM: Regex = Regex::new(r"(?m)^[ \t]*[-*•][ \t]+\S").unwrap();
    static ref NON_WORD: Regex = Regex::new(r"[^\p{L}\p{N}\s]+").unwrap();
    static ref SENTENCE_BREAK: Regex = Regex::new(r"[.!?\n]+").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeuristicError {
    #[error("note contains no words")]
    EmptyText,

    #[error("{metric} produced a non-finite value")]
    NonFinite { metric: &'static str },
}

/// Pure, synchronous analysis of a note.
pub trait TextAnalyzer: Send + Sync {
    fn analyze(&self, note: &ClinicalNote) -> Result<HeuristicResult, HeuristicError>;
}

#[derive(Debug, Clone)]
pub struct HeuristicAnalyzer {
    config: HeuristicConfig,
}

impl HeuristicAnalyzer {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    pub fn length_score(&self, word_count: usize) -> f64 {
        let min = self.config.ideal_min_words as f64;
        let max = self.config.ideal_max_words as f64;
        let words = word_count as f64;
        let excess = if words < min {
            min - words
        } else if words > max {
            words - max
        } else {
            return MAX_SCORE;
        };
        let half_width = ((max - min) / 2.0).max(1.0);
        MAX_SCORE * (-(excess / half_width).powi(2)).exp()
    }

    pub fn redundancy_score(&self, text: &str) -> f64 {
        self.redundancy_for_ratio(repetition_ratio(text))
    }

    fn redundancy_for_ratio(&self, ratio: f64) -> f64 {
        let t = self.config.redundancy_threshold;
        if ratio <= t {
            return MAX_SCORE;
        }
        let excess = (ratio - t) / (1.0 - t).max(f64::EPSILON);
        (MAX_SCORE * (1.0 - excess)).clamp(0.0, MAX_SCORE)
    }

    pub fn structure_score(&self, text: &str) -> f64 {
        let markers = count_structure_markers(text);
        let base = if text.trim().lines().count() > 1 {
            PARAGRAPHED_TEXT_SCORE
        } else {
            WALL_OF_TEXT_SCORE
        };
        if markers == 0 {
            return base;
        }
        let coverage =
            (markers as f64 / self.config.min_structure_markers as f64).min(1.0);
        base + (MAX_SCORE - base) * coverage
    }
}

impl TextAnalyzer for HeuristicAnalyzer {
    fn analyze(&self, note: &ClinicalNote) -> Result<HeuristicResult, HeuristicError> {
        let text = note.as_str();
        let word_count = text.split_whitespace().count();
        if word_count == 0 {
            return Err(HeuristicError::EmptyText);
        }

        let length_score = round2(finite("length", self.length_score(word_count))?);
        let redundancy_score = round2(finite("redundancy", self.redundancy_score(text))?);
        let structure_score = round2(finite("structure", self.structure_score(text))?);
        let composite_score = composite(length_score, redundancy_score, structure_score);

        tracing::debug!(
            word_count,
            length_score,
            redundancy_score,
            structure_score,
            composite_score,
            "heuristics computed"
        );

        Ok(HeuristicResult {
            length_score,
            redundancy_score,
            structure_score,
            composite_score,
            word_count,
            character_count: note.char_count(),
        })
    }
}

/// The composite as a function of the three rounded sub-scores.
pub fn composite(length: f64, redundancy: f64, structure: f64) -> f64 {
    round2((length + redundancy + structure) / 3.0)
}

fn finite(metric: &'static str, v: f64) -> Result<f64, HeuristicError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(HeuristicError::NonFinite { metric })
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn normalized_words(text: &str) -> Vec<String> {
    NON_WORD
        .replace_all(&text.to_lowercase(), " ")
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

fn repetition_ratio(text: &str) -> f64 {
    let words = normalized_words(text);
    if words.len() < MIN_WORDS_FOR_REDUNDANCY {
        return 0.0;
    }

    let trigrams: Vec<_> = words.windows(3).collect();
    let unique_trigrams: HashSet<_> = trigrams.iter().collect();
    let trigram_ratio = 1.0 - unique_trigrams.len() as f64 / trigrams.len() as f64;

    let sentences: Vec<String> = SENTENCE_BREAK
        .split(text)
        .map(|s| normalized_words(s).join(" "))
        .filter(|s| !s.is_empty())
        .collect();
    let sentence_ratio = if sentences.is_empty() {
        0.0
    } else {
        let unique: HashSet<_> = sentences.iter().collect();
        1.0 - unique.len() as f64 / sentences.len() as f64
    };

    trigram_ratio.max(sentence_ratio)
}

fn count_structure_markers(text: &str) -> usize {
    let mut headers: HashSet<String> = HashSet::new();
    for re in [&*LABEL_HEADER, &*MARKDOWN_HEADER, &*CAPS_HEADER] {
        for cap in re.captures_iter(text) {
            if let Some(label) = cap.get(1) {
                headers.insert(label.as_str().trim().to_lowercase());
            }
        }
    }
    let numbered = usize::from(NUMBERED_ITEM.is_match(text));
    let bulleted = usize::from(BULLET_ITEM.is_match(text));
    headers.len() + numbered + bulleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputLimits;

    fn analyzer() -> HeuristicAnalyzer {
        HeuristicAnalyzer::new(HeuristicConfig::default())
    }

    fn note(text: &str) -> ClinicalNote {
        ClinicalNote::parse(text, &InputLimits::default()).unwrap()
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn length_plateaus_inside_band() {
        let a = analyzer();
        assert_eq!(a.length_score(150), 5.0);
        assert_eq!(a.length_score(400), 5.0);
        assert_eq!(a.length_score(600), 5.0);
    }

    #[test]
    fn length_penalty_is_monotonic_and_symmetric() {
        let a = analyzer();
        let mut prev = a.length_score(150);
        for w in (0..150).rev() {
            let s = a.length_score(w);
            assert!(s <= prev);
            prev = s;
        }
        for excess in [1, 50, 100, 225, 400] {
            let below = a.length_score(150 - excess.min(150));
            let above = a.length_score(600 + excess.min(150));
            assert!((below - above).abs() < 1e-12);
        }
        assert!(a.length_score(5000) < 0.01);
    }

    #[test]
    fn short_example_note() {
        let result = analyzer()
            .analyze(&note(
                "Patient ambulates independently. No falls. Discharge planned.",
            ))
            .unwrap();
        assert_eq!(result.word_count, 7);
        assert!(result.length_score < 5.0);
        assert_eq!(result.redundancy_score, 5.0);
        assert_eq!(result.character_count, 61);
        assert_eq!(
            result.composite_score,
            composite(
                result.length_score,
                result.redundancy_score,
                result.structure_score
            )
        );
    }

    #[test]
    fn repeated_sentences_lower_redundancy() {
        let a = analyzer();
        let clean = "Patient reports chest pain since morning. Vitals stable on arrival. \
                     ECG shows sinus rhythm. Troponin pending. Plan admit for observation.";
        let repeated = "Patient reports chest pain. Patient reports chest pain. \
                        Patient reports chest pain. Patient reports chest pain. Plan admit.";
        assert_eq!(a.redundancy_score(clean), 5.0);
        let low = a.redundancy_score(repeated);
        assert!(low < 3.0, "got {}", low);
    }

    #[test]
    fn redundancy_is_continuous_at_threshold() {
        let a = analyzer();
        let t = a.config.redundancy_threshold;
        assert_eq!(a.redundancy_for_ratio(t), 5.0);
        let just_above = a.redundancy_for_ratio(t + 1e-9);
        assert!(5.0 - just_above < 1e-6, "got {}", just_above);
        assert_eq!(a.redundancy_for_ratio(1.0), 0.0);

        let mid = a.redundancy_for_ratio((1.0 + t) / 2.0);
        assert!((mid - 2.5).abs() < 1e-9, "got {}", mid);
        assert!(a.redundancy_for_ratio(0.3) > a.redundancy_for_ratio(0.6));
    }

    #[test]
    fn structure_rewards_sections_and_lists() {
        let a = analyzer();
        let wall = words(80);
        assert_eq!(a.structure_score(&wall), WALL_OF_TEXT_SCORE);

        let soap = "Subjective: cough for 3 days\n\
                    Objective: afebrile, clear lungs\n\
                    Assessment: viral URI\n\
                    Plan:\n\
                    1. fluids\n\
                    2. return if worse\n";
        assert_eq!(a.structure_score(soap), 5.0);

        let partial = "Subjective: cough\nPlan: rest";
        let s = a.structure_score(partial);
        assert!(s > PARAGRAPHED_TEXT_SCORE && s < 5.0);
    }

    #[test]
    fn analysis_is_deterministic() {
        let text = format!("HPI: {}\n- item one\n- item two\nPLAN\n{}", words(200), words(50));
        let n = note(&text);
        let a = analyzer();
        let first = a.analyze(&n).unwrap();
        for _ in 0..5 {
            assert_eq!(a.analyze(&n).unwrap(), first);
        }
        for s in [
            first.length_score,
            first.redundancy_score,
            first.structure_score,
            first.composite_score,
        ] {
            assert!((0.0..=5.0).contains(&s));
        }
    }
}
