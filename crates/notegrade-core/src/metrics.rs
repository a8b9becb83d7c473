//! In-process grading metrics.
//!
//! Three instruments, labelled with low-cardinality values only:
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `notegrade_requests_total` | counter | `precision`, `strategy`, `status` |
//! | `notegrade_grading_duration_seconds` | histogram | `precision`, `strategy` |
//! | `notegrade_pdqi_score` | histogram | `dimension`, `strategy` |
//!
//! `status` is `complete`, `degraded` or the failure reason code
//! (`validation_error`, `all_components_failed`, ...). Dimension scores are
//! observed only when the rubric component succeeded.
//!
//! [`GradingMetrics::render_prometheus`] emits the Prometheus text format.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::error::GradeError;
use crate::model::{GradeOutcome, Precision, RubricDimension, RubricScore};
use crate::rubric::StrategyKind;

/// Upper bounds (seconds) for request latency.
pub const DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 180.0];

/// Upper bounds for PDQI-9 dimension scores.
pub const SCORE_BUCKETS: &[f64] = &[1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0];

const REQUESTS: &str = "notegrade_requests_total";
const DURATION: &str = "notegrade_grading_duration_seconds";
const PDQI: &str = "notegrade_pdqi_score";

/// Fixed-bucket histogram. `buckets[i]` counts observations `<= bounds[i]`
/// that did not fit an earlier bucket; overflow only shows in `count`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    bounds: &'static [f64],
    buckets: Vec<u64>,
    count: u64,
    sum: f64,
}

impl Histogram {
    fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            buckets: vec![0; bounds.len()],
            count: 0,
            sum: 0.0,
        }
    }

    fn observe(&mut self, value: f64) {
        if let Some(i) = self.bounds.iter().position(|b| value <= *b) {
            self.buckets[i] += 1;
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// `(upper bound, observations <= bound)` pairs, as Prometheus reports them.
    pub fn cumulative(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        self.bounds
            .iter()
            .zip(&self.buckets)
            .map(|(&bound, &n)| {
                running += n;
                (bound, running)
            })
            .collect()
    }
}

type RequestKey = (&'static str, &'static str, &'static str);
type PairKey = (&'static str, &'static str);

#[derive(Debug, Default)]
struct Registry {
    requests: BTreeMap<RequestKey, u64>,
    durations: BTreeMap<PairKey, Histogram>,
    scores: BTreeMap<PairKey, Histogram>,
}

/// Thread-safe metric registry shared by every request a [`Grader`](crate::Grader) serves.
#[derive(Debug, Default)]
pub struct GradingMetrics {
    inner: Mutex<Registry>,
}

/// Label for a finished request.
pub fn request_status(result: &Result<GradeOutcome, GradeError>) -> &'static str {
    match result {
        Ok(GradeOutcome::Complete(_)) => "complete",
        Ok(GradeOutcome::Degraded(_)) => "degraded",
        Err(e) => e.reason_code(),
    }
}

impl GradingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the request, time it, and observe rubric scores when present.
    pub fn record_outcome(
        &self,
        precision: Precision,
        strategy: StrategyKind,
        result: &Result<GradeOutcome, GradeError>,
        elapsed: Duration,
    ) {
        self.record_request(precision, strategy, request_status(result), elapsed);
        if let Some(score) = result
            .as_ref()
            .ok()
            .and_then(|outcome| outcome.result().rubric.result())
        {
            self.record_scores(strategy, score);
        }
    }

    pub fn record_request(
        &self,
        precision: Precision,
        strategy: StrategyKind,
        status: &'static str,
        elapsed: Duration,
    ) {
        let mut registry = self.lock();
        *registry
            .requests
            .entry((precision.as_str(), strategy.as_str(), status))
            .or_default() += 1;
        registry
            .durations
            .entry((precision.as_str(), strategy.as_str()))
            .or_insert_with(|| Histogram::new(DURATION_BUCKETS))
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_scores(&self, strategy: StrategyKind, score: &RubricScore) {
        let mut registry = self.lock();
        for (dimension, &value) in score.scores() {
            registry
                .scores
                .entry((dimension.as_str(), strategy.as_str()))
                .or_insert_with(|| Histogram::new(SCORE_BUCKETS))
                .observe(f64::from(value));
        }
    }

    pub fn requests(&self, precision: Precision, strategy: StrategyKind, status: &str) -> u64 {
        self.lock()
            .requests
            .iter()
            .find(|((p, s, st), _)| *p == precision.as_str() && *s == strategy.as_str() && *st == status)
            .map_or(0, |(_, n)| *n)
    }

    pub fn total_requests(&self) -> u64 {
        self.lock().requests.values().sum()
    }

    pub fn duration(&self, precision: Precision, strategy: StrategyKind) -> Option<Histogram> {
        self.lock()
            .durations
            .get(&(precision.as_str(), strategy.as_str()))
            .cloned()
    }

    pub fn score_distribution(
        &self,
        dimension: RubricDimension,
        strategy: StrategyKind,
    ) -> Option<Histogram> {
        self.lock()
            .scores
            .get(&(dimension.as_str(), strategy.as_str()))
            .cloned()
    }

    pub fn render_prometheus(&self) -> String {
        let registry = self.lock();
        let mut out = String::new();

        out.push_str(&format!(
            "# HELP {REQUESTS} Grading requests by outcome.\n# TYPE {REQUESTS} counter\n"
        ));
        for ((precision, strategy, status), n) in &registry.requests {
            out.push_str(&format!(
                "{REQUESTS}{{precision=\"{precision}\",strategy=\"{strategy}\",status=\"{status}\"}} {n}\n"
            ));
        }

        out.push_str(&format!(
            "# HELP {DURATION} Time spent grading one note.\n# TYPE {DURATION} histogram\n"
        ));
        for ((precision, strategy), h) in &registry.durations {
            render_histogram(
                &mut out,
                DURATION,
                &format!("precision=\"{precision}\",strategy=\"{strategy}\""),
                h,
            );
        }

        out.push_str(&format!(
            "# HELP {PDQI} PDQI-9 dimension scores.\n# TYPE {PDQI} histogram\n"
        ));
        for ((dimension, strategy), h) in &registry.scores {
            render_histogram(
                &mut out,
                PDQI,
                &format!("dimension=\"{dimension}\",strategy=\"{strategy}\""),
                h,
            );
        }
        out
    }
}

fn render_histogram(out: &mut String, name: &str, labels: &str, h: &Histogram) {
    for (bound, n) in h.cumulative() {
        out.push_str(&format!("{name}_bucket{{{labels},le=\"{bound}\"}} {n}\n"));
    }
    out.push_str(&format!("{name}_bucket{{{labels},le=\"+Inf\"}} {}\n", h.count));
    out.push_str(&format!("{name}_sum{{{labels}}} {}\n", h.sum));
    out.push_str(&format!("{name}_count{{{labels}}} {}\n", h.count));
}
