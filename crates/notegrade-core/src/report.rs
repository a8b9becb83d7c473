//! Plain-text rendering of a graded note.

use std::fmt::Write as _;

use crate::model::{ComponentOutcome, GradeOutcome, HeuristicResult};

pub fn render_text(outcome: &GradeOutcome) -> String {
    let r = outcome.result();
    let mut out = String::new();

    let status = if outcome.is_degraded() {
        "DEGRADED"
    } else {
        "COMPLETE"
    };
    let _ = writeln!(out, "Grade: {}  ({:.2} / 5.00)  [{}]", r.grade, r.final_score, status);
    let _ = writeln!(out, "Request: {}", r.request_id);
    let _ = writeln!(out);

    let _ = writeln!(out, "Rubric (PDQI-9)");
    match &r.rubric {
        ComponentOutcome::Succeeded { result } => {
            for (dimension, score) in result.scores() {
                let _ = writeln!(out, "  {:<12} {}", dimension.as_str(), score);
            }
            let _ = writeln!(
                out,
                "  average {:.2}  total {}/45",
                result.average(),
                result.total()
            );
            if let Some(summary) = result.summary() {
                let _ = writeln!(out, "  {}", summary);
            }
        }
        ComponentOutcome::Failed { error } => {
            let _ = writeln!(out, "  failed: {} ({})", error.kind, error.message);
        }
    }
    let _ = writeln!(out);

    render_heuristics(&mut out, &r.heuristic);
    let _ = writeln!(out);

    let _ = writeln!(out, "Factuality");
    match &r.factuality {
        ComponentOutcome::Succeeded { result } => {
            let _ = writeln!(
                out,
                "  consistency {:.2}  claims checked {}",
                result.consistency_score(),
                result.claims_checked()
            );
            for claim in result.claims() {
                let _ = writeln!(out, "  - [{}] {}", claim.support.as_str(), claim.claim);
            }
            if let Some(summary) = result.summary() {
                let _ = writeln!(out, "  {}", summary);
            }
        }
        ComponentOutcome::Failed { error } => {
            let _ = writeln!(out, "  failed: {} ({})", error.kind, error.message);
        }
    }
    let _ = writeln!(out);

    let w = &r.applied_weights;
    let _ = writeln!(
        out,
        "Weights: rubric {:.2}  heuristic {:.2}  factuality {:.2}",
        w.rubric, w.heuristic, w.factuality
    );
    let _ = writeln!(out, "{}", r.integration_note);
    out
}

pub fn render_heuristics_text(h: &HeuristicResult) -> String {
    let mut out = String::new();
    render_heuristics(&mut out, h);
    out
}

fn render_heuristics(out: &mut String, h: &HeuristicResult) {
    let _ = writeln!(out, "Heuristics");
    let _ = writeln!(
        out,
        "  length {:.2}  redundancy {:.2}  structure {:.2}  composite {:.2}",
        h.length_score, h.redundancy_score, h.structure_score, h.composite_score
    );
    let _ = writeln!(
        out,
        "  {} words, {} characters",
        h.word_count, h.character_count
    );
}
