use std::sync::Arc;

use anyhow::Context;
use notegrade_core::report::render_text;
use notegrade_core::{
    ClinicalNote, EncounterTranscript, GradeError, GradeOutcome, GradeRequest, Grader,
    OpenAiClient, OpenAiConfig, ResilientLlm,
};
use tracing::info;

use crate::cli::args::{GradeArgs, OutputFormat};
use crate::exit_codes;

pub async fn run(args: GradeArgs) -> anyhow::Result<i32> {
    let settings = super::load_settings(args.config.as_deref())?;
    let note = super::read_input(&args.note)?;
    let transcript = args
        .transcript
        .as_deref()
        .map(super::read_input)
        .transpose()?;

    // Input is checked before provider setup.
    let checked = ClinicalNote::parse(note.as_str(), &settings.limits).and_then(|_| {
        EncounterTranscript::parse_optional(transcript.clone(), &settings.limits)
    });
    if let Err(e) = checked {
        eprintln!("invalid input: {e}");
        return Ok(exit_codes::VALIDATION_ERROR);
    }

    let provider = OpenAiConfig::from_env()?;
    info!(model = %provider.model, "using judge model");
    let client = Arc::new(OpenAiClient::new(provider)?);
    let port = Arc::new(ResilientLlm::new(client, &settings));
    let grader = Grader::new(settings, port)?;

    let mut request = GradeRequest::new(note)
        .with_precision(args.precision)
        .with_strategy(args.strategy);
    if let Some(t) = transcript {
        request = request.with_transcript(t);
    }

    let result = grader.grade(request).await;
    if let Some(path) = &args.metrics_out {
        std::fs::write(path, grader.metrics().render_prometheus())
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
    }

    match result {
        Ok(outcome) => {
            print_outcome(&outcome, args.format)?;
            Ok(if outcome.is_degraded() {
                exit_codes::DEGRADED
            } else {
                exit_codes::SUCCESS
            })
        }
        Err(GradeError::Validation(e)) => {
            eprintln!("invalid input: {e}");
            Ok(exit_codes::VALIDATION_ERROR)
        }
        Err(e) => {
            eprintln!("grading failed [{}]: {e}", e.reason_code());
            Ok(exit_codes::FAILED)
        }
    }
}

fn print_outcome(outcome: &GradeOutcome, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => print!("{}", render_text(outcome)),
    }
    Ok(())
}
