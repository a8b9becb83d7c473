use notegrade_core::report::render_heuristics_text;
use notegrade_core::{ClinicalNote, HeuristicAnalyzer, TextAnalyzer};

use crate::cli::args::{HeuristicsArgs, OutputFormat};
use crate::exit_codes;

pub fn run(args: HeuristicsArgs) -> anyhow::Result<i32> {
    let settings = super::load_settings(args.config.as_deref())?;
    let text = super::read_input(&args.note)?;
    let note = match ClinicalNote::parse(text, &settings.limits) {
        Ok(note) => note,
        Err(e) => {
            eprintln!("invalid input: {e}");
            return Ok(exit_codes::VALIDATION_ERROR);
        }
    };

    let result = HeuristicAnalyzer::new(settings.heuristics).analyze(&note)?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print!("{}", render_heuristics_text(&result)),
    }
    Ok(exit_codes::SUCCESS)
}
