use clap::{Parser, Subcommand, ValueEnum};
use notegrade_core::{Precision, StrategyKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "notegrade",
    version,
    about = "Hybrid documentation-quality grading for clinical notes (PDQI-9 rubric, heuristics, factuality)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Grade a note with the LLM judge, heuristics and factuality check
    Grade(GradeArgs),
    /// Run only the offline heuristic analyzer (no LLM)
    Heuristics(HeuristicsArgs),
    /// Print the effective grading settings as YAML
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct GradeArgs {
    /// Clinical note file, or `-` for stdin
    #[arg(long)]
    pub note: PathBuf,

    /// Encounter transcript file; factuality is neutral without it
    #[arg(long)]
    pub transcript: Option<PathBuf>,

    /// Judge budget: low, medium or high
    #[arg(long, default_value = "medium")]
    pub precision: Precision,

    /// Rubric strategy: single or multi
    #[arg(long, default_value = "single")]
    pub strategy: StrategyKind,

    /// Grading settings YAML (defaults apply when omitted)
    #[arg(long, env = "NOTEGRADE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Write grading metrics (Prometheus text format) to this file
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct HeuristicsArgs {
    /// Clinical note file, or `-` for stdin
    #[arg(long)]
    pub note: PathBuf,

    #[arg(long, env = "NOTEGRADE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Settings YAML to load before environment overrides
    #[arg(long, env = "NOTEGRADE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
