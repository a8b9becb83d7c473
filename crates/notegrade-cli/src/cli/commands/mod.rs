pub mod config;
pub mod grade;
pub mod heuristics;

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use notegrade_core::GradingSettings;

use super::args::{Cli, Command};

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Grade(args) => grade::run(args).await,
        Command::Heuristics(args) => heuristics::run(args),
        Command::Config(args) => config::run(args),
    }
}

/// Settings from an optional YAML file, then `NOTEGRADE_*` overrides.
pub(crate) fn load_settings(path: Option<&Path>) -> anyhow::Result<GradingSettings> {
    let settings = match path {
        Some(p) => GradingSettings::from_yaml_file(p)?,
        None => GradingSettings::default(),
    };
    Ok(settings.apply_env_overrides()?)
}

/// Read a text input; `-` means stdin.
pub(crate) fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
