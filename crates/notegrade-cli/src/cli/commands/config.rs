use crate::cli::args::ConfigArgs;
use crate::exit_codes;

pub fn run(args: ConfigArgs) -> anyhow::Result<i32> {
    let settings = super::load_settings(args.config.as_deref())?;
    print!("{}", serde_yaml::to_string(&settings)?);
    Ok(exit_codes::SUCCESS)
}
