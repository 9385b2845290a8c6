mod report;
mod runner;
mod system;

pub use runner::{run_job, RunSettings};
pub use system::JobSystem;

use self::report::report_results;
use crate::config::{Args, Config};
use crate::io::setup_output;
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use std::fs;
use tracing::info;

pub struct XcApplication {
    args: Args,
    config: Config,
}

impl XcApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args.config_file)?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref(), self.args.verbose);
        info!("Job read from {}", self.args.config_file);

        let system = JobSystem::from_config(&self.config)?;
        let settings = RunSettings::resolve(&self.args, &self.config);
        info!(
            "Functional {}, batch size {}, {} rank(s), quantities {:?}",
            settings.functional, settings.batch_size, settings.ranks, settings.quantities
        );

        let results = run_job(&system, &settings)?;
        report_results(&system, &results);
        Ok(())
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let config_content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", path))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults();

    Ok(config)
}
