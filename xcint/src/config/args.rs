//! Command-line argument parsing for XC integration jobs

use clap::Parser;

/// Exchange-correlation integration with YAML job description
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override the functional (slater, pbe_x)
    #[arg(long)]
    pub functional: Option<String>,

    /// Override the number of worker threads per rank
    #[arg(long)]
    pub num_threads: Option<usize>,

    /// Override the maximum number of points per task
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override the number of in-process ranks
    #[arg(long)]
    pub ranks: Option<usize>,

    /// Log debug messages
    #[arg(short, long)]
    pub verbose: bool,
}
