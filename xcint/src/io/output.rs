//! Logging setup and result formatting

use nalgebra::DMatrix;
use std::fmt;
use std::fs::File;
use std::time::SystemTime as StdSystemTime;
use tracing::info;
use tracing_subscriber::{
    filter::LevelFilter, fmt::format::Writer, fmt::layer, fmt::time::FormatTime,
    layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

/// Wall-clock HH:MM:SS, no sub-second digits
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = StdSystemTime::now();
        let duration = now
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        let total_seconds = duration.as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Route log output to `output_path`, or to stdout when none is given.
///
/// `verbose` lowers the level to debug, which includes per-task and
/// per-rank scheduling messages from the library.
pub fn setup_output(output_path: Option<&String>, verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    match output_path {
        Some(path) => match File::create(path) {
            Ok(log) => {
                let file_layer = layer()
                    .with_writer(log)
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(level);
                Registry::default().with(file_layer).init();
                info!("Results of this job are written to {}", path);
            }
            Err(e) => eprintln!("Could not create output file {}: {}", path, e),
        },
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true)
                .with_target(false)
                .with_filter(level);
            Registry::default().with(stdout_layer).init();
        }
    }
}

/// Rows of `m` in fixed-width scientific notation, one string per row.
pub fn matrix_lines(m: &DMatrix<f64>) -> Vec<String> {
    m.row_iter()
        .map(|row| {
            row.iter()
                .map(|v| format!("{:>15.8e}", v))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}
