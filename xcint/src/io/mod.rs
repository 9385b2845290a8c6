//! Logging setup and formatting of results

mod output;

pub use output::{matrix_lines, setup_output};
