//! Exchange-correlation integration command-line interface
//!
//! Reads a YAML job (molecule, basis, grids, density matrix) and reports the
//! requested integrals.

mod app;
mod config;
mod io;

use app::XcApplication;
use color_eyre::eyre::Result;

fn main() -> Result<()> {
    color_eyre::install()?;
    XcApplication::from_cli()?.run()
}
