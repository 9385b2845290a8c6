pub mod basis;
pub mod gto;
pub mod helper;
pub mod integrals;
pub mod shell;

pub use basis::BasisSet;
pub use gto::DerivOrder;
pub use shell::{Shell, ShellSpec, DEFAULT_SHELL_TOLERANCE, NDERIV};
