//! Error type shared by every integration pass.

use std::fmt;

use crate::local_work_driver::{ExecutionSpace, Quantity};

#[derive(Debug, Clone, PartialEq)]
pub enum XcError {
    /// The density matrix is not square.
    NonSquareMatrix { rows: usize, cols: usize },
    /// The density matrix does not match the number of basis functions.
    BasisDimensionMismatch { expected: usize, found: usize },
    /// The leading dimension is smaller than the number of rows.
    InvalidLeadingDimension { ld: usize, rows: usize },
    /// Tasks were requested before molecule, grid and basis were attached.
    LoadBalancerUninitialized,
    /// A pass needing corrected weights ran before the weight pass.
    WeightsNotModified,
    UnsupportedBackend(ExecutionSpace),
    UnsupportedQuantity { driver: String, quantity: Quantity },
    ReductionRequiresHostMemory,
    Reduction(String),
    MissingAtomicGrid { element: String, atomic_number: u32 },
    InvalidInput(String),
}

impl fmt::Display for XcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XcError::NonSquareMatrix { rows, cols } => {
                write!(f, "density matrix must be square, got {}x{}", rows, cols)
            }
            XcError::BasisDimensionMismatch { expected, found } => write!(
                f,
                "density matrix dimension {} does not match basis size {}",
                found, expected
            ),
            XcError::InvalidLeadingDimension { ld, rows } => write!(
                f,
                "leading dimension {} is smaller than the row count {}",
                ld, rows
            ),
            XcError::LoadBalancerUninitialized => {
                write!(f, "load balancer has no molecule, grid and basis attached")
            }
            XcError::WeightsNotModified => {
                write!(f, "grid weights must be modified before integration")
            }
            XcError::UnsupportedBackend(space) => {
                write!(f, "the {:?} execution space is not available here", space)
            }
            XcError::UnsupportedQuantity { driver, quantity } => {
                write!(f, "local work driver '{}' cannot evaluate {:?}", driver, quantity)
            }
            XcError::ReductionRequiresHostMemory => {
                write!(f, "reduction driver does not accept host memory")
            }
            XcError::Reduction(msg) => write!(f, "reduction failed: {}", msg),
            XcError::MissingAtomicGrid {
                element,
                atomic_number,
            } => write!(
                f,
                "no atomic grid for element {} (Z = {})",
                element, atomic_number
            ),
            XcError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
        }
    }
}

impl std::error::Error for XcError {}

pub type Result<T> = std::result::Result<T, XcError>;
