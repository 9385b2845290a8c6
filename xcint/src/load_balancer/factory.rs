use super::{LoadBalancer, LoadBalancerSettings};
use crate::error::{Result, XcError};
use crate::grid::MolGrid;
use crate::local_work_driver::ExecutionSpace;
use crate::molecule::Molecule;
use crate::reduction::ProcessGroup;
use basis::BasisSet;
use std::sync::Arc;

/// Builds load balancers for an execution space and a partitioning kernel.
///
/// Only the host space with the `default` kernel is available.
#[derive(Debug, Clone)]
pub struct LoadBalancerFactory {
    space: ExecutionSpace,
    kernel: String,
}

impl LoadBalancerFactory {
    pub fn new(space: ExecutionSpace, kernel: &str) -> Self {
        Self {
            space,
            kernel: kernel.to_string(),
        }
    }

    pub fn get_instance(
        &self,
        group: Arc<dyn ProcessGroup>,
        molecule: Molecule,
        grid: MolGrid,
        basis: BasisSet,
        settings: LoadBalancerSettings,
    ) -> Result<LoadBalancer> {
        if self.space != ExecutionSpace::Host {
            return Err(XcError::UnsupportedBackend(self.space));
        }
        settings.validate()?;
        match self.kernel.to_lowercase().as_str() {
            "default" => Ok(LoadBalancer::with_inputs(group, settings, molecule, grid, basis)),
            other => Err(XcError::InvalidInput(format!(
                "unknown load balancer kernel: {}",
                other
            ))),
        }
    }
}
