use super::XcIntegrator;
use crate::error::{Result, XcError};
use crate::functional::XcFunctional;
use crate::load_balancer::LoadBalancer;
use crate::local_work_driver::{ExecutionSpace, LocalWorkDriver, ReferenceHostDriver};
use crate::reduction::ReductionDriver;
use crate::scheduler::Scheduler;
use std::sync::Arc;
use tracing::info;

/// Builds integrators from an execution space, an integrator kind and a
/// local work driver kind.
///
/// Available: host space, `replicated` integrator, `reference` driver.
/// `default` selects the available kind in either position.
#[derive(Debug, Clone)]
pub struct XcIntegratorFactory {
    space: ExecutionSpace,
    integrator_kind: String,
    driver_kind: String,
}

impl XcIntegratorFactory {
    pub fn new(space: ExecutionSpace, integrator_kind: &str, driver_kind: &str) -> Self {
        Self {
            space,
            integrator_kind: integrator_kind.to_string(),
            driver_kind: driver_kind.to_string(),
        }
    }

    fn make_driver(&self) -> Result<Box<dyn LocalWorkDriver>> {
        match self.driver_kind.to_lowercase().as_str() {
            "reference" | "default" => Ok(Box::new(ReferenceHostDriver)),
            other => Err(XcError::InvalidInput(format!(
                "unknown local work driver: {}",
                other
            ))),
        }
    }

    pub fn get_instance(
        &self,
        functional: Arc<dyn XcFunctional>,
        lb: LoadBalancer,
        reduction: Arc<dyn ReductionDriver>,
        scheduler: Scheduler,
    ) -> Result<XcIntegrator> {
        if self.space != ExecutionSpace::Host {
            return Err(XcError::UnsupportedBackend(self.space));
        }
        match self.integrator_kind.to_lowercase().as_str() {
            "replicated" | "default" => {}
            other => {
                return Err(XcError::InvalidInput(format!(
                    "unknown integrator kind: {}",
                    other
                )))
            }
        }
        let driver = self.make_driver()?;
        info!(
            "Replicated integrator with the {} driver, {} on {} threads",
            driver.name(),
            functional.name(),
            scheduler.num_threads()
        );
        Ok(XcIntegrator::new(lb, driver, reduction, functional, scheduler))
    }
}
