//! Numerical integration of exchange-correlation quantities over molecular
//! grids: density, energy and potential, nuclear gradient and
//! seminumerical exact exchange.
//!
//! A [`LoadBalancer`] turns the molecule, grid and basis into screened tasks,
//! [`MolecularWeights`] partitions their weights between atoms, and an
//! [`XcIntegrator`] runs the tasks through a [`LocalWorkDriver`] on a
//! [`Scheduler`] before summing over the process group.

pub mod error;
pub mod functional;
pub mod grid;
pub mod integrator;
pub mod load_balancer;
pub mod local_work_driver;
pub mod molecule;
pub mod reduction;
pub mod scheduler;
pub mod task;
pub mod timer;
pub mod weights;

pub use error::{Result, XcError};
pub use functional::{functional_by_name, FunctionalKind, PbeExchange, SlaterExchange, XcFunctional};
pub use grid::{AtomicGrid, MolGrid};
pub use integrator::{ExcVxc, ExcVxcUks, ExxSettings, MatrixRef, XcIntegrator, XcIntegratorFactory};
pub use load_balancer::{LoadBalancer, LoadBalancerFactory, LoadBalancerSettings, LoadBalancerState};
pub use local_work_driver::{ExecutionSpace, LocalWorkDriver, Quantity, ReferenceHostDriver, SpinComponent};
pub use molecule::{Atom, Molecule};
pub use reduction::{ProcessGroup, ReductionDriver, ReductionOp, SerialGroup, ThreadGroup};
pub use scheduler::{AtomicBuffer, Scheduler, TaskOrder};
pub use task::{BasisScreening, SubmatRange, XcTask};
pub use timer::Timings;
pub use weights::MolecularWeights;
