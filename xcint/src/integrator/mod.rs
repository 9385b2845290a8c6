//! Integration passes over the local tasks of a load balancer.
//!
//! Every pass validates its inputs, runs one kernel per task on the
//! scheduler, accumulates into atomic buffers and finally sums the buffers
//! over the process group. A pass either returns its complete result or an
//! error; nothing is written on failure. Input validation happens before
//! the collective and must agree across ranks; once local work starts, every
//! rank reaches the reduction even if its own tasks fail.

mod exx;
mod factory;
mod replicated;

pub use factory::XcIntegratorFactory;

use crate::error::{Result, XcError};
use crate::functional::XcFunctional;
use crate::load_balancer::LoadBalancer;
use crate::local_work_driver::{ExecutionSpace, LocalWorkDriver, Quantity};
use crate::reduction::{ReductionDriver, ReductionOp};
use crate::scheduler::{AtomicBuffer, Scheduler};
use crate::task::XcTask;
use crate::timer::Timings;
use basis::BasisSet;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

use self::replicated::PassContext;

/// Column-major view of a caller-owned matrix with an explicit leading
/// dimension.
#[derive(Debug, Clone, Copy)]
pub struct MatrixRef<'a> {
    pub rows: usize,
    pub cols: usize,
    pub data: &'a [f64],
    pub ld: usize,
}

impl<'a> MatrixRef<'a> {
    pub fn new(rows: usize, cols: usize, data: &'a [f64], ld: usize) -> Self {
        Self { rows, cols, data, ld }
    }

    /// Copy into a dense `nbf x nbf` matrix, checking the shape first.
    fn to_density(&self, nbf: usize) -> Result<DMatrix<f64>> {
        if self.rows != self.cols {
            return Err(XcError::NonSquareMatrix {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.rows != nbf {
            return Err(XcError::BasisDimensionMismatch {
                expected: nbf,
                found: self.rows,
            });
        }
        if self.ld < self.rows {
            return Err(XcError::InvalidLeadingDimension {
                ld: self.ld,
                rows: self.rows,
            });
        }
        let needed = if self.cols == 0 {
            0
        } else {
            self.ld * (self.cols - 1) + self.rows
        };
        if self.data.len() < needed {
            return Err(XcError::InvalidInput(format!(
                "matrix storage holds {} values, {} needed",
                self.data.len(),
                needed
            )));
        }
        Ok(DMatrix::from_fn(self.rows, self.cols, |i, j| self.data[j * self.ld + i]))
    }
}

impl<'a> From<&'a DMatrix<f64>> for MatrixRef<'a> {
    fn from(m: &'a DMatrix<f64>) -> Self {
        Self::new(m.nrows(), m.ncols(), m.as_slice(), m.nrows())
    }
}

/// Exchange-correlation energy and potential matrix.
#[derive(Debug, Clone)]
pub struct ExcVxc {
    pub exc: f64,
    pub vxc: DMatrix<f64>,
}

/// Unrestricted energy with the potentials of the scalar and z densities.
/// The spin potentials are `Va = vxc_s + vxc_z` and `Vb = vxc_s - vxc_z`.
#[derive(Debug, Clone)]
pub struct ExcVxcUks {
    pub exc: f64,
    pub vxc_s: DMatrix<f64>,
    pub vxc_z: DMatrix<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExxSettings {
    /// Shells whose weighted density contribution at a point is below this
    /// are skipped when contracting the Coulomb integrals.
    pub screening_tolerance: f64,
}

impl Default for ExxSettings {
    fn default() -> Self {
        Self {
            screening_tolerance: 1e-10,
        }
    }
}

pub struct XcIntegrator {
    lb: LoadBalancer,
    driver: Box<dyn LocalWorkDriver>,
    reduction: Arc<dyn ReductionDriver>,
    functional: Arc<dyn XcFunctional>,
    scheduler: Scheduler,
    timings: Mutex<Timings>,
}

impl XcIntegrator {
    pub fn new(
        lb: LoadBalancer,
        driver: Box<dyn LocalWorkDriver>,
        reduction: Arc<dyn ReductionDriver>,
        functional: Arc<dyn XcFunctional>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            lb,
            driver,
            reduction,
            functional,
            scheduler,
            timings: Mutex::new(Timings::new()),
        }
    }

    pub fn load_balancer(&self) -> &LoadBalancer {
        &self.lb
    }

    pub fn load_balancer_mut(&mut self) -> &mut LoadBalancer {
        &mut self.lb
    }

    pub fn functional(&self) -> &dyn XcFunctional {
        self.functional.as_ref()
    }

    pub fn driver(&self) -> &dyn LocalWorkDriver {
        self.driver.as_ref()
    }

    pub fn timings(&self) -> Timings {
        self.timings.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn record_timing(&self, name: &str, start: Instant) {
        if let Ok(mut timings) = self.timings.lock() {
            timings.record(name, start.elapsed());
        }
    }

    /// Number of electrons, the integral of the density over the grid.
    pub fn integrate_den(&self, p: &DMatrix<f64>) -> Result<f64> {
        self.integrate_den_raw(MatrixRef::from(p))
    }

    pub fn integrate_den_raw(&self, p: MatrixRef<'_>) -> Result<f64> {
        let (p, tasks, basis) = self.prepare(p, Quantity::Density)?;
        let acc = AtomicBuffer::zeros(1);
        let ctx = self.context(&p, basis);
        let work = self.local_work(tasks, |task, scratch| replicated::density_task(&ctx, task, scratch, &acc));

        let out = self.allreduce(work, acc.to_vec())?;
        info!("Integrated density: {:.10}", out[0]);
        Ok(out[0])
    }

    /// Exchange-correlation energy and the symmetric potential matrix.
    pub fn eval_exc_vxc(&self, p: &DMatrix<f64>) -> Result<ExcVxc> {
        self.eval_exc_vxc_raw(MatrixRef::from(p))
    }

    pub fn eval_exc_vxc_raw(&self, p: MatrixRef<'_>) -> Result<ExcVxc> {
        let (p, tasks, basis) = self.prepare(p, Quantity::ExcVxc)?;
        let nbf = basis.nbf();
        let exc = AtomicBuffer::zeros(1);
        let vxc = AtomicBuffer::zeros(nbf * nbf);
        let ctx = self.context(&p, basis);
        let work = self.local_work(tasks, |task, scratch| {
            replicated::exc_vxc_task(&ctx, task, scratch, &exc, &vxc)
        });

        // one reduction for the energy and the matrix
        let mut out = exc.to_vec();
        out.extend(vxc.to_vec());
        let out = self.allreduce(work, out)?;
        let energy = out[0];
        let vxc = DMatrix::from_column_slice(nbf, nbf, &out[1..]);
        info!("Exchange-correlation energy ({}): {:.10}", self.functional.name(), energy);
        Ok(ExcVxc { exc: energy, vxc })
    }

    /// Unrestricted energy and potentials for `ps = Pa + Pb` and
    /// `pz = Pa - Pb`.
    pub fn eval_exc_vxc_uks(&self, ps: &DMatrix<f64>, pz: &DMatrix<f64>) -> Result<ExcVxcUks> {
        self.eval_exc_vxc_uks_raw(MatrixRef::from(ps), MatrixRef::from(pz))
    }

    pub fn eval_exc_vxc_uks_raw(&self, ps: MatrixRef<'_>, pz: MatrixRef<'_>) -> Result<ExcVxcUks> {
        let pz = pz.to_density(self.lb.basis()?.nbf())?;
        let (ps, tasks, basis) = self.prepare(ps, Quantity::ExcVxcUks)?;
        let nbf = basis.nbf();
        let exc = AtomicBuffer::zeros(1);
        let vxc_s = AtomicBuffer::zeros(nbf * nbf);
        let vxc_z = AtomicBuffer::zeros(nbf * nbf);
        let ctx = self.context(&ps, basis);
        let work = self.local_work(tasks, |task, scratch| {
            replicated::exc_vxc_uks_task(&ctx, &pz, task, scratch, &exc, &vxc_s, &vxc_z)
        });

        let mut out = exc.to_vec();
        out.extend(vxc_s.to_vec());
        out.extend(vxc_z.to_vec());
        let out = self.allreduce(work, out)?;
        let energy = out[0];
        let (vs, vz) = out[1..].split_at(nbf * nbf);
        info!("Unrestricted exchange-correlation energy ({}): {:.10}", self.functional.name(), energy);
        Ok(ExcVxcUks {
            exc: energy,
            vxc_s: DMatrix::from_column_slice(nbf, nbf, vs),
            vxc_z: DMatrix::from_column_slice(nbf, nbf, vz),
        })
    }

    /// Nuclear gradient of the exchange-correlation energy, `3 * natoms`
    /// values ordered atom by atom.
    pub fn eval_exc_grad(&self, p: &DMatrix<f64>) -> Result<Vec<f64>> {
        self.eval_exc_grad_raw(MatrixRef::from(p))
    }

    pub fn eval_exc_grad_raw(&self, p: MatrixRef<'_>) -> Result<Vec<f64>> {
        let (p, tasks, basis) = self.prepare(p, Quantity::ExcGrad)?;
        let natoms = self.lb.molecule()?.natoms();
        let grad = AtomicBuffer::zeros(3 * natoms);
        let ctx = self.context(&p, basis);
        let work = self.local_work(tasks, |task, scratch| replicated::exc_grad_task(&ctx, task, scratch, &grad));

        let out = self.allreduce(work, grad.to_vec())?;
        debug!("Exchange-correlation gradient norm: {:.6e}", out.iter().map(|g| g * g).sum::<f64>().sqrt());
        Ok(out)
    }

    /// Seminumerical exact exchange matrix.
    pub fn eval_exx(&self, p: &DMatrix<f64>, settings: &ExxSettings) -> Result<DMatrix<f64>> {
        self.eval_exx_raw(MatrixRef::from(p), settings)
    }

    pub fn eval_exx_raw(&self, p: MatrixRef<'_>, settings: &ExxSettings) -> Result<DMatrix<f64>> {
        let (p, tasks, basis) = self.prepare(p, Quantity::Exx)?;
        let nbf = basis.nbf();
        let k = AtomicBuffer::zeros(nbf * nbf);
        let ctx = self.context(&p, basis);
        let work = self.local_work(tasks, |task, scratch| {
            exx::exx_task(&ctx, task, scratch, settings.screening_tolerance, &k)
        });

        let out = self.allreduce(work, k.to_vec())?;
        let k = DMatrix::from_column_slice(nbf, nbf, &out);
        let k = (&k + k.transpose()) * 0.5;
        info!("Exact exchange energy -1/4 Tr(PK): {:.10}", -0.25 * p.dot(&k));
        Ok(k)
    }

    fn context<'a>(&'a self, p: &'a DMatrix<f64>, basis: &'a BasisSet) -> PassContext<'a> {
        PassContext {
            driver: self.driver.as_ref(),
            functional: self.functional.as_ref(),
            basis,
            p,
        }
    }

    /// Validate everything a pass needs before any task runs.
    fn prepare(&self, p: MatrixRef<'_>, quantity: Quantity) -> Result<(DMatrix<f64>, &[XcTask], &BasisSet)> {
        let basis = self.lb.basis()?;
        let p = p.to_density(basis.nbf())?;

        let space = self.driver.execution_space();
        if space != ExecutionSpace::Host {
            return Err(XcError::UnsupportedBackend(space));
        }
        if !self.driver.supports(quantity) {
            return Err(XcError::UnsupportedQuantity {
                driver: self.driver.name().to_string(),
                quantity,
            });
        }
        if !self.reduction.takes_host_memory() {
            return Err(XcError::ReductionRequiresHostMemory);
        }

        let tasks = self.lb.get_tasks()?;
        if !self.lb.modified_weights_are_stored() {
            return Err(XcError::WeightsNotModified);
        }
        debug!("{:?} pass over {} local tasks", quantity, tasks.len());
        Ok((p, tasks, basis))
    }

    fn local_work<F>(&self, tasks: &[XcTask], kernel: F) -> Result<()>
    where
        F: Fn(&XcTask, &mut crate::local_work_driver::HostScratch) -> Result<()> + Sync,
    {
        let start = Instant::now();
        let result = self.scheduler.run(tasks, kernel);
        self.record_timing("XCIntegrator.LocalWork", start);
        result
    }

    /// Sum `buf` over the group whether or not the local work succeeded.
    ///
    /// A trailing flag counts failed ranks, so every rank returns an error
    /// when any of them does and no rank is left waiting in the collective.
    fn allreduce(&self, work: Result<()>, mut buf: Vec<f64>) -> Result<Vec<f64>> {
        let start = Instant::now();
        buf.push(if work.is_err() { 1.0 } else { 0.0 });
        let reduced = self.reduction.allreduce_inplace(&mut buf, ReductionOp::Sum);
        self.record_timing("XCIntegrator.Allreduce", start);

        work?;
        reduced?;
        let nfailed = buf.pop().unwrap_or(0.0);
        if nfailed > 0.0 {
            return Err(XcError::Reduction(format!("{} rank(s) failed their local work", nfailed)));
        }
        Ok(buf)
    }
}
