//! Numerical kernels run on one task at a time.
//!
//! A driver is picked once, when the integrator is built, and is then only
//! reached through [`LocalWorkDriver`]. Its [`ExecutionSpace`] says where its
//! buffers live; the replicated integrator only drives host drivers.

mod host;
mod scratch;

pub use host::ReferenceHostDriver;
pub use scratch::{HostScratch, ScratchLayout, TaskBuffers};

use crate::functional::XcFunctional;
use crate::scheduler::AtomicBuffer;
use crate::task::XcTask;
use basis::{BasisSet, DerivOrder};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSpace {
    Host,
    Device,
}

/// Integration passes a driver may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Density,
    ExcVxc,
    /// Energy and potentials of a spin-polarized (unrestricted) density.
    ExcVxcUks,
    ExcGrad,
    Exx,
}

/// Spin density a UKS kernel is working on. The density matrices of a
/// polarized pass are `Ps = Pa + Pb` and `Pz = Pa - Pb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpinComponent {
    Scalar,
    Z,
}

impl SpinComponent {
    /// Block of this component in the `_sz` buffers.
    pub fn index(self) -> usize {
        match self {
            SpinComponent::Scalar => 0,
            SpinComponent::Z => 1,
        }
    }
}

/// Kernel contract for one task. Every kernel reads and writes the named
/// regions of [`TaskBuffers`] prepared for the pass.
pub trait LocalWorkDriver: Send + Sync {
    fn name(&self) -> &str;

    fn execution_space(&self) -> ExecutionSpace;

    fn supports(&self, quantity: Quantity) -> bool;

    /// Values (and derivatives up to `order`) of the screened shells at the
    /// task points, into `buf.basis`.
    fn eval_collocation(&self, basis: &BasisSet, task: &XcTask, order: DerivOrder, buf: &mut TaskBuffers<'_>);

    /// Gather the screened block of `p` into `buf.submat` and multiply it
    /// with the first `nblocks` collocation blocks, into `buf.xmat`.
    fn eval_xmat(&self, p: &DMatrix<f64>, task: &XcTask, nblocks: usize, buf: &mut TaskBuffers<'_>);

    /// Density at each point.
    fn eval_uvvar_lda(&self, buf: &mut TaskBuffers<'_>);

    /// Density, its gradient and gamma = |grad rho|^2 at each point.
    fn eval_uvvar_gga(&self, buf: &mut TaskBuffers<'_>);

    /// Energy per particle and derivatives from the functional.
    fn eval_kern_exc_vxc(&self, functional: &dyn XcFunctional, buf: &mut TaskBuffers<'_>);

    fn eval_zmat_lda(&self, task: &XcTask, buf: &mut TaskBuffers<'_>);

    fn eval_zmat_gga(&self, task: &XcTask, buf: &mut TaskBuffers<'_>);

    /// Density of `component` from the current X matrix, into its block of
    /// `buf.den_sz`.
    fn eval_uvvar_lda_uks(&self, component: SpinComponent, buf: &mut TaskBuffers<'_>);

    /// Density and gradient of `component`, into `buf.den_sz` and
    /// `buf.den_grad_sz`.
    fn eval_uvvar_gga_uks(&self, component: SpinComponent, buf: &mut TaskBuffers<'_>);

    /// Polarized functional call on the spin densities, with the results
    /// mapped back to derivatives by the scalar and z densities.
    fn eval_kern_exc_vxc_uks(&self, functional: &dyn XcFunctional, buf: &mut TaskBuffers<'_>);

    fn eval_zmat_lda_uks(&self, task: &XcTask, component: SpinComponent, buf: &mut TaskBuffers<'_>);

    fn eval_zmat_gga_uks(&self, task: &XcTask, component: SpinComponent, buf: &mut TaskBuffers<'_>);

    /// Add B Z^T + Z B^T into the full potential through the submatrix map.
    fn inc_vxc(&self, task: &XcTask, buf: &mut TaskBuffers<'_>, vxc: &AtomicBuffer);

    /// Nuclear gradient for a density-only functional.
    fn inc_exc_grad_lda(&self, basis: &BasisSet, task: &XcTask, buf: &TaskBuffers<'_>, grad: &AtomicBuffer);

    /// Nuclear gradient for a GGA, including the collocation Hessian term.
    fn inc_exc_grad_gga(&self, basis: &BasisSet, task: &XcTask, buf: &TaskBuffers<'_>, grad: &AtomicBuffer);

    /// F = P B over the full basis, into `buf.fmat`.
    fn eval_exx_fmat(&self, p: &DMatrix<f64>, task: &XcTask, buf: &mut TaskBuffers<'_>);

    /// G = w A F with A the Coulomb integrals at each point, into `buf.gmat`.
    fn eval_exx_gmat(&self, basis: &BasisSet, task: &XcTask, tolerance: f64, buf: &mut TaskBuffers<'_>);

    /// Add B G into the screened rows of K.
    fn inc_exx_k(&self, task: &XcTask, buf: &mut TaskBuffers<'_>, k: &AtomicBuffer);
}
