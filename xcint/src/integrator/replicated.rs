//! Per-task pipelines of the replicated integrator: every rank holds the
//! whole density matrix and produces full-size partial results.

use crate::error::Result;
use crate::functional::XcFunctional;
use crate::local_work_driver::{HostScratch, LocalWorkDriver, ScratchLayout, SpinComponent};
use crate::scheduler::AtomicBuffer;
use crate::task::XcTask;
use basis::{BasisSet, DerivOrder};
use nalgebra::DMatrix;

/// Read-only inputs shared by every task of a pass.
pub(super) struct PassContext<'a> {
    pub driver: &'a dyn LocalWorkDriver,
    pub functional: &'a dyn XcFunctional,
    pub basis: &'a BasisSet,
    pub p: &'a DMatrix<f64>,
}

impl PassContext<'_> {
    pub fn nbf(&self) -> usize {
        self.basis.nbf()
    }
}

/// A task without points or without any surviving shell adds nothing.
pub(super) fn is_empty(task: &XcTask) -> bool {
    task.npts() == 0 || task.nbe() == 0
}

fn weighted_sum(weights: &[f64], a: &[f64], b: Option<&[f64]>) -> f64 {
    match b {
        Some(b) => weights.iter().zip(a).zip(b).map(|((w, x), y)| w * x * y).sum(),
        None => weights.iter().zip(a).map(|(w, x)| w * x).sum(),
    }
}

pub(super) fn density_task(
    ctx: &PassContext<'_>,
    task: &XcTask,
    scratch: &mut HostScratch,
    acc: &AtomicBuffer,
) -> Result<()> {
    if is_empty(task) {
        return Ok(());
    }
    let driver = ctx.driver;
    let mut buf = scratch.prepare(task.npts(), task.nbe(), ctx.nbf(), &ScratchLayout::density());
    driver.eval_collocation(ctx.basis, task, DerivOrder::Value, &mut buf);
    driver.eval_xmat(ctx.p, task, 1, &mut buf);
    driver.eval_uvvar_lda(&mut buf);
    acc.add(0, weighted_sum(&task.weights, &buf.den[..], None));
    Ok(())
}

pub(super) fn exc_vxc_task(
    ctx: &PassContext<'_>,
    task: &XcTask,
    scratch: &mut HostScratch,
    exc: &AtomicBuffer,
    vxc: &AtomicBuffer,
) -> Result<()> {
    if is_empty(task) {
        return Ok(());
    }
    let driver = ctx.driver;
    let gga = ctx.functional.is_gga();
    let layout = ScratchLayout::exc_vxc(ctx.functional.kind());
    let mut buf = scratch.prepare(task.npts(), task.nbe(), ctx.nbf(), &layout);

    driver.eval_collocation(ctx.basis, task, layout.order, &mut buf);
    driver.eval_xmat(ctx.p, task, 1, &mut buf);
    if gga {
        driver.eval_uvvar_gga(&mut buf);
    } else {
        driver.eval_uvvar_lda(&mut buf);
    }
    driver.eval_kern_exc_vxc(ctx.functional, &mut buf);
    exc.add(0, weighted_sum(&task.weights, &buf.den[..], Some(&buf.eps[..])));

    if gga {
        driver.eval_zmat_gga(task, &mut buf);
    } else {
        driver.eval_zmat_lda(task, &mut buf);
    }
    driver.inc_vxc(task, &mut buf, vxc);
    Ok(())
}

/// Unrestricted energy and potentials. `ctx.p` holds the scalar density
/// matrix `Pa + Pb` and `pz` the magnetization `Pa - Pb`.
pub(super) fn exc_vxc_uks_task(
    ctx: &PassContext<'_>,
    pz: &DMatrix<f64>,
    task: &XcTask,
    scratch: &mut HostScratch,
    exc: &AtomicBuffer,
    vxc_s: &AtomicBuffer,
    vxc_z: &AtomicBuffer,
) -> Result<()> {
    if is_empty(task) {
        return Ok(());
    }
    let driver = ctx.driver;
    let gga = ctx.functional.is_gga();
    let layout = ScratchLayout::exc_vxc_uks(ctx.functional.kind());
    let mut buf = scratch.prepare(task.npts(), task.nbe(), ctx.nbf(), &layout);

    driver.eval_collocation(ctx.basis, task, layout.order, &mut buf);
    for (component, p) in [(SpinComponent::Scalar, ctx.p), (SpinComponent::Z, pz)] {
        driver.eval_xmat(p, task, 1, &mut buf);
        if gga {
            driver.eval_uvvar_gga_uks(component, &mut buf);
        } else {
            driver.eval_uvvar_lda_uks(component, &mut buf);
        }
    }
    driver.eval_kern_exc_vxc_uks(ctx.functional, &mut buf);
    let npts = task.npts();
    exc.add(0, weighted_sum(&task.weights, &buf.den_sz[..npts], Some(&buf.eps[..])));

    for (component, vxc) in [(SpinComponent::Scalar, vxc_s), (SpinComponent::Z, vxc_z)] {
        if gga {
            driver.eval_zmat_gga_uks(task, component, &mut buf);
        } else {
            driver.eval_zmat_lda_uks(task, component, &mut buf);
        }
        driver.inc_vxc(task, &mut buf, vxc);
    }
    Ok(())
}

pub(super) fn exc_grad_task(
    ctx: &PassContext<'_>,
    task: &XcTask,
    scratch: &mut HostScratch,
    grad: &AtomicBuffer,
) -> Result<()> {
    if is_empty(task) {
        return Ok(());
    }
    let driver = ctx.driver;
    let gga = ctx.functional.is_gga();
    let layout = ScratchLayout::exc_grad(ctx.functional.kind());
    let mut buf = scratch.prepare(task.npts(), task.nbe(), ctx.nbf(), &layout);

    driver.eval_collocation(ctx.basis, task, layout.order, &mut buf);
    driver.eval_xmat(ctx.p, task, layout.xmat_blocks, &mut buf);
    if gga {
        driver.eval_uvvar_gga(&mut buf);
    } else {
        driver.eval_uvvar_lda(&mut buf);
    }
    driver.eval_kern_exc_vxc(ctx.functional, &mut buf);

    if gga {
        driver.inc_exc_grad_gga(ctx.basis, task, &buf, grad);
    } else {
        driver.inc_exc_grad_lda(ctx.basis, task, &buf, grad);
    }
    Ok(())
}
