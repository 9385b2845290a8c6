//! Seminumerical exchange: K_mn = sum_i w_i B_m(r_i) sum_ls A_nl(r_i) P_ls B_s(r_i),
//! with A the three-center Coulomb integrals at each grid point.

use super::replicated::{is_empty, PassContext};
use crate::error::Result;
use crate::local_work_driver::{HostScratch, ScratchLayout};
use crate::scheduler::AtomicBuffer;
use crate::task::XcTask;
use basis::DerivOrder;

pub(super) fn exx_task(
    ctx: &PassContext<'_>,
    task: &XcTask,
    scratch: &mut HostScratch,
    tolerance: f64,
    k: &AtomicBuffer,
) -> Result<()> {
    if is_empty(task) {
        return Ok(());
    }
    let driver = ctx.driver;
    let mut buf = scratch.prepare(task.npts(), task.nbe(), ctx.nbf(), &ScratchLayout::exx());
    driver.eval_collocation(ctx.basis, task, DerivOrder::Value, &mut buf);
    driver.eval_exx_fmat(ctx.p, task, &mut buf);
    driver.eval_exx_gmat(ctx.basis, task, tolerance, &mut buf);
    driver.inc_exx_k(task, &mut buf, k);
    Ok(())
}
