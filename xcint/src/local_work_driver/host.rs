extern crate nalgebra as na;

use super::{ExecutionSpace, LocalWorkDriver, Quantity, SpinComponent, TaskBuffers};
use crate::functional::XcFunctional;
use crate::scheduler::AtomicBuffer;
use crate::task::{SubmatRange, XcTask};
use basis::integrals::coulomb_block_into;
use basis::{BasisSet, DerivOrder};
use na::{DMatrix, DMatrixView, DMatrixViewMut};

/// Collocation block of the Hessian element (j, k).
const HESSIAN_BLOCK: [[usize; 3]; 3] = [[4, 5, 6], [5, 7, 8], [6, 8, 9]];

/// Reference CPU implementation of every kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceHostDriver;

fn gather_submat(p: &DMatrix<f64>, ranges: &[SubmatRange], nbe: usize, out: &mut [f64]) {
    for rb in ranges {
        for j in 0..rb.len {
            let col = (rb.local_start + j) * nbe;
            for ra in ranges {
                for i in 0..ra.len {
                    out[col + ra.local_start + i] = p[(ra.full_start + i, rb.full_start + j)];
                }
            }
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// rho_i = sum_mu B(mu, i) X(mu, i).
fn density_into(basis: &[f64], xmat: &[f64], nbe: usize, out: &mut [f64]) {
    for (i, d) in out.iter_mut().enumerate() {
        let range = i * nbe..(i + 1) * nbe;
        *d = dot(&basis[range.clone()], &xmat[range]);
    }
}

/// grad rho_i = 2 sum_mu grad B(mu, i) X(mu, i), one block of `npts` per axis.
fn density_gradient_into(basis: &[f64], xmat: &[f64], nbe: usize, npts: usize, out: &mut [f64]) {
    let blk = nbe * npts;
    for c in 0..3 {
        let bc = &basis[(c + 1) * blk..(c + 2) * blk];
        for i in 0..npts {
            let range = i * nbe..(i + 1) * nbe;
            out[c * npts + i] = 2.0 * dot(&bc[range.clone()], &xmat[range]);
        }
    }
}

impl LocalWorkDriver for ReferenceHostDriver {
    fn name(&self) -> &str {
        "reference"
    }

    fn execution_space(&self) -> ExecutionSpace {
        ExecutionSpace::Host
    }

    fn supports(&self, _quantity: Quantity) -> bool {
        true
    }

    fn eval_collocation(&self, basis: &BasisSet, task: &XcTask, order: DerivOrder, buf: &mut TaskBuffers<'_>) {
        let nbe = buf.nbe;
        let blk = buf.block_len();
        let ncomp = order.ncomponents();
        debug_assert!(buf.basis.len() >= ncomp * blk);

        let scr = &task.screening;
        for (i, r) in task.points.iter().enumerate() {
            for (&ish, &off) in scr.shell_list.iter().zip(&scr.shell_offsets) {
                basis[ish].evaluate(r, order, |comp, d| {
                    let idx = i * nbe + off + comp;
                    for (c, &v) in d.iter().take(ncomp).enumerate() {
                        buf.basis[c * blk + idx] = v;
                    }
                });
            }
        }
    }

    fn eval_xmat(&self, p: &DMatrix<f64>, task: &XcTask, nblocks: usize, buf: &mut TaskBuffers<'_>) {
        let nbe = buf.nbe;
        let cols = nblocks * buf.npts;
        gather_submat(p, &task.screening.submat_map, nbe, buf.submat);

        let p_sub = DMatrixView::from_slice(&buf.submat[..], nbe, nbe);
        let b = DMatrixView::from_slice(&buf.basis[..nbe * cols], nbe, cols);
        let mut x = DMatrixViewMut::from_slice(&mut buf.xmat[..nbe * cols], nbe, cols);
        x.gemm(1.0, &p_sub, &b, 0.0);
    }

    fn eval_uvvar_lda(&self, buf: &mut TaskBuffers<'_>) {
        density_into(&buf.basis[..], &buf.xmat[..], buf.nbe, &mut buf.den[..]);
    }

    fn eval_uvvar_gga(&self, buf: &mut TaskBuffers<'_>) {
        self.eval_uvvar_lda(buf);
        let (nbe, npts) = (buf.nbe, buf.npts);
        density_gradient_into(&buf.basis[..], &buf.xmat[..], nbe, npts, &mut buf.den_grad[..]);
        for i in 0..npts {
            buf.gamma[i] = (0..3).map(|c| buf.den_grad[c * npts + i].powi(2)).sum();
        }
    }

    fn eval_kern_exc_vxc(&self, functional: &dyn XcFunctional, buf: &mut TaskBuffers<'_>) {
        if functional.is_gga() {
            functional.eval_exc_vxc_gga(&buf.den[..], &buf.gamma[..], buf.eps, buf.vrho, buf.vgamma);
        } else {
            functional.eval_exc_vxc_lda(&buf.den[..], buf.eps, buf.vrho);
        }
    }

    fn eval_zmat_lda(&self, task: &XcTask, buf: &mut TaskBuffers<'_>) {
        let (nbe, npts) = (buf.nbe, buf.npts);
        for i in 0..npts {
            let f = 0.5 * task.weights[i] * buf.vrho[i];
            for mu in 0..nbe {
                buf.zmat[mu * npts + i] = f * buf.basis[i * nbe + mu];
            }
        }
    }

    fn eval_zmat_gga(&self, task: &XcTask, buf: &mut TaskBuffers<'_>) {
        let (nbe, npts, blk) = (buf.nbe, buf.npts, buf.block_len());
        for i in 0..npts {
            let w = task.weights[i];
            let f = 0.5 * w * buf.vrho[i];
            let g = 2.0 * w * buf.vgamma[i];
            let dr = [buf.den_grad[i], buf.den_grad[npts + i], buf.den_grad[2 * npts + i]];
            for mu in 0..nbe {
                let idx = i * nbe + mu;
                let grad_dot = dr[0] * buf.basis[blk + idx]
                    + dr[1] * buf.basis[2 * blk + idx]
                    + dr[2] * buf.basis[3 * blk + idx];
                buf.zmat[mu * npts + i] = f * buf.basis[idx] + g * grad_dot;
            }
        }
    }

    fn eval_uvvar_lda_uks(&self, component: SpinComponent, buf: &mut TaskBuffers<'_>) {
        let (nbe, npts, k) = (buf.nbe, buf.npts, component.index());
        let out = &mut buf.den_sz[k * npts..(k + 1) * npts];
        density_into(&buf.basis[..], &buf.xmat[..], nbe, out);
    }

    fn eval_uvvar_gga_uks(&self, component: SpinComponent, buf: &mut TaskBuffers<'_>) {
        self.eval_uvvar_lda_uks(component, buf);
        let (nbe, npts, k) = (buf.nbe, buf.npts, component.index());
        let out = &mut buf.den_grad_sz[3 * k * npts..3 * (k + 1) * npts];
        density_gradient_into(&buf.basis[..], &buf.xmat[..], nbe, npts, out);
    }

    fn eval_kern_exc_vxc_uks(&self, functional: &dyn XcFunctional, buf: &mut TaskBuffers<'_>) {
        let npts = buf.npts;
        let gga = functional.is_gga();
        for i in 0..npts {
            let (s, z) = (buf.den_sz[i], buf.den_sz[npts + i]);
            buf.rho_ud[2 * i] = 0.5 * (s + z);
            buf.rho_ud[2 * i + 1] = 0.5 * (s - z);
        }
        // spin gradients of point i along axis c
        let spin_grad = |g: &[f64], c: usize, i: usize| {
            let (gs, gz) = (g[c * npts + i], g[(3 + c) * npts + i]);
            (0.5 * (gs + gz), 0.5 * (gs - gz))
        };

        if gga {
            for i in 0..npts {
                let mut sig = [0.0; 3];
                for c in 0..3 {
                    let (ga, gb) = spin_grad(&buf.den_grad_sz[..], c, i);
                    sig[0] += ga * ga;
                    sig[1] += ga * gb;
                    sig[2] += gb * gb;
                }
                buf.sigma[3 * i..3 * i + 3].copy_from_slice(&sig);
            }
            functional.eval_exc_vxc_gga_pol(&buf.rho_ud[..], &buf.sigma[..], buf.eps, buf.vrho_ud, buf.vsigma);
        } else {
            functional.eval_exc_vxc_lda_pol(&buf.rho_ud[..], buf.eps, buf.vrho_ud);
        }

        for i in 0..npts {
            let (va, vb) = (buf.vrho_ud[2 * i], buf.vrho_ud[2 * i + 1]);
            buf.vrho_sz[i] = 0.5 * (va + vb);
            buf.vrho_sz[npts + i] = 0.5 * (va - vb);
        }
        if gga {
            for i in 0..npts {
                let v = &buf.vsigma[3 * i..3 * i + 3];
                for c in 0..3 {
                    let (ga, gb) = spin_grad(&buf.den_grad_sz[..], c, i);
                    // derivatives by the up and down gradients
                    let da = 2.0 * v[0] * ga + v[1] * gb;
                    let db = 2.0 * v[2] * gb + v[1] * ga;
                    buf.vgrad_sz[c * npts + i] = 0.5 * (da + db);
                    buf.vgrad_sz[(3 + c) * npts + i] = 0.5 * (da - db);
                }
            }
        }
    }

    fn eval_zmat_lda_uks(&self, task: &XcTask, component: SpinComponent, buf: &mut TaskBuffers<'_>) {
        let (nbe, npts, k) = (buf.nbe, buf.npts, component.index());
        let v = &buf.vrho_sz[k * npts..(k + 1) * npts];
        for i in 0..npts {
            let f = 0.5 * task.weights[i] * v[i];
            for mu in 0..nbe {
                buf.zmat[mu * npts + i] = f * buf.basis[i * nbe + mu];
            }
        }
    }

    fn eval_zmat_gga_uks(&self, task: &XcTask, component: SpinComponent, buf: &mut TaskBuffers<'_>) {
        let (nbe, npts, blk, k) = (buf.nbe, buf.npts, buf.block_len(), component.index());
        let v = &buf.vrho_sz[k * npts..(k + 1) * npts];
        let g = &buf.vgrad_sz[3 * k * npts..3 * (k + 1) * npts];
        for i in 0..npts {
            let w = task.weights[i];
            let f = 0.5 * w * v[i];
            let gi = [g[i], g[npts + i], g[2 * npts + i]];
            for mu in 0..nbe {
                let idx = i * nbe + mu;
                let grad_dot = gi[0] * buf.basis[blk + idx]
                    + gi[1] * buf.basis[2 * blk + idx]
                    + gi[2] * buf.basis[3 * blk + idx];
                buf.zmat[mu * npts + i] = f * buf.basis[idx] + w * grad_dot;
            }
        }
    }

    fn inc_vxc(&self, task: &XcTask, buf: &mut TaskBuffers<'_>, vxc: &AtomicBuffer) {
        let (nbe, npts, nbf) = (buf.nbe, buf.npts, buf.nbf);
        {
            let b = DMatrixView::from_slice(&buf.basis[..nbe * npts], nbe, npts);
            let z = DMatrixView::from_slice(&buf.zmat[..], npts, nbe);
            let mut m = DMatrixViewMut::from_slice(&mut buf.vxc_local[..], nbe, nbe);
            m.gemm(1.0, &b, &z, 0.0);
        }

        // V = M + M^T, scattered through the submatrix map
        let m = &buf.vxc_local[..];
        let ranges = &task.screening.submat_map;
        for rb in ranges {
            for j in 0..rb.len {
                let (lb, fb) = (rb.local_start + j, rb.full_start + j);
                for ra in ranges {
                    for i in 0..ra.len {
                        let (la, fa) = (ra.local_start + i, ra.full_start + i);
                        vxc.add(fb * nbf + fa, m[lb * nbe + la] + m[la * nbe + lb]);
                    }
                }
            }
        }
    }

    fn inc_exc_grad_lda(&self, basis: &BasisSet, task: &XcTask, buf: &TaskBuffers<'_>, grad: &AtomicBuffer) {
        let (nbe, npts) = (buf.nbe, buf.npts);
        let dbasis = [buf.basis_block(1), buf.basis_block(2), buf.basis_block(3)];
        let x = buf.xmat_block(0);

        let scr = &task.screening;
        for (&ish, &off) in scr.shell_list.iter().zip(&scr.shell_offsets) {
            let atom = basis.shell_to_atom(ish);
            let size = basis[ish].size();
            let mut g = [0.0; 3];
            for i in 0..npts {
                let f = task.weights[i] * buf.vrho[i];
                for mu in off..off + size {
                    let idx = i * nbe + mu;
                    let fx = f * x[idx];
                    for (gc, db) in g.iter_mut().zip(&dbasis) {
                        *gc += fx * db[idx];
                    }
                }
            }
            for (c, gc) in g.iter().enumerate() {
                grad.add(3 * atom + c, -2.0 * gc);
            }
        }
    }

    fn inc_exc_grad_gga(&self, basis: &BasisSet, task: &XcTask, buf: &TaskBuffers<'_>, grad: &AtomicBuffer) {
        let (nbe, npts) = (buf.nbe, buf.npts);
        let blocks: Vec<&[f64]> = (0..10).map(|c| buf.basis_block(c)).collect();
        let x = buf.xmat_block(0);
        let dx = [buf.xmat_block(1), buf.xmat_block(2), buf.xmat_block(3)];

        let scr = &task.screening;
        for (&ish, &off) in scr.shell_list.iter().zip(&scr.shell_offsets) {
            let atom = basis.shell_to_atom(ish);
            let size = basis[ish].size();
            let mut g = [0.0; 3];
            for i in 0..npts {
                let w = task.weights[i];
                let vr = w * buf.vrho[i];
                let vg = 2.0 * w * buf.vgamma[i];
                let dr = [buf.den_grad[i], buf.den_grad[npts + i], buf.den_grad[2 * npts + i]];
                for mu in off..off + size {
                    let idx = i * nbe + mu;
                    let xv = x[idx];
                    let dr_dot_dx: f64 = (0..3).map(|k| dr[k] * dx[k][idx]).sum();
                    for (j, gj) in g.iter_mut().enumerate() {
                        let db = blocks[1 + j][idx];
                        let hess: f64 = (0..3).map(|k| dr[k] * blocks[HESSIAN_BLOCK[j][k]][idx]).sum();
                        *gj += vr * xv * db + vg * (xv * hess + db * dr_dot_dx);
                    }
                }
            }
            for (c, gc) in g.iter().enumerate() {
                grad.add(3 * atom + c, -2.0 * gc);
            }
        }
    }

    fn eval_exx_fmat(&self, p: &DMatrix<f64>, task: &XcTask, buf: &mut TaskBuffers<'_>) {
        let (nbe, npts, nbf) = (buf.nbe, buf.npts, buf.nbf);
        let p_data = p.as_slice();
        for r in &task.screening.submat_map {
            for j in 0..r.len {
                let (lc, fc) = (r.local_start + j, r.full_start + j);
                buf.p_cols[lc * nbf..(lc + 1) * nbf].copy_from_slice(&p_data[fc * nbf..(fc + 1) * nbf]);
            }
        }

        let p_cols = DMatrixView::from_slice(&buf.p_cols[..], nbf, nbe);
        let b = DMatrixView::from_slice(&buf.basis[..nbe * npts], nbe, npts);
        let mut f = DMatrixViewMut::from_slice(&mut buf.fmat[..], nbf, npts);
        f.gemm(1.0, &p_cols, &b, 0.0);
    }

    fn eval_exx_gmat(&self, basis: &BasisSet, task: &XcTask, tolerance: f64, buf: &mut TaskBuffers<'_>) {
        let (npts, nbf) = (buf.npts, buf.nbf);
        let max_size = basis.iter().map(|sh| sh.size()).max().unwrap_or(0);
        let mut ints = vec![0.0; max_size * max_size];

        for (i, r) in task.points.iter().enumerate() {
            let w = task.weights[i];
            if w == 0.0 {
                continue;
            }
            let fcol = &buf.fmat[i * nbf..(i + 1) * nbf];
            for (jsh, sh_s) in basis.iter().enumerate() {
                let (so, ns) = (basis.shell_offset(jsh), sh_s.size());
                let fmax = fcol[so..so + ns].iter().fold(0.0_f64, |m, v| m.max(v.abs()));
                if (w * fmax).abs() < tolerance {
                    continue;
                }
                for (ish, sh_n) in basis.iter().enumerate() {
                    let (no, nn) = (basis.shell_offset(ish), sh_n.size());
                    let block = &mut ints[..nn * ns];
                    coulomb_block_into(sh_n, sh_s, r, block);
                    for jj in 0..ns {
                        let f = w * fcol[so + jj];
                        for ii in 0..nn {
                            buf.gmat[(no + ii) * npts + i] += block[jj * nn + ii] * f;
                        }
                    }
                }
            }
        }
    }

    fn inc_exx_k(&self, task: &XcTask, buf: &mut TaskBuffers<'_>, k: &AtomicBuffer) {
        let (nbe, npts, nbf) = (buf.nbe, buf.npts, buf.nbf);
        {
            let b = DMatrixView::from_slice(&buf.basis[..nbe * npts], nbe, npts);
            let g = DMatrixView::from_slice(&buf.gmat[..], npts, nbf);
            let mut kl = DMatrixViewMut::from_slice(&mut buf.k_local[..], nbe, nbf);
            kl.gemm(1.0, &b, &g, 0.0);
        }
        for r in &task.screening.submat_map {
            for i in 0..r.len {
                let (la, fa) = (r.local_start + i, r.full_start + i);
                for nu in 0..nbf {
                    k.add(nu * nbf + fa, buf.k_local[nu * nbe + la]);
                }
            }
        }
    }
}
