//! Per-worker scratch arena.
//!
//! One flat allocation is carved into named regions sized for the current
//! task. The arena only grows; a worker reuses it for every task it runs.

use crate::functional::FunctionalKind;
use basis::DerivOrder;
use tracing::debug;

/// Which regions a pass needs, in units of task-sized blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchLayout {
    /// Collocation derivative order; the number of `nbe * npts` blocks
    /// follows from it.
    pub order: DerivOrder,
    /// Number of `nbe * npts` X-matrix blocks.
    pub xmat_blocks: usize,
    /// Functional inputs and outputs (eps, vrho).
    pub functional: bool,
    /// Density gradient, gamma and vgamma.
    pub gga: bool,
    /// Z matrix and local potential block.
    pub potential: bool,
    /// F and G matrices over the full basis and the local K block.
    pub exx: bool,
    /// Spin-resolved functional regions in place of the restricted ones.
    pub polarized: bool,
}

impl ScratchLayout {
    pub fn density() -> Self {
        Self {
            order: DerivOrder::Value,
            xmat_blocks: 1,
            functional: false,
            gga: false,
            potential: false,
            exx: false,
            polarized: false,
        }
    }

    pub fn exc_vxc(kind: FunctionalKind) -> Self {
        let gga = kind == FunctionalKind::Gga;
        Self {
            order: if gga { DerivOrder::Gradient } else { DerivOrder::Value },
            xmat_blocks: 1,
            functional: true,
            gga,
            potential: true,
            exx: false,
            polarized: false,
        }
    }

    /// Energy and the scalar and z potentials of a spin-polarized density.
    pub fn exc_vxc_uks(kind: FunctionalKind) -> Self {
        Self {
            polarized: true,
            ..Self::exc_vxc(kind)
        }
    }

    /// Gradients need one derivative order more than the energy, and for
    /// GGA the X matrix of every gradient block.
    pub fn exc_grad(kind: FunctionalKind) -> Self {
        let gga = kind == FunctionalKind::Gga;
        Self {
            order: if gga { DerivOrder::Hessian } else { DerivOrder::Gradient },
            xmat_blocks: if gga { 4 } else { 1 },
            functional: true,
            gga,
            potential: false,
            exx: false,
            polarized: false,
        }
    }

    pub fn exx() -> Self {
        Self {
            order: DerivOrder::Value,
            xmat_blocks: 0,
            functional: false,
            gga: false,
            potential: false,
            exx: true,
            polarized: false,
        }
    }

    fn sizes(&self, npts: usize, nbe: usize, nbf: usize) -> [usize; 23] {
        let blk = npts * nbe;
        let func = if self.functional { npts } else { 0 };
        let gga = if self.gga && !self.polarized { npts } else { 0 };
        let pol = if self.polarized { npts } else { 0 };
        let pol_gga = if self.polarized && self.gga { npts } else { 0 };
        let pot = self.potential as usize;
        let exx = self.exx as usize;
        [
            self.order.ncomponents() * blk,   // basis
            if self.xmat_blocks > 0 { nbe * nbe } else { 0 }, // submat
            self.xmat_blocks * blk,           // xmat
            npts,                             // den
            3 * gga,                          // den_grad
            gga,                              // gamma
            func,                             // eps
            func,                             // vrho
            if self.functional { gga } else { 0 }, // vgamma
            pot * blk,                        // zmat
            pot * nbe * nbe,                  // vxc_local
            exx * nbf * nbe,                  // p_cols
            exx * nbf * npts,                 // fmat
            exx * nbf * npts,                 // gmat
            exx * nbe * nbf,                  // k_local
            2 * pol,                          // den_sz
            6 * pol_gga,                      // den_grad_sz
            2 * pol,                          // rho_ud
            3 * pol_gga,                      // sigma
            2 * pol,                          // vrho_ud
            3 * pol_gga,                      // vsigma
            2 * pol,                          // vrho_sz
            6 * pol_gga,                      // vgrad_sz
        ]
    }

    pub fn total_len(&self, npts: usize, nbe: usize, nbf: usize) -> usize {
        self.sizes(npts, nbe, nbf).iter().sum()
    }
}

/// Named views into the arena for one task. All matrices are column-major.
pub struct TaskBuffers<'a> {
    pub npts: usize,
    pub nbe: usize,
    pub nbf: usize,
    /// Collocation blocks (value, x, y, z, xx, xy, xz, yy, yz, zz), each
    /// `nbe x npts`.
    pub basis: &'a mut [f64],
    /// Density matrix restricted to the screened functions, `nbe x nbe`.
    pub submat: &'a mut [f64],
    /// `submat` times each needed collocation block, `nbe x npts` each.
    pub xmat: &'a mut [f64],
    pub den: &'a mut [f64],
    /// Density gradient, x then y then z block of `npts`.
    pub den_grad: &'a mut [f64],
    pub gamma: &'a mut [f64],
    pub eps: &'a mut [f64],
    pub vrho: &'a mut [f64],
    pub vgamma: &'a mut [f64],
    /// Potential contraction, `npts x nbe`.
    pub zmat: &'a mut [f64],
    pub vxc_local: &'a mut [f64],
    /// Density matrix columns of the screened functions, `nbf x nbe`.
    pub p_cols: &'a mut [f64],
    /// P B over the full basis, `nbf x npts`.
    pub fmat: &'a mut [f64],
    /// Weighted Coulomb contraction, `npts x nbf`.
    pub gmat: &'a mut [f64],
    /// Exchange rows of the screened functions, `nbe x nbf`.
    pub k_local: &'a mut [f64],
    /// Scalar (up + down) then z (up - down) density, a block of `npts` each.
    pub den_sz: &'a mut [f64],
    /// Scalar then z density gradient, x, y, z blocks of `npts` each.
    pub den_grad_sz: &'a mut [f64],
    /// Spin densities interleaved (up, down) per point.
    pub rho_ud: &'a mut [f64],
    /// (up.up, up.down, down.down) gradient products per point.
    pub sigma: &'a mut [f64],
    pub vrho_ud: &'a mut [f64],
    pub vsigma: &'a mut [f64],
    /// Derivative of the energy density by the scalar and z densities.
    pub vrho_sz: &'a mut [f64],
    /// Derivative by the scalar and z density gradients, laid out like
    /// `den_grad_sz`.
    pub vgrad_sz: &'a mut [f64],
}

impl<'a> TaskBuffers<'a> {
    pub fn block_len(&self) -> usize {
        self.npts * self.nbe
    }

    /// Collocation block `comp` (0 value, 1..4 gradient, 4..10 Hessian).
    pub fn basis_block(&self, comp: usize) -> &[f64] {
        let blk = self.block_len();
        &self.basis[comp * blk..(comp + 1) * blk]
    }

    pub fn xmat_block(&self, comp: usize) -> &[f64] {
        let blk = self.block_len();
        &self.xmat[comp * blk..(comp + 1) * blk]
    }
}

fn take<'a>(rest: &mut &'a mut [f64], n: usize) -> &'a mut [f64] {
    let (head, tail) = std::mem::take(rest).split_at_mut(n);
    *rest = tail;
    head
}

#[derive(Debug, Default)]
pub struct HostScratch {
    arena: Vec<f64>,
}

impl HostScratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Zeroed buffers for a task of `npts` points and `nbe` screened
    /// functions, growing the arena if needed.
    pub fn prepare(&mut self, npts: usize, nbe: usize, nbf: usize, layout: &ScratchLayout) -> TaskBuffers<'_> {
        let sizes = layout.sizes(npts, nbe, nbf);
        let total: usize = sizes.iter().sum();
        if total > self.arena.len() {
            debug!("growing scratch arena from {} to {} values", self.arena.len(), total);
            self.arena.resize(total, 0.0);
        }
        let region = &mut self.arena[..total];
        region.fill(0.0);

        let mut rest = region;
        TaskBuffers {
            npts,
            nbe,
            nbf,
            basis: take(&mut rest, sizes[0]),
            submat: take(&mut rest, sizes[1]),
            xmat: take(&mut rest, sizes[2]),
            den: take(&mut rest, sizes[3]),
            den_grad: take(&mut rest, sizes[4]),
            gamma: take(&mut rest, sizes[5]),
            eps: take(&mut rest, sizes[6]),
            vrho: take(&mut rest, sizes[7]),
            vgamma: take(&mut rest, sizes[8]),
            zmat: take(&mut rest, sizes[9]),
            vxc_local: take(&mut rest, sizes[10]),
            p_cols: take(&mut rest, sizes[11]),
            fmat: take(&mut rest, sizes[12]),
            gmat: take(&mut rest, sizes[13]),
            k_local: take(&mut rest, sizes[14]),
            den_sz: take(&mut rest, sizes[15]),
            den_grad_sz: take(&mut rest, sizes[16]),
            rho_ud: take(&mut rest, sizes[17]),
            sigma: take(&mut rest, sizes[18]),
            vrho_ud: take(&mut rest, sizes[19]),
            vsigma: take(&mut rest, sizes[20]),
            vrho_sz: take(&mut rest, sizes[21]),
            vgrad_sz: take(&mut rest, sizes[22]),
        }
    }
}
