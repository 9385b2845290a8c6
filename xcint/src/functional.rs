//! Exchange-correlation functional evaluators.
//!
//! The integrator only sees [`XcFunctional`]; the two exchange functionals
//! below are reference evaluators for the command line and the tests.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Densities below this are treated as zero by the reference evaluators.
const DENSITY_THRESHOLD: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionalKind {
    /// Depends on the density only.
    Lda,
    /// Depends on the density and gamma = |grad rho|^2.
    Gga,
}

/// Stateless, vectorized evaluator of a functional.
///
/// `eps` is the energy per particle, so the energy density is `rho * eps`.
/// `vrho` and `vgamma` are the partial derivatives of `rho * eps`.
///
/// The polarized entry points take interleaved per-point arrays: `rho` and
/// `vrho` as (up, down), `sigma` and `vsigma` as (up.up, up.down, down.down).
/// There `eps` is per particle of the total density `rho_up + rho_down`.
pub trait XcFunctional: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> FunctionalKind;

    fn is_gga(&self) -> bool {
        self.kind() == FunctionalKind::Gga
    }

    fn eval_exc_vxc_lda(&self, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]);

    fn eval_exc_vxc_gga(
        &self,
        rho: &[f64],
        gamma: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
        vgamma: &mut [f64],
    ) {
        let _ = gamma;
        self.eval_exc_vxc_lda(rho, eps, vrho);
        vgamma.iter_mut().for_each(|v| *v = 0.0);
    }

    fn eval_exc_vxc_lda_pol(&self, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]);

    fn eval_exc_vxc_gga_pol(
        &self,
        rho: &[f64],
        sigma: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
        vsigma: &mut [f64],
    ) {
        let _ = sigma;
        self.eval_exc_vxc_lda_pol(rho, eps, vrho);
        vsigma.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Exchange separates by spin:
/// E[rho_up, rho_down] = (E[2 rho_up] + E[2 rho_down]) / 2.
/// Each spin is evaluated as an unpolarized density of twice its value.
fn spin_scaled_lda(f: &dyn XcFunctional, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]) {
    for (i, e) in eps.iter_mut().enumerate() {
        let (ra, rb) = (rho[2 * i], rho[2 * i + 1]);
        let (mut es, mut vs) = ([0.0; 2], [0.0; 2]);
        f.eval_exc_vxc_lda(&[2.0 * ra, 2.0 * rb], &mut es, &mut vs);
        vrho[2 * i] = vs[0];
        vrho[2 * i + 1] = vs[1];
        let total = ra + rb;
        *e = if total > DENSITY_THRESHOLD {
            (ra * es[0] + rb * es[1]) / total
        } else {
            0.0
        };
    }
}

/// Spin-scaled GGA exchange; sigma_up_down does not enter.
fn spin_scaled_gga(
    f: &dyn XcFunctional,
    rho: &[f64],
    sigma: &[f64],
    eps: &mut [f64],
    vrho: &mut [f64],
    vsigma: &mut [f64],
) {
    for (i, e) in eps.iter_mut().enumerate() {
        let (ra, rb) = (rho[2 * i], rho[2 * i + 1]);
        let gammas = [4.0 * sigma[3 * i], 4.0 * sigma[3 * i + 2]];
        let (mut es, mut vs, mut vg) = ([0.0; 2], [0.0; 2], [0.0; 2]);
        f.eval_exc_vxc_gga(&[2.0 * ra, 2.0 * rb], &gammas, &mut es, &mut vs, &mut vg);
        vrho[2 * i] = vs[0];
        vrho[2 * i + 1] = vs[1];
        vsigma[3 * i] = 2.0 * vg[0];
        vsigma[3 * i + 1] = 0.0;
        vsigma[3 * i + 2] = 2.0 * vg[1];
        let total = ra + rb;
        *e = if total > DENSITY_THRESHOLD {
            (ra * es[0] + rb * es[1]) / total
        } else {
            0.0
        };
    }
}

fn c_x() -> f64 {
    -0.75 * (3.0 / PI).powf(1.0 / 3.0)
}

/// Slater (LDA) exchange, spin-unpolarized.
///
/// eps = c_x rho^(1/3), vrho = 4/3 c_x rho^(1/3), c_x = -(3/4) (3/pi)^(1/3)
#[derive(Debug, Clone, Copy, Default)]
pub struct SlaterExchange;

impl XcFunctional for SlaterExchange {
    fn name(&self) -> &str {
        "slater"
    }

    fn kind(&self) -> FunctionalKind {
        FunctionalKind::Lda
    }

    fn eval_exc_vxc_lda(&self, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]) {
        let cx = c_x();
        for ((&r, e), v) in rho.iter().zip(eps.iter_mut()).zip(vrho.iter_mut()) {
            if r <= DENSITY_THRESHOLD {
                *e = 0.0;
                *v = 0.0;
                continue;
            }
            let r13 = r.cbrt();
            *e = cx * r13;
            *v = 4.0 / 3.0 * cx * r13;
        }
    }

    fn eval_exc_vxc_lda_pol(&self, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]) {
        spin_scaled_lda(self, rho, eps, vrho);
    }
}

/// PBE exchange (no correlation), spin-unpolarized.
#[derive(Debug, Clone, Copy)]
pub struct PbeExchange {
    kappa: f64,
    mu: f64,
}

impl Default for PbeExchange {
    fn default() -> Self {
        Self {
            kappa: 0.804,
            mu: 0.219_514_972_764_517_1,
        }
    }
}

impl XcFunctional for PbeExchange {
    fn name(&self) -> &str {
        "pbe_x"
    }

    fn kind(&self) -> FunctionalKind {
        FunctionalKind::Gga
    }

    fn eval_exc_vxc_lda(&self, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]) {
        // F_x(s = 0) = 1
        SlaterExchange.eval_exc_vxc_lda(rho, eps, vrho);
    }

    fn eval_exc_vxc_gga(
        &self,
        rho: &[f64],
        gamma: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
        vgamma: &mut [f64],
    ) {
        let cx = c_x();
        // s^2 = gamma / (4 (3 pi^2)^(2/3) rho^(8/3))
        let s2_pref = 1.0 / (4.0 * (3.0 * PI * PI).powf(2.0 / 3.0));

        for i in 0..rho.len() {
            let r = rho[i];
            if r <= DENSITY_THRESHOLD {
                eps[i] = 0.0;
                vrho[i] = 0.0;
                vgamma[i] = 0.0;
                continue;
            }
            let r13 = r.cbrt();
            let r83 = r * r * r13 * r13;
            let g = gamma[i].max(0.0);
            let s2 = s2_pref * g / r83;

            let t = 1.0 + self.mu * s2 / self.kappa;
            let fx = 1.0 + self.kappa - self.kappa / t;
            let dfx_ds2 = self.mu / (t * t);

            eps[i] = cx * r13 * fx;
            vrho[i] = cx * r13 * (4.0 / 3.0 * fx - 8.0 / 3.0 * s2 * dfx_ds2);
            vgamma[i] = cx * r * r13 * dfx_ds2 * s2_pref / r83;
        }
    }

    fn eval_exc_vxc_lda_pol(&self, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]) {
        SlaterExchange.eval_exc_vxc_lda_pol(rho, eps, vrho);
    }

    fn eval_exc_vxc_gga_pol(
        &self,
        rho: &[f64],
        sigma: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
        vsigma: &mut [f64],
    ) {
        spin_scaled_gga(self, rho, sigma, eps, vrho, vsigma);
    }
}

/// Look up a reference functional by name.
pub fn functional_by_name(name: &str) -> Option<Box<dyn XcFunctional>> {
    match name.to_lowercase().as_str() {
        "slater" | "lda_x" | "lda" => Some(Box::new(SlaterExchange)),
        "pbe_x" | "pbe" => Some(Box::new(PbeExchange::default())),
        _ => None,
    }
}
