/* Contracted Cartesian Gaussian shells.

   A shell groups every Cartesian component x^lx y^ly z^lz (lx+ly+lz = l)
   sharing one set of exponents and contraction coefficients. Each component
   is normalized on its own.
*/

extern crate nalgebra as na;

use crate::gto::{cartesian_components, DerivOrder, GTO1d};
use crate::helper::double_factorial_odd;
use na::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Default magnitude below which a shell is considered negligible.
pub const DEFAULT_SHELL_TOLERANCE: f64 = 1e-10;

/// Number of collocation entries per Cartesian component: value, gradient
/// (x, y, z) and Hessian (xx, xy, xz, yy, yz, zz).
pub const NDERIV: usize = 10;

/// Per-element description of a shell, as found in a basis set library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellSpec {
    pub l: usize,
    pub exponents: Vec<f64>,
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shell {
    pub center: Vector3<f64>,
    pub l: usize,
    pub exponents: Vec<f64>,
    /// Contraction coefficients as given (for normalized primitives).
    pub coefficients: Vec<f64>,
    /// Index of the atom this shell is attached to.
    pub atom: usize,
    components: Vec<Vector3<i32>>,
    // normalized expansion coefficients, [component][primitive]
    norm_coeffs: Vec<Vec<f64>>,
    tolerance: f64,
    cutoff_radius: f64,
}

impl Shell {
    pub fn new(
        atom: usize,
        center: Vector3<f64>,
        l: usize,
        exponents: Vec<f64>,
        coefficients: Vec<f64>,
    ) -> Self {
        assert_eq!(
            exponents.len(),
            coefficients.len(),
            "every primitive needs one contraction coefficient"
        );
        let components = cartesian_components(l);
        let norm_coeffs = components
            .iter()
            .map(|lxyz| Self::normalized_coefficients(lxyz, &exponents, &coefficients))
            .collect();

        let mut shell = Self {
            center,
            l,
            exponents,
            coefficients,
            atom,
            components,
            norm_coeffs,
            tolerance: DEFAULT_SHELL_TOLERANCE,
            cutoff_radius: 0.0,
        };
        shell.cutoff_radius = shell.compute_cutoff_radius();
        shell
    }

    pub fn from_spec(atom: usize, center: Vector3<f64>, spec: &ShellSpec) -> Self {
        Self::new(
            atom,
            center,
            spec.l,
            spec.exponents.clone(),
            spec.coefficients.clone(),
        )
    }

    /// Primitive norms times contraction coefficients, rescaled so the
    /// contracted component has unit self-overlap.
    fn normalized_coefficients(lxyz: &Vector3<i32>, exponents: &[f64], coefficients: &[f64]) -> Vec<f64> {
        let mut coeffs: Vec<f64> = exponents
            .iter()
            .zip(coefficients)
            .map(|(&alpha, &c)| {
                let norm = GTO1d::new(alpha, lxyz.x).norm()
                    * GTO1d::new(alpha, lxyz.y).norm()
                    * GTO1d::new(alpha, lxyz.z).norm();
                c * norm
            })
            .collect();

        // int x^{2l} e^{-p x^2} dx = (2l-1)!! / (2p)^l * sqrt(pi / p)
        let moment = |l: i32, p: f64| double_factorial_odd(l) / (2.0 * p).powi(l) * (PI / p).sqrt();

        let mut self_overlap = 0.0;
        for (i, &ai) in exponents.iter().enumerate() {
            for (j, &aj) in exponents.iter().enumerate() {
                let p = ai + aj;
                self_overlap += coeffs[i]
                    * coeffs[j]
                    * moment(lxyz.x, p)
                    * moment(lxyz.y, p)
                    * moment(lxyz.z, p);
            }
        }
        let scale = 1.0 / self_overlap.sqrt();
        coeffs.iter_mut().for_each(|c| *c *= scale);
        coeffs
    }

    /// Number of Cartesian basis functions in the shell.
    pub fn size(&self) -> usize {
        self.components.len()
    }

    pub fn nprim(&self) -> usize {
        self.exponents.len()
    }

    pub fn components(&self) -> &[Vector3<i32>] {
        &self.components
    }

    /// Expansion coefficients of component `comp` over the primitives
    /// exp(-alpha r^2) (normalization folded in).
    pub fn component_coefficients(&self, comp: usize) -> &[f64] {
        &self.norm_coeffs[comp]
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn cutoff_radius(&self) -> f64 {
        self.cutoff_radius
    }

    pub fn set_shell_tolerance(&mut self, tol: f64) {
        self.tolerance = tol;
        self.cutoff_radius = self.compute_cutoff_radius();
    }

    /// Radius beyond which every primitive satisfies |c| r^l e^{-a r^2} < tol.
    fn compute_cutoff_radius(&self) -> f64 {
        let l = self.l as f64;
        let log_tol = self.tolerance.ln();

        self.exponents
            .iter()
            .enumerate()
            .map(|(k, &alpha)| {
                let cmax = self
                    .norm_coeffs
                    .iter()
                    .map(|c| c[k].abs())
                    .fold(0.0_f64, f64::max);
                if cmax == 0.0 {
                    return 0.0;
                }
                let log_c = cmax.ln();
                let excess = |r: f64| {
                    let lr = if r > 0.0 { l * r.ln() } else if l == 0.0 { 0.0 } else { f64::NEG_INFINITY };
                    log_c + lr - alpha * r * r - log_tol
                };

                let r_peak = (l / (2.0 * alpha)).sqrt();
                if excess(r_peak) <= 0.0 {
                    return r_peak;
                }

                let mut lo = r_peak;
                let mut hi = r_peak + 1.0;
                while excess(hi) > 0.0 {
                    lo = hi;
                    hi *= 2.0;
                }
                for _ in 0..100 {
                    let mid = 0.5 * (lo + hi);
                    if excess(mid) > 0.0 {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                    if hi - lo < 1e-12 * hi {
                        break;
                    }
                }
                hi
            })
            .fold(0.0_f64, f64::max)
    }

    /// Evaluate every component of the shell at `r`.
    ///
    /// `visit(comp, derivs)` receives, for each Cartesian component, the value
    /// followed by the gradient and the Hessian (xx, xy, xz, yy, yz, zz);
    /// entries beyond `order` are zero.
    pub fn evaluate<F>(&self, r: &Vector3<f64>, order: DerivOrder, mut visit: F)
    where
        F: FnMut(usize, &[f64; NDERIV]),
    {
        let d = r - self.center;
        let r2 = d.norm_squared();

        for (comp, lxyz) in self.components.iter().enumerate() {
            let mut out = [0.0; NDERIV];
            for (k, &alpha) in self.exponents.iter().enumerate() {
                let c = self.norm_coeffs[comp][k];
                let e = c * (-alpha * r2).exp();
                if e == 0.0 {
                    continue;
                }
                let px = GTO1d::new(alpha, lxyz.x).poly_derivs(d.x);
                let py = GTO1d::new(alpha, lxyz.y).poly_derivs(d.y);
                let pz = GTO1d::new(alpha, lxyz.z).poly_derivs(d.z);

                out[0] += e * px[0] * py[0] * pz[0];
                if order >= DerivOrder::Gradient {
                    out[1] += e * px[1] * py[0] * pz[0];
                    out[2] += e * px[0] * py[1] * pz[0];
                    out[3] += e * px[0] * py[0] * pz[1];
                }
                if order >= DerivOrder::Hessian {
                    out[4] += e * px[2] * py[0] * pz[0];
                    out[5] += e * px[1] * py[1] * pz[0];
                    out[6] += e * px[1] * py[0] * pz[1];
                    out[7] += e * px[0] * py[2] * pz[0];
                    out[8] += e * px[0] * py[1] * pz[1];
                    out[9] += e * px[0] * py[0] * pz[2];
                }
            }
            visit(comp, &out);
        }
    }

    /// Values of every component at `r`, convenience wrapper over [`Shell::evaluate`].
    pub fn values(&self, r: &Vector3<f64>) -> Vec<f64> {
        let mut vals = vec![0.0; self.size()];
        self.evaluate(r, DerivOrder::Value, |comp, d| vals[comp] = d[0]);
        vals
    }
}
