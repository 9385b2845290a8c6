//! One-electron integrals over contracted shells (McMurchie-Davidson).

extern crate nalgebra as na;

use crate::basis::BasisSet;
use crate::gto::{hermite_coulomb, hermite_expansion};
use crate::helper::boys_array;
use crate::shell::Shell;
use itertools::iproduct;
use na::{DMatrix, Vector3};
use std::f64::consts::PI;

/// Overlap <a|b> for every component pair, `a.size() x b.size()`.
pub fn overlap_block(a: &Shell, b: &Shell) -> DMatrix<f64> {
    let ab = a.center - b.center;
    let mut out = DMatrix::zeros(a.size(), b.size());

    for (i, &alpha) in a.exponents.iter().enumerate() {
        for (j, &beta) in b.exponents.iter().enumerate() {
            let p = alpha + beta;
            let pref = (PI / p).powf(1.5);
            for ((ca, la), (cb, lb)) in iproduct!(
                a.components().iter().enumerate(),
                b.components().iter().enumerate()
            ) {
                let c = a.component_coefficients(ca)[i] * b.component_coefficients(cb)[j];
                let sx = hermite_expansion(la.x, lb.x, 0, ab.x, alpha, beta);
                let sy = hermite_expansion(la.y, lb.y, 0, ab.y, alpha, beta);
                let sz = hermite_expansion(la.z, lb.z, 0, ab.z, alpha, beta);
                out[(ca, cb)] += c * pref * sx * sy * sz;
            }
        }
    }
    out
}

/// Full overlap matrix of a basis.
pub fn overlap_matrix(basis: &BasisSet) -> DMatrix<f64> {
    let nbf = basis.nbf();
    let mut s = DMatrix::zeros(nbf, nbf);
    for (ish, jsh) in iproduct!(0..basis.nshells(), 0..basis.nshells()) {
        let block = overlap_block(&basis[ish], &basis[jsh]);
        s.view_mut(
            (basis.shell_offset(ish), basis.shell_offset(jsh)),
            (basis[ish].size(), basis[jsh].size()),
        )
        .copy_from(&block);
    }
    s
}

/// Coulomb potential integrals (a| 1/|r - c| |b), written column-major into
/// `out` (length `a.size() * b.size()`).
pub fn coulomb_block_into(a: &Shell, b: &Shell, c: &Vector3<f64>, out: &mut [f64]) {
    let (n_a, n_b) = (a.size(), b.size());
    assert_eq!(out.len(), n_a * n_b, "output buffer does not match shell pair");
    out.iter_mut().for_each(|v| *v = 0.0);

    let ab = a.center - b.center;
    let lsum = a.l + b.l;
    let mut boys = vec![0.0; lsum + 1];
    let nr = lsum + 1;
    let mut rtuv = vec![0.0; nr * nr * nr];

    for (i, &alpha) in a.exponents.iter().enumerate() {
        for (j, &beta) in b.exponents.iter().enumerate() {
            let p = alpha + beta;
            let center_p = (a.center * alpha + b.center * beta) / p;
            let pc = center_p - c;

            boys_array(lsum, p * pc.norm_squared(), &mut boys);
            let mut scale = 1.0;
            for v in boys.iter_mut() {
                *v *= scale;
                scale *= -2.0 * p;
            }

            for (t, u, v) in iproduct!(0..nr, 0..nr, 0..nr) {
                rtuv[(t * nr + u) * nr + v] = if t + u + v <= lsum {
                    hermite_coulomb(t as i32, u as i32, v as i32, 0, &pc, &boys)
                } else {
                    0.0
                };
            }

            let pref = 2.0 * PI / p;
            for (cb, lb) in b.components().iter().enumerate() {
                for (ca, la) in a.components().iter().enumerate() {
                    let coef = a.component_coefficients(ca)[i] * b.component_coefficients(cb)[j];
                    let mut val = 0.0;
                    for t in 0..=(la.x + lb.x) as usize {
                        let ex = hermite_expansion(la.x, lb.x, t as i32, ab.x, alpha, beta);
                        for u in 0..=(la.y + lb.y) as usize {
                            let ey = hermite_expansion(la.y, lb.y, u as i32, ab.y, alpha, beta);
                            for v in 0..=(la.z + lb.z) as usize {
                                let ez = hermite_expansion(la.z, lb.z, v as i32, ab.z, alpha, beta);
                                val += ex * ey * ez * rtuv[(t * nr + u) * nr + v];
                            }
                        }
                    }
                    out[cb * n_a + ca] += coef * pref * val;
                }
            }
        }
    }
}

pub fn coulomb_block(a: &Shell, b: &Shell, c: &Vector3<f64>) -> DMatrix<f64> {
    let mut buf = vec![0.0; a.size() * b.size()];
    coulomb_block_into(a, b, c, &mut buf);
    DMatrix::from_vec(a.size(), b.size(), buf)
}
