#![allow(non_snake_case)]
extern crate nalgebra as na;

use na::Vector3;
use serde::{Deserialize, Serialize};

/// How many derivatives of a basis function are requested at a point.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DerivOrder {
    Value,
    Gradient,
    Hessian,
}

impl DerivOrder {
    /// Number of collocation blocks (value, gradient, Hessian components).
    pub fn ncomponents(&self) -> usize {
        match self {
            DerivOrder::Value => 1,
            DerivOrder::Gradient => 4,
            DerivOrder::Hessian => 10,
        }
    }
}

/// One Cartesian factor x^l exp(-alpha x^2) of a primitive Gaussian.
#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct GTO1d {
    pub alpha: f64,
    pub l: i32,
}

fn factorial(n: i32) -> f64 {
    (1..=n).fold(1.0, |acc, x| acc * x as f64)
}

impl GTO1d {
    pub fn new(alpha: f64, l: i32) -> Self {
        Self { alpha, l }
    }

    /// Normalization of x^l exp(-alpha x^2) over the real line.
    ///
    /// N^2 = (2^(3l) * l! * alpha^l * sqrt(2 alpha / pi)) / (2l)!
    pub fn norm(&self) -> f64 {
        let pi = std::f64::consts::PI;
        let numerator = 2.0_f64.powi(3 * self.l) * factorial(self.l) * self.alpha.powi(self.l);
        let denominator = factorial(2 * self.l);
        let factor = (2.0 * self.alpha / pi).sqrt();
        (numerator * factor / denominator).sqrt()
    }

    /// Polynomial prefactors of the value, first and second derivative.
    ///
    /// d^k/dx^k [x^l e^{-a x^2}] = p_k(x) e^{-a x^2}, the exponential is left
    /// to the caller so it can be shared by the three Cartesian directions.
    #[inline]
    pub fn poly_derivs(&self, x: f64) -> [f64; 3] {
        let l = self.l;
        let a = self.alpha;
        let xl = x.powi(l);
        let lower1 = if l >= 1 { l as f64 * x.powi(l - 1) } else { 0.0 };
        let lower2 = if l >= 2 {
            (l * (l - 1)) as f64 * x.powi(l - 2)
        } else {
            0.0
        };

        let p0 = xl;
        let p1 = lower1 - 2.0 * a * xl * x;
        let p2 = lower2 - 2.0 * a * (2.0 * l as f64 + 1.0) * xl + 4.0 * a * a * xl * x * x;
        [p0, p1, p2]
    }
}

/// Hermite expansion coefficient E^{ij}_t of a 1-D Gaussian product.
///
/// `qx` is the separation A_x - B_x of the two centers, `a` and `b` the exponents.
pub fn hermite_expansion(i: i32, j: i32, t: i32, qx: f64, a: f64, b: f64) -> f64 {
    let p = a + b;
    let q = a * b / p;

    if t < 0 || t > i + j || i < 0 || j < 0 {
        0.0
    } else if i == 0 && j == 0 && t == 0 {
        (-q * qx * qx).exp()
    } else if j == 0 {
        hermite_expansion(i - 1, j, t - 1, qx, a, b) / (2.0 * p)
            - hermite_expansion(i - 1, j, t, qx, a, b) * q * qx / a
            + hermite_expansion(i - 1, j, t + 1, qx, a, b) * ((t + 1) as f64)
    } else {
        hermite_expansion(i, j - 1, t - 1, qx, a, b) / (2.0 * p)
            + hermite_expansion(i, j - 1, t, qx, a, b) * q * qx / b
            + hermite_expansion(i, j - 1, t + 1, qx, a, b) * ((t + 1) as f64)
    }
}

/// Auxiliary Hermite Coulomb integral R^n_{tuv}.
///
/// `pc` is P - C and `boys[k]` must hold (-2p)^k F_k(p |PC|^2) for every
/// k up to t + u + v + n.
pub fn hermite_coulomb(t: i32, u: i32, v: i32, n: usize, pc: &Vector3<f64>, boys: &[f64]) -> f64 {
    if t < 0 || u < 0 || v < 0 {
        return 0.0;
    }
    if t == 0 && u == 0 && v == 0 {
        return boys[n];
    }

    let mut val = 0.0;
    if t > 0 {
        if t > 1 {
            val += (t - 1) as f64 * hermite_coulomb(t - 2, u, v, n + 1, pc, boys);
        }
        val += pc.x * hermite_coulomb(t - 1, u, v, n + 1, pc, boys);
    } else if u > 0 {
        if u > 1 {
            val += (u - 1) as f64 * hermite_coulomb(t, u - 2, v, n + 1, pc, boys);
        }
        val += pc.y * hermite_coulomb(t, u - 1, v, n + 1, pc, boys);
    } else {
        if v > 1 {
            val += (v - 1) as f64 * hermite_coulomb(t, u, v - 2, n + 1, pc, boys);
        }
        val += pc.z * hermite_coulomb(t, u, v - 1, n + 1, pc, boys);
    }
    val
}

/// Cartesian exponent triples of a shell with angular momentum `l`,
/// ordered xx..x first, z..zz last.
pub fn cartesian_components(l: usize) -> Vec<Vector3<i32>> {
    let l = l as i32;
    let mut comps = Vec::with_capacity(((l + 1) * (l + 2) / 2) as usize);
    for lx in (0..=l).rev() {
        for ly in (0..=(l - lx)).rev() {
            comps.push(Vector3::new(lx, ly, l - lx - ly));
        }
    }
    comps
}
