use libm::erf;
use std::f64::consts::PI;

/// Above this argument the Boys function is built by upward recursion from F_0.
const BOYS_ASYMPTOTIC_X: f64 = 30.0;

/// Fill `out[0..=nmax]` with the Boys function F_n(x).
///
/// Small and moderate arguments use the power series for F_nmax followed by
/// downward recursion, large arguments use the closed form of F_0 and upward
/// recursion.
pub fn boys_array(nmax: usize, x: f64, out: &mut [f64]) {
    assert!(out.len() > nmax, "output buffer too small for Boys order {}", nmax);
    assert!(x >= 0.0, "x must be nonnegative");

    if x < 1e-14 {
        for (n, v) in out.iter_mut().enumerate().take(nmax + 1) {
            *v = 1.0 / (2 * n + 1) as f64;
        }
        return;
    }

    let ex = (-x).exp();
    if x > BOYS_ASYMPTOTIC_X {
        let sx = x.sqrt();
        out[0] = 0.5 * (PI / x).sqrt() * erf(sx);
        for n in 0..nmax {
            out[n + 1] = ((2 * n + 1) as f64 * out[n] - ex) / (2.0 * x);
        }
        return;
    }

    // F_n(x) = e^{-x} sum_k (2x)^k / ((2n+1)(2n+3)...(2n+2k+1))
    let mut term = 1.0 / (2 * nmax + 1) as f64;
    let mut sum = term;
    for k in 1..1000 {
        term *= 2.0 * x / (2 * nmax + 2 * k + 1) as f64;
        sum += term;
        if term < 1e-17 * sum {
            break;
        }
    }
    out[nmax] = ex * sum;
    for n in (0..nmax).rev() {
        out[n] = (2.0 * x * out[n + 1] + ex) / (2 * n + 1) as f64;
    }
}

/// Boys function F_n(x).
pub fn boys_function(n: usize, x: f64) -> f64 {
    let mut vals = vec![0.0; n + 1];
    boys_array(n, x, &mut vals);
    vals[n]
}

/// (2n-1)!! with the convention (-1)!! = 1.
pub fn double_factorial_odd(n: i32) -> f64 {
    let mut acc = 1.0;
    let mut k = 2 * n - 1;
    while k > 1 {
        acc *= k as f64;
        k -= 2;
    }
    acc
}
