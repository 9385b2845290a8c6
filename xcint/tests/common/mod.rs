//! Shared fixtures: a water-like molecule in a minimal basis on a small
//! product grid, and helpers to build integrators around it.
#![allow(dead_code)]

use basis::{BasisSet, ShellSpec};
use nalgebra::{DMatrix, Vector3};
use std::f64::consts::PI;
use std::sync::Arc;
use xcint::{
    AtomicGrid, LoadBalancer, LoadBalancerSettings, LocalWorkDriver, MolGrid, Molecule,
    MolecularWeights, ProcessGroup, ReductionDriver, ReferenceHostDriver, Scheduler, SerialGroup,
    TaskOrder, XcFunctional, XcIntegrator,
};

/// Gauss-Legendre nodes and weights on [-1, 1].
pub fn gauss_legendre(n: usize) -> Vec<(f64, f64)> {
    let legendre = |x: f64| {
        let (mut p0, mut p1) = (1.0, x);
        for k in 2..=n {
            let kf = k as f64;
            (p0, p1) = (p1, ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf);
        }
        let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
        (p1, dp)
    };
    (1..=n)
        .map(|i| {
            let mut x = (PI * (i as f64 - 0.25) / (n as f64 + 0.5)).cos();
            for _ in 0..100 {
                let (p, dp) = legendre(x);
                let dx = p / dp;
                x -= dx;
                if dx.abs() < 1e-15 {
                    break;
                }
            }
            let (_, dp) = legendre(x);
            (x, 2.0 / ((1.0 - x * x) * dp * dp))
        })
        .collect()
}

/// Radial nodes r = rm (1 + x) / (1 - x); weights include r^2.
pub fn becke_radial(n: usize, rm: f64) -> Vec<(f64, f64)> {
    gauss_legendre(n)
        .into_iter()
        .map(|(x, w)| {
            let r = rm * (1.0 + x) / (1.0 - x);
            (r, w * 2.0 * rm / (1.0 - x).powi(2) * r * r)
        })
        .collect()
}

/// 26-point Lebedev rule, weights summing to 4 pi.
pub fn lebedev_26() -> Vec<(Vector3<f64>, f64)> {
    let mut out = Vec::with_capacity(26);
    for axis in 0..3 {
        for sign in [1.0, -1.0] {
            let mut d = Vector3::zeros();
            d[axis] = sign;
            out.push((d, 4.0 * PI / 21.0));
        }
    }
    let s2 = 0.5_f64.sqrt();
    for a in [s2, -s2] {
        for b in [s2, -s2] {
            for d in [
                Vector3::new(a, b, 0.0),
                Vector3::new(a, 0.0, b),
                Vector3::new(0.0, a, b),
            ] {
                out.push((d, 4.0 * PI * 4.0 / 105.0));
            }
        }
    }
    let s3 = 1.0 / 3.0_f64.sqrt();
    for a in [s3, -s3] {
        for b in [s3, -s3] {
            for c in [s3, -s3] {
                out.push((Vector3::new(a, b, c), 4.0 * PI * 9.0 / 280.0));
            }
        }
    }
    out
}

pub fn atomic_grid() -> AtomicGrid {
    AtomicGrid::product(&becke_radial(40, 1.0), &lebedev_26())
}

pub fn water() -> Molecule {
    Molecule::from_symbols(&[
        ("O", [0.0, 0.0, 0.0]),
        ("H", [0.0, 1.43, 1.1]),
        ("H", [0.0, -1.43, 1.1]),
    ])
    .unwrap()
}

fn sto3g(symbol: &str) -> Vec<ShellSpec> {
    let contraction = vec![0.15432897, 0.53532814, 0.44463454];
    match symbol {
        "H" => vec![ShellSpec {
            l: 0,
            exponents: vec![3.42525091, 0.62391373, 0.16885540],
            coefficients: contraction,
        }],
        "O" => {
            let sp = vec![5.0331513, 1.1695961, 0.380389];
            vec![
                ShellSpec {
                    l: 0,
                    exponents: vec![130.70932, 23.808861, 6.4436083],
                    coefficients: contraction,
                },
                ShellSpec {
                    l: 0,
                    exponents: sp.clone(),
                    coefficients: vec![-0.09996723, 0.39951283, 0.70011547],
                },
                ShellSpec {
                    l: 1,
                    exponents: sp,
                    coefficients: vec![0.15591627, 0.60768372, 0.39195739],
                },
            ]
        }
        other => panic!("no STO-3G shells for {}", other),
    }
}

pub fn basis_for(molecule: &Molecule) -> BasisSet {
    let specs: Vec<(Vector3<f64>, Vec<ShellSpec>)> = molecule
        .iter()
        .map(|a| (a.position, sto3g(&a.symbol)))
        .collect();
    BasisSet::from_atoms(specs.iter().map(|(c, s)| (*c, s.as_slice())))
}

pub fn grid_for(molecule: &Molecule) -> MolGrid {
    let mut grid = MolGrid::new();
    for atom in molecule.iter() {
        grid.insert(atom.atomic_number, atomic_grid());
    }
    grid
}

/// Closed-shell density 2 C C^T of five fixed orbitals.
pub fn density(nbf: usize) -> DMatrix<f64> {
    let c = DMatrix::from_fn(nbf, 5, |i, k| {
        0.5 * (0.7 * ((i + 1) * (k + 1)) as f64 + 0.3 * k as f64).sin()
    });
    &c * c.transpose() * 2.0
}

pub struct Fixture {
    pub molecule: Molecule,
    pub basis: BasisSet,
    pub grid: MolGrid,
    pub density: DMatrix<f64>,
}

pub fn water_fixture() -> Fixture {
    let molecule = water();
    let basis = basis_for(&molecule);
    let grid = grid_for(&molecule);
    let density = density(basis.nbf());
    Fixture {
        molecule,
        basis,
        grid,
        density,
    }
}

pub struct Options {
    pub batch_size: usize,
    pub basis_tolerance: f64,
    pub threads: usize,
    pub order: TaskOrder,
    pub modify_weights: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            batch_size: 64,
            basis_tolerance: 1e-10,
            threads: 4,
            order: TaskOrder::CostDescending,
            modify_weights: true,
        }
    }
}

pub fn build_with(
    fx: &Fixture,
    basis: BasisSet,
    functional: Arc<dyn XcFunctional>,
    driver: Box<dyn LocalWorkDriver>,
    group: Arc<dyn ProcessGroup>,
    reduction: Arc<dyn ReductionDriver>,
    opts: &Options,
) -> XcIntegrator {
    let settings = LoadBalancerSettings {
        batch_size: opts.batch_size,
        basis_tolerance: opts.basis_tolerance,
    };
    let lb = LoadBalancer::with_inputs(group, settings, fx.molecule.clone(), fx.grid.clone(), basis);
    let scheduler = Scheduler::new(Some(opts.threads), opts.order).unwrap();
    let mut integrator = XcIntegrator::new(lb, driver, reduction, functional, scheduler);
    if opts.modify_weights {
        MolecularWeights::default()
            .modify_weights(integrator.load_balancer_mut())
            .unwrap();
    }
    integrator
}

/// Serial integrator with the reference driver.
pub fn integrator(fx: &Fixture, functional: Arc<dyn XcFunctional>, opts: &Options) -> XcIntegrator {
    build_with(
        fx,
        fx.basis.clone(),
        functional,
        Box::new(ReferenceHostDriver),
        Arc::new(SerialGroup),
        Arc::new(SerialGroup),
        opts,
    )
}

pub fn assert_close(a: f64, b: f64, tol: f64, what: &str) {
    assert!((a - b).abs() < tol, "{}: {} vs {} (diff {:e})", what, a, b, (a - b).abs());
}
