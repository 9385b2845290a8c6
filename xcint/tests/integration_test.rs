//! End-to-end checks of the integration passes on a water-like molecule in a
//! minimal basis.

mod common;

use basis::integrals::{coulomb_block, overlap_matrix};
use basis::{BasisSet, DerivOrder};
use common::*;
use nalgebra::{DMatrix, DVector, Vector3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use xcint::grid::slater_radius;
use xcint::local_work_driver::TaskBuffers;
use xcint::weights::FuzzyCells;
use xcint::{
    AtomicBuffer, AtomicGrid, ExecutionSpace, ExxSettings, LocalWorkDriver, MatrixRef, MolGrid,
    Molecule, MolecularWeights, PbeExchange, Quantity, ReductionDriver, ReductionOp,
    ReferenceHostDriver, SerialGroup, SlaterExchange, SpinComponent, TaskOrder, ThreadGroup,
    XcError, XcFunctional, XcTask,
};

fn slater() -> Arc<dyn XcFunctional> {
    Arc::new(SlaterExchange)
}

fn pbe() -> Arc<dyn XcFunctional> {
    Arc::new(PbeExchange::default())
}

/// Point-by-point evaluation over the full basis, without tasks or
/// screening. Returns (electrons, energy, potential).
fn brute_force(fx: &Fixture, functional: &dyn XcFunctional) -> (f64, f64, DMatrix<f64>) {
    let nbf = fx.basis.nbf();
    let radii: Vec<f64> = fx.molecule.iter().map(|a| slater_radius(a.atomic_number)).collect();
    let cells = FuzzyCells::new(fx.molecule.positions(), Some(&radii));
    let mut scratch = vec![0.0; fx.molecule.natoms()];

    let (mut n, mut e) = (0.0, 0.0);
    let mut v = DMatrix::zeros(nbf, nbf);
    for (iat, atom) in fx.molecule.iter().enumerate() {
        let grid = fx.grid.get(atom.atomic_number).unwrap();
        for (offset, &raw) in grid.points().iter().zip(grid.weights()) {
            let r = atom.position + offset;
            let w = raw * cells.partition_weight(iat, &r, &mut scratch);

            let (phi, dphi) = basis_at(&fx.basis, &r);
            let p_phi = &fx.density * &phi;
            let rho = phi.dot(&p_phi);
            let grad: Vec<f64> = dphi.iter().map(|d| 2.0 * d.dot(&p_phi)).collect();
            let gamma = grad.iter().map(|g| g * g).sum::<f64>();

            let (mut eps, mut vrho, mut vgamma) = ([0.0], [0.0], [0.0]);
            if functional.is_gga() {
                functional.eval_exc_vxc_gga(&[rho], &[gamma], &mut eps, &mut vrho, &mut vgamma);
            } else {
                functional.eval_exc_vxc_lda(&[rho], &mut eps, &mut vrho);
            }

            n += w * rho;
            e += w * rho * eps[0];
            v += &phi * phi.transpose() * (w * vrho[0]);
            if functional.is_gga() {
                let grad_phi = &dphi[0] * grad[0] + &dphi[1] * grad[1] + &dphi[2] * grad[2];
                let cross = &grad_phi * phi.transpose();
                v += (&cross + cross.transpose()) * (2.0 * w * vgamma[0]);
            }
        }
    }
    (n, e, v)
}

/// Values and gradients of every basis function at `r`.
fn basis_at(basis: &BasisSet, r: &Vector3<f64>) -> (DVector<f64>, [DVector<f64>; 3]) {
    let nbf = basis.nbf();
    let mut phi = DVector::zeros(nbf);
    let mut dphi = [DVector::zeros(nbf), DVector::zeros(nbf), DVector::zeros(nbf)];
    for (ish, sh) in basis.iter().enumerate() {
        let off = basis.shell_offset(ish);
        sh.evaluate(r, DerivOrder::Gradient, |comp, d| {
            phi[off + comp] = d[0];
            for k in 0..3 {
                dphi[k][off + comp] = d[k + 1];
            }
        });
    }
    (phi, dphi)
}

/// Point-by-point unrestricted evaluation over the full basis.
/// Returns (energy, Va, Vb).
fn brute_force_uks(
    fx: &Fixture,
    functional: &dyn XcFunctional,
    pa: &DMatrix<f64>,
    pb: &DMatrix<f64>,
) -> (f64, DMatrix<f64>, DMatrix<f64>) {
    let nbf = fx.basis.nbf();
    let radii: Vec<f64> = fx.molecule.iter().map(|a| slater_radius(a.atomic_number)).collect();
    let cells = FuzzyCells::new(fx.molecule.positions(), Some(&radii));
    let mut scratch = vec![0.0; fx.molecule.natoms()];

    let mut e = 0.0;
    let mut va = DMatrix::zeros(nbf, nbf);
    let mut vb = DMatrix::zeros(nbf, nbf);
    for (iat, atom) in fx.molecule.iter().enumerate() {
        let grid = fx.grid.get(atom.atomic_number).unwrap();
        for (offset, &raw) in grid.points().iter().zip(grid.weights()) {
            let r = atom.position + offset;
            let w = raw * cells.partition_weight(iat, &r, &mut scratch);
            let (phi, dphi) = basis_at(&fx.basis, &r);

            let (pa_phi, pb_phi) = (pa * &phi, pb * &phi);
            let rho = [phi.dot(&pa_phi), phi.dot(&pb_phi)];
            let ga = Vector3::from_fn(|k, _| 2.0 * dphi[k].dot(&pa_phi));
            let gb = Vector3::from_fn(|k, _| 2.0 * dphi[k].dot(&pb_phi));
            let sigma = [ga.dot(&ga), ga.dot(&gb), gb.dot(&gb)];

            let (mut eps, mut vrho, mut vsigma) = ([0.0], [0.0; 2], [0.0; 3]);
            if functional.is_gga() {
                functional.eval_exc_vxc_gga_pol(&rho, &sigma, &mut eps, &mut vrho, &mut vsigma);
            } else {
                functional.eval_exc_vxc_lda_pol(&rho, &mut eps, &mut vrho);
            }
            e += w * (rho[0] + rho[1]) * eps[0];

            // derivative of the energy density by each spin gradient
            let da = ga * (2.0 * vsigma[0]) + gb * vsigma[1];
            let db = gb * (2.0 * vsigma[2]) + ga * vsigma[1];
            for (v, vr, d) in [(&mut va, vrho[0], da), (&mut vb, vrho[1], db)] {
                *v += &phi * phi.transpose() * (w * vr);
                let d_phi = &dphi[0] * d[0] + &dphi[1] * d[1] + &dphi[2] * d[2];
                let cross = &d_phi * phi.transpose();
                *v += (&cross + cross.transpose()) * w;
            }
        }
    }
    (e, va, vb)
}

/// Two different spin densities built from the fixture's orbitals.
fn spin_densities(nbf: usize) -> (DMatrix<f64>, DMatrix<f64>) {
    let c = DMatrix::from_fn(nbf, 3, |i, k| 0.5 * (0.7 * ((i + 1) * (k + 1)) as f64 + 0.3 * k as f64).sin());
    let pa = &c * c.transpose();
    let cb = c.columns(0, 2);
    let pb = &cb * cb.transpose();
    (pa, pb)
}

/// No shell is ever screened out, so displaced bases see the same task shapes.
fn unscreened() -> Options {
    Options {
        basis_tolerance: 1e-200,
        ..Default::default()
    }
}

fn exc_with_basis(fx: &Fixture, basis: BasisSet, functional: Arc<dyn XcFunctional>) -> f64 {
    build_with(
        fx,
        basis,
        functional,
        Box::new(ReferenceHostDriver),
        Arc::new(SerialGroup),
        Arc::new(SerialGroup),
        &unscreened(),
    )
    .eval_exc_vxc(&fx.density)
    .unwrap()
    .exc
}

#[test]
fn test_lda_matches_independent_reference() {
    let fx = water_fixture();
    let it = integrator(&fx, slater(), &Options::default());

    // values from a separate evaluation of the same grid, partition and density
    let n = it.integrate_den(&fx.density).unwrap();
    assert_close(n, 6.88496571712185, 1e-7, "electrons");
    let result = it.eval_exc_vxc(&fx.density).unwrap();
    assert_close(result.exc, -4.803773452738146, 1e-7, "Slater exchange energy");

    let (n_ref, e_ref, v_ref) = brute_force(&fx, &SlaterExchange);
    assert_close(n, n_ref, 1e-8 * n_ref.abs(), "electrons vs brute force");
    assert_close(result.exc, e_ref, 1e-8 * e_ref.abs(), "energy vs brute force");
    let dv = (&result.vxc - &v_ref).norm() / v_ref.norm();
    assert!(dv < 1e-8, "relative potential error {:e}", dv);
}

#[test]
fn test_gga_matches_brute_force() {
    let fx = water_fixture();
    let it = integrator(&fx, pbe(), &Options::default());
    let result = it.eval_exc_vxc(&fx.density).unwrap();
    let (_, e_ref, v_ref) = brute_force(&fx, &PbeExchange::default());
    assert_close(result.exc, e_ref, 1e-8 * e_ref.abs(), "PBE exchange energy");
    let dv = (&result.vxc - &v_ref).norm() / v_ref.norm();
    assert!(dv < 1e-8, "relative potential error {:e}", dv);
    assert!((&result.vxc - result.vxc.transpose()).norm() < 1e-12);
}

fn check_uks_against_brute_force(functional: Arc<dyn XcFunctional>) {
    let fx = water_fixture();
    let (pa, pb) = spin_densities(fx.basis.nbf());
    let it = integrator(&fx, functional.clone(), &Options::default());
    let result = it.eval_exc_vxc_uks(&(&pa + &pb), &(&pa - &pb)).unwrap();

    let (e_ref, va, vb) = brute_force_uks(&fx, functional.as_ref(), &pa, &pb);
    assert_close(result.exc, e_ref, 1e-8 * e_ref.abs(), "unrestricted energy");
    let vs_ref = (&va + &vb) * 0.5;
    let vz_ref = (&va - &vb) * 0.5;
    let ds = (&result.vxc_s - &vs_ref).norm() / vs_ref.norm();
    let dz = (&result.vxc_z - &vz_ref).norm() / vz_ref.norm();
    assert!(ds < 1e-8, "relative scalar potential error {:e}", ds);
    assert!(dz < 1e-8, "relative z potential error {:e}", dz);
    assert!((&result.vxc_z - result.vxc_z.transpose()).norm() < 1e-12);
}

#[test]
fn test_uks_lda_matches_brute_force() {
    check_uks_against_brute_force(slater());
}

#[test]
fn test_uks_gga_matches_brute_force() {
    check_uks_against_brute_force(pbe());
}

#[test]
fn test_closed_shell_uks_reproduces_restricted() {
    let fx = water_fixture();
    let nbf = fx.basis.nbf();
    for functional in [slater(), pbe()] {
        let it = integrator(&fx, functional, &Options::default());
        let restricted = it.eval_exc_vxc(&fx.density).unwrap();
        let uks = it.eval_exc_vxc_uks(&fx.density, &DMatrix::zeros(nbf, nbf)).unwrap();
        assert_close(uks.exc, restricted.exc, 1e-10, "closed-shell energy");
        assert!((&uks.vxc_s - &restricted.vxc).norm() < 1e-10);
        assert!(uks.vxc_z.norm() < 1e-12);
    }
}

#[test]
fn test_integrated_density_matches_trace() {
    let fx = water_fixture();
    let it = integrator(&fx, slater(), &Options::default());
    let n = it.integrate_den(&fx.density).unwrap();
    let trace = fx.density.dot(&overlap_matrix(&fx.basis));
    assert!(
        (n - trace).abs() < 5e-3 * trace,
        "integrated {} vs Tr(PS) {}",
        n,
        trace
    );
}

#[test]
fn test_repeated_multithreaded_runs_agree() {
    let fx = water_fixture();
    let it = integrator(&fx, pbe(), &Options::default());
    let first = it.eval_exc_vxc(&fx.density).unwrap();
    let grad = it.eval_exc_grad(&fx.density).unwrap();
    for _ in 0..3 {
        let again = it.eval_exc_vxc(&fx.density).unwrap();
        assert_close(again.exc, first.exc, 1e-12, "energy");
        assert!((&again.vxc - &first.vxc).norm() < 1e-12);
        let g = it.eval_exc_grad(&fx.density).unwrap();
        for (a, b) in g.iter().zip(&grad) {
            assert_close(*a, *b, 1e-12, "gradient");
        }
    }
    let timings = it.timings();
    assert!(timings.contains("XCIntegrator.LocalWork"));
    assert!(timings.contains("XCIntegrator.Allreduce"));
}

#[test]
fn test_task_order_does_not_change_results() {
    let fx = water_fixture();
    let opts = Options {
        order: TaskOrder::Given,
        ..Default::default()
    };
    let mut it = integrator(&fx, pbe(), &opts);
    let before = it.eval_exc_vxc(&fx.density).unwrap();
    let grad_before = it.eval_exc_grad(&fx.density).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    {
        let tasks = it.load_balancer_mut().get_tasks_mut().unwrap();
        tasks.shuffle(&mut rng);
        for task in tasks.iter_mut() {
            // reverse the points of every task, keeping point and weight paired
            task.points.reverse();
            task.weights.reverse();
        }
    }
    let after = it.eval_exc_vxc(&fx.density).unwrap();
    let grad_after = it.eval_exc_grad(&fx.density).unwrap();

    assert_close(after.exc, before.exc, 1e-12, "energy");
    assert!((&after.vxc - &before.vxc).norm() < 1e-12);
    for (a, b) in grad_after.iter().zip(&grad_before) {
        assert_close(*a, *b, 1e-12, "gradient");
    }
}

#[test]
fn test_screening_is_conservative() {
    let fx = water_fixture();
    let screened = integrator(&fx, pbe(), &Options::default());
    let full = integrator(&fx, pbe(), &unscreened());
    let nbf = fx.basis.nbf();
    assert!(full
        .load_balancer()
        .get_tasks()
        .unwrap()
        .iter()
        .all(|t| t.nbe() == nbf));
    assert!(screened.load_balancer().max_nbe().unwrap() <= nbf);

    let a = screened.eval_exc_vxc(&fx.density).unwrap();
    let b = full.eval_exc_vxc(&fx.density).unwrap();
    assert_close(a.exc, b.exc, 1e-9, "energy");
    assert!((&a.vxc - &b.vxc).norm() < 1e-9);

    let ga = screened.eval_exc_grad(&fx.density).unwrap();
    let gb = full.eval_exc_grad(&fx.density).unwrap();
    for (x, y) in ga.iter().zip(&gb) {
        assert_close(*x, *y, 1e-9, "gradient");
    }
}

fn check_gradient_against_finite_difference(functional: Arc<dyn XcFunctional>) {
    let fx = water_fixture();
    let it = integrator(&fx, functional.clone(), &unscreened());
    let grad = it.eval_exc_grad(&fx.density).unwrap();
    assert_eq!(grad.len(), 9);

    let h = 1e-4;
    for atom in 0..3 {
        for c in 0..3 {
            let mut delta = Vector3::zeros();
            delta[c] = h;
            let ep = exc_with_basis(&fx, fx.basis.with_atom_displaced(atom, delta), functional.clone());
            let em = exc_with_basis(&fx, fx.basis.with_atom_displaced(atom, -delta), functional.clone());
            let fd = (ep - em) / (2.0 * h);
            assert_close(grad[3 * atom + c], fd, 1e-6, &format!("d/dR atom {} axis {}", atom, c));
        }
    }
}

#[test]
fn test_lda_gradient_matches_finite_difference() {
    check_gradient_against_finite_difference(slater());
}

#[test]
fn test_gga_gradient_matches_finite_difference() {
    check_gradient_against_finite_difference(pbe());
}

#[test]
fn test_cell_functions_partition_unity() {
    let fx = water_fixture();
    let radii: Vec<f64> = fx.molecule.iter().map(|a| slater_radius(a.atomic_number)).collect();
    let cells = FuzzyCells::new(fx.molecule.positions(), Some(&radii));
    let mut scratch = vec![0.0; 3];
    let normal = Normal::new(0.0, 2.0).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..200 {
        let r = Vector3::new(rng.sample(normal), rng.sample(normal), rng.sample(normal));
        let shares: Vec<f64> = (0..3).map(|a| cells.partition_weight(a, &r, &mut scratch)).collect();
        assert!(shares.iter().all(|s| (0.0..=1.0).contains(s)));
        assert_close(shares.iter().sum(), 1.0, 1e-12, "sum of shares");
    }
}

#[test]
fn test_shared_points_keep_their_total_weight() {
    // both atoms' grids contain the bond midpoint
    let molecule = Molecule::from_symbols(&[("H", [0.0, 0.0, -0.7]), ("H", [0.0, 0.0, 0.7])]).unwrap();
    let atomic = AtomicGrid::new(
        vec![
            Vector3::new(0.0, 0.0, 0.7),
            Vector3::new(0.0, 0.0, -0.7),
            Vector3::new(0.3, 0.2, 0.1),
        ],
        vec![1.0, 1.0, 1.0],
    )
    .unwrap();
    let fx = Fixture {
        basis: basis_for(&molecule),
        grid: MolGrid::new().with_grid(1, atomic),
        density: DMatrix::identity(2, 2),
        molecule,
    };
    let it = integrator(&fx, slater(), &Options::default());
    let tasks = it.load_balancer().get_tasks().unwrap();
    let mut total_at_midpoint = 0.0;
    let mut copies = 0;
    for task in tasks {
        for (r, w) in task.points.iter().zip(&task.weights) {
            if r.norm() < 1e-12 {
                total_at_midpoint += w;
                copies += 1;
            }
        }
    }
    assert_eq!(copies, 2);
    assert_close(total_at_midpoint, 1.0, 1e-12, "midpoint weight");
}

#[test]
fn test_weight_pass_is_idempotent() {
    let fx = water_fixture();
    let mut it = integrator(&fx, slater(), &Options::default());
    let first = it.eval_exc_vxc(&fx.density).unwrap().exc;
    let weights: Vec<Vec<f64>> = it
        .load_balancer()
        .get_tasks()
        .unwrap()
        .iter()
        .map(|t| t.weights.clone())
        .collect();

    MolecularWeights::default()
        .modify_weights(it.load_balancer_mut())
        .unwrap();
    let again: Vec<Vec<f64>> = it
        .load_balancer()
        .get_tasks()
        .unwrap()
        .iter()
        .map(|t| t.weights.clone())
        .collect();
    assert_eq!(weights, again);
    assert_close(it.eval_exc_vxc(&fx.density).unwrap().exc, first, 1e-12, "energy");
}

#[test]
fn test_three_ranks_match_serial() {
    let fx = water_fixture();
    let serial = integrator(&fx, pbe(), &Options::default());
    let reference = serial.eval_exc_vxc(&fx.density).unwrap();
    let reference_grad = serial.eval_exc_grad(&fx.density).unwrap();
    let ntasks = serial.load_balancer().get_tasks().unwrap().len();

    let opts = Options {
        threads: 2,
        ..Default::default()
    };
    let fx = &fx;
    let opts = &opts;
    let outcomes: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = ThreadGroup::create(3)
            .into_iter()
            .map(|group| {
                s.spawn(move || {
                    let group = Arc::new(group);
                    let it = build_with(
                        fx,
                        fx.basis.clone(),
                        pbe(),
                        Box::new(ReferenceHostDriver),
                        group.clone(),
                        group,
                        opts,
                    );
                    let local = it.load_balancer().get_tasks().unwrap().len();
                    let result = it.eval_exc_vxc(&fx.density).unwrap();
                    let grad = it.eval_exc_grad(&fx.density).unwrap();
                    (local, result, grad)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let total: usize = outcomes.iter().map(|(n, _, _)| n).sum();
    assert_eq!(total, ntasks);
    for (_, result, grad) in &outcomes {
        assert_close(result.exc, reference.exc, 1e-12, "energy");
        assert!((&result.vxc - &reference.vxc).norm() < 1e-12);
        for (a, b) in grad.iter().zip(&reference_grad) {
            assert_close(*a, *b, 1e-12, "gradient");
        }
    }
}

/// Delegates to the reference driver while recording what was asked of it.
struct RecordingDriver {
    inner: ReferenceHostDriver,
    space: ExecutionSpace,
    missing: Option<Quantity>,
    max_components: Arc<AtomicUsize>,
    gga_gradient_calls: Arc<AtomicUsize>,
}

impl RecordingDriver {
    fn new() -> Self {
        Self {
            inner: ReferenceHostDriver,
            space: ExecutionSpace::Host,
            missing: None,
            max_components: Arc::new(AtomicUsize::new(0)),
            gga_gradient_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl LocalWorkDriver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    fn execution_space(&self) -> ExecutionSpace {
        self.space
    }

    fn supports(&self, quantity: Quantity) -> bool {
        self.missing != Some(quantity)
    }

    fn eval_collocation(&self, basis: &BasisSet, task: &XcTask, order: DerivOrder, buf: &mut TaskBuffers<'_>) {
        self.max_components.fetch_max(order.ncomponents(), Ordering::Relaxed);
        // the scratch must not hold more collocation blocks than the order needs
        assert_eq!(buf.basis.len(), order.ncomponents() * buf.block_len());
        self.inner.eval_collocation(basis, task, order, buf)
    }

    fn eval_xmat(&self, p: &DMatrix<f64>, task: &XcTask, nblocks: usize, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_xmat(p, task, nblocks, buf)
    }

    fn eval_uvvar_lda(&self, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_uvvar_lda(buf)
    }

    fn eval_uvvar_gga(&self, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_uvvar_gga(buf)
    }

    fn eval_kern_exc_vxc(&self, functional: &dyn XcFunctional, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_kern_exc_vxc(functional, buf)
    }

    fn eval_zmat_lda(&self, task: &XcTask, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_zmat_lda(task, buf)
    }

    fn eval_zmat_gga(&self, task: &XcTask, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_zmat_gga(task, buf)
    }

    fn eval_uvvar_lda_uks(&self, component: SpinComponent, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_uvvar_lda_uks(component, buf)
    }

    fn eval_uvvar_gga_uks(&self, component: SpinComponent, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_uvvar_gga_uks(component, buf)
    }

    fn eval_kern_exc_vxc_uks(&self, functional: &dyn XcFunctional, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_kern_exc_vxc_uks(functional, buf)
    }

    fn eval_zmat_lda_uks(&self, task: &XcTask, component: SpinComponent, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_zmat_lda_uks(task, component, buf)
    }

    fn eval_zmat_gga_uks(&self, task: &XcTask, component: SpinComponent, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_zmat_gga_uks(task, component, buf)
    }

    fn inc_vxc(&self, task: &XcTask, buf: &mut TaskBuffers<'_>, vxc: &AtomicBuffer) {
        self.inner.inc_vxc(task, buf, vxc)
    }

    fn inc_exc_grad_lda(&self, basis: &BasisSet, task: &XcTask, buf: &TaskBuffers<'_>, grad: &AtomicBuffer) {
        self.inner.inc_exc_grad_lda(basis, task, buf, grad)
    }

    fn inc_exc_grad_gga(&self, basis: &BasisSet, task: &XcTask, buf: &TaskBuffers<'_>, grad: &AtomicBuffer) {
        self.gga_gradient_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.inc_exc_grad_gga(basis, task, buf, grad)
    }

    fn eval_exx_fmat(&self, p: &DMatrix<f64>, task: &XcTask, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_exx_fmat(p, task, buf)
    }

    fn eval_exx_gmat(&self, basis: &BasisSet, task: &XcTask, tolerance: f64, buf: &mut TaskBuffers<'_>) {
        self.inner.eval_exx_gmat(basis, task, tolerance, buf)
    }

    fn inc_exx_k(&self, task: &XcTask, buf: &mut TaskBuffers<'_>, k: &AtomicBuffer) {
        self.inner.inc_exx_k(task, buf, k)
    }
}

fn with_driver(fx: &Fixture, functional: Arc<dyn XcFunctional>, driver: RecordingDriver) -> xcint::XcIntegrator {
    build_with(
        fx,
        fx.basis.clone(),
        functional,
        Box::new(driver),
        Arc::new(SerialGroup),
        Arc::new(SerialGroup),
        &Options::default(),
    )
}

#[test]
fn test_functional_kind_selects_derivative_order() {
    let fx = water_fixture();

    let driver = RecordingDriver::new();
    let (max_components, gga_calls) = (driver.max_components.clone(), driver.gga_gradient_calls.clone());
    let it = with_driver(&fx, slater(), driver);
    it.eval_exc_vxc(&fx.density).unwrap();
    it.eval_exc_vxc_uks(&fx.density, &fx.density).unwrap();
    assert_eq!(max_components.load(Ordering::Relaxed), 1);
    it.eval_exc_grad(&fx.density).unwrap();
    assert_eq!(max_components.load(Ordering::Relaxed), 4);
    assert_eq!(gga_calls.load(Ordering::Relaxed), 0);

    let driver = RecordingDriver::new();
    let (max_components, gga_calls) = (driver.max_components.clone(), driver.gga_gradient_calls.clone());
    let it = with_driver(&fx, pbe(), driver);
    it.eval_exc_vxc(&fx.density).unwrap();
    assert_eq!(max_components.load(Ordering::Relaxed), 4);
    it.eval_exc_grad(&fx.density).unwrap();
    assert_eq!(max_components.load(Ordering::Relaxed), 10);
    assert!(gga_calls.load(Ordering::Relaxed) > 0);
}

/// K_mn = sum_i w_i phi_m(r_i) sum_ls A_nl(r_i) P_ls phi_s(r_i), symmetrized.
fn brute_force_exx(fx: &Fixture, it: &xcint::XcIntegrator) -> DMatrix<f64> {
    let nbf = fx.basis.nbf();
    let mut k = DMatrix::zeros(nbf, nbf);
    for task in it.load_balancer().get_tasks().unwrap() {
        for (r, &w) in task.points.iter().zip(&task.weights) {
            let phi = DVector::from_vec(fx.basis.iter().flat_map(|sh| sh.values(r)).collect());
            let mut a = DMatrix::zeros(nbf, nbf);
            for (i, si) in fx.basis.iter().enumerate() {
                for (j, sj) in fx.basis.iter().enumerate() {
                    let block = coulomb_block(si, sj, r);
                    let (oi, oj) = (fx.basis.shell_offset(i), fx.basis.shell_offset(j));
                    a.view_mut((oi, oj), (si.size(), sj.size())).copy_from(&block);
                }
            }
            let g = &a * (&fx.density * &phi) * w;
            k += &phi * g.transpose();
        }
    }
    (&k + k.transpose()) * 0.5
}

#[test]
fn test_exact_exchange_matches_brute_force() {
    let fx = water_fixture();
    let it = integrator(&fx, slater(), &Options::default());
    let exact = ExxSettings {
        screening_tolerance: 0.0,
    };
    let k = it.eval_exx(&fx.density, &exact).unwrap();
    assert!((&k - k.transpose()).norm() < 1e-12);
    assert!(fx.density.dot(&k) > 0.0, "Tr(PK) must be positive");

    let reference = brute_force_exx(&fx, &it);
    let err = (&k - &reference).norm() / reference.norm();
    assert!(err < 1e-7, "relative exchange error {:e}", err);

    let screened = it.eval_exx(&fx.density, &ExxSettings::default()).unwrap();
    assert!((&screened - &k).norm() < 1e-8);
}

struct DeviceOnlyReduction;

impl ReductionDriver for DeviceOnlyReduction {
    fn takes_host_memory(&self) -> bool {
        false
    }

    fn allreduce_inplace(&self, _buf: &mut [f64], _op: ReductionOp) -> xcint::Result<()> {
        Ok(())
    }
}

#[test]
fn test_usage_errors_are_reported_before_work() {
    let fx = water_fixture();
    let p = &fx.density;

    let unweighted = integrator(
        &fx,
        slater(),
        &Options {
            modify_weights: false,
            ..Default::default()
        },
    );
    assert_eq!(unweighted.eval_exc_vxc(p).unwrap_err(), XcError::WeightsNotModified);

    let it = integrator(&fx, slater(), &Options::default());
    assert_eq!(
        it.eval_exc_vxc(&DMatrix::zeros(7, 6)).unwrap_err(),
        XcError::NonSquareMatrix { rows: 7, cols: 6 }
    );
    assert_eq!(
        it.integrate_den(&DMatrix::zeros(6, 6)).unwrap_err(),
        XcError::BasisDimensionMismatch { expected: 7, found: 6 }
    );
    assert_eq!(
        it.eval_exc_grad_raw(MatrixRef::new(7, 7, p.as_slice(), 5)).unwrap_err(),
        XcError::InvalidLeadingDimension { ld: 5, rows: 7 }
    );
    assert_eq!(
        it.eval_exc_vxc_uks(p, &DMatrix::zeros(6, 6)).unwrap_err(),
        XcError::BasisDimensionMismatch { expected: 7, found: 6 }
    );

    let negative_tolerance = integrator(
        &fx,
        slater(),
        &Options {
            basis_tolerance: -1e-10,
            modify_weights: false,
            ..Default::default()
        },
    );
    assert!(matches!(
        negative_tolerance.integrate_den(p),
        Err(XcError::InvalidInput(_))
    ));

    let device_reduction = build_with(
        &fx,
        fx.basis.clone(),
        slater(),
        Box::new(ReferenceHostDriver),
        Arc::new(SerialGroup),
        Arc::new(DeviceOnlyReduction),
        &Options::default(),
    );
    assert_eq!(
        device_reduction.eval_exc_vxc(p).unwrap_err(),
        XcError::ReductionRequiresHostMemory
    );

    let mut device_driver = RecordingDriver::new();
    device_driver.space = ExecutionSpace::Device;
    assert_eq!(
        with_driver(&fx, slater(), device_driver).eval_exc_vxc(p).unwrap_err(),
        XcError::UnsupportedBackend(ExecutionSpace::Device)
    );

    let mut partial_driver = RecordingDriver::new();
    partial_driver.missing = Some(Quantity::Exx);
    let partial = with_driver(&fx, slater(), partial_driver);
    assert!(partial.eval_exc_vxc(p).is_ok());
    assert_eq!(
        partial.eval_exx(p, &ExxSettings::default()).unwrap_err(),
        XcError::UnsupportedQuantity {
            driver: "recording".to_string(),
            quantity: Quantity::Exx
        }
    );
}

#[test]
fn test_missing_atomic_grid() {
    let mut fx = water_fixture();
    fx.grid = MolGrid::new().with_grid(1, atomic_grid());
    let it = integrator(
        &fx,
        slater(),
        &Options {
            modify_weights: false,
            ..Default::default()
        },
    );
    assert_eq!(
        it.eval_exc_vxc(&fx.density).unwrap_err(),
        XcError::MissingAtomicGrid {
            element: "O".to_string(),
            atomic_number: 8
        }
    );
}
