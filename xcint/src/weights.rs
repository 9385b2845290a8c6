//! Fuzzy-cell partitioning of overlapping atomic grids (Becke, J. Chem.
//! Phys. 88, 2547 (1988)) with atomic size adjustment.

extern crate nalgebra as na;

use crate::error::Result;
use crate::grid::slater_radius;
use crate::load_balancer::{LoadBalancer, LoadBalancerState};
use itertools::iproduct;
use na::{DMatrix, Vector3};
use rayon::prelude::*;
use std::time::Instant;
use tracing::info;

/// Becke's smoothing polynomial applied three times, mapped to [0, 1].
fn becke_step(nu: f64) -> f64 {
    let mut f = nu;
    for _ in 0..3 {
        f = 1.5 * f - 0.5 * f * f * f;
    }
    0.5 * (1.0 - f)
}

/// Size adjustment a_AB for radii R_A, R_B, clamped to |a| <= 1/2.
fn size_adjustment(ra: f64, rb: f64) -> f64 {
    let chi = ra / rb;
    let u = (chi - 1.0) / (chi + 1.0);
    let a = u / (u * u - 1.0);
    a.clamp(-0.5, 0.5)
}

/// Geometry shared by every point of the partition.
#[derive(Debug, Clone)]
pub struct FuzzyCells {
    centers: Vec<Vector3<f64>>,
    inv_dist: DMatrix<f64>,
    adjust: DMatrix<f64>,
}

impl FuzzyCells {
    /// `radii` are the atomic sizes; `None` disables the size adjustment.
    pub fn new(centers: Vec<Vector3<f64>>, radii: Option<&[f64]>) -> Self {
        let natoms = centers.len();
        let mut inv_dist = DMatrix::zeros(natoms, natoms);
        let mut adjust = DMatrix::zeros(natoms, natoms);
        for (a, b) in iproduct!(0..natoms, 0..natoms).filter(|(a, b)| a != b) {
            inv_dist[(a, b)] = 1.0 / (centers[a] - centers[b]).norm();
            if let Some(radii) = radii {
                adjust[(a, b)] = size_adjustment(radii[a], radii[b]);
            }
        }
        Self {
            centers,
            inv_dist,
            adjust,
        }
    }

    pub fn natoms(&self) -> usize {
        self.centers.len()
    }

    /// Cell functions P_B(r) of every atom, unnormalized.
    pub fn cell_functions(&self, r: &Vector3<f64>, out: &mut [f64]) {
        let natoms = self.natoms();
        let dist: Vec<f64> = self.centers.iter().map(|c| (r - c).norm()).collect();
        out.iter_mut().for_each(|p| *p = 1.0);
        for (a, b) in iproduct!(0..natoms, 0..natoms).filter(|(a, b)| a != b) {
            let mu = (dist[a] - dist[b]) * self.inv_dist[(a, b)];
            let nu = mu + self.adjust[(a, b)] * (1.0 - mu * mu);
            out[a] *= becke_step(nu);
        }
    }

    /// Fraction of the point `r` owned by atom `owner`.
    pub fn partition_weight(&self, owner: usize, r: &Vector3<f64>, scratch: &mut [f64]) -> f64 {
        if self.natoms() == 1 {
            return 1.0;
        }
        self.cell_functions(r, scratch);
        let total: f64 = scratch.iter().sum();
        if total > 0.0 {
            scratch[owner] / total
        } else {
            0.0
        }
    }
}

/// Weight modification pass over a load balancer's tasks.
#[derive(Debug, Clone, Copy)]
pub struct MolecularWeights {
    pub size_adjustment: bool,
}

impl Default for MolecularWeights {
    fn default() -> Self {
        Self {
            size_adjustment: true,
        }
    }
}

impl MolecularWeights {
    pub fn new(size_adjustment: bool) -> Self {
        Self { size_adjustment }
    }

    /// Replace every task weight by raw weight times the owner's share of
    /// the point.
    ///
    /// Weights are always recomputed from the raw quadrature weights, so
    /// calling this again leaves them unchanged.
    pub fn modify_weights(&self, lb: &mut LoadBalancer) -> Result<()> {
        let start = Instant::now();
        let molecule = lb.molecule()?;
        let radii: Vec<f64> = molecule.iter().map(|a| slater_radius(a.atomic_number)).collect();
        let cells = FuzzyCells::new(
            molecule.positions(),
            self.size_adjustment.then_some(radii.as_slice()),
        );
        let natoms = cells.natoms();

        let tasks = lb.get_tasks_mut()?;
        tasks.par_iter_mut().for_each_init(
            || vec![0.0; natoms],
            |scratch, task| {
                for i in 0..task.points.len() {
                    let share = cells.partition_weight(task.atom, &task.points[i], scratch);
                    task.weights[i] = task.raw_weights()[i] * share;
                }
            },
        );

        let ntasks = tasks.len();
        if lb.state() == LoadBalancerState::CorrectedWeights {
            info!("Weights were already partitioned, recomputed from raw weights");
        }
        lb.set_state(LoadBalancerState::CorrectedWeights);
        let elapsed = start.elapsed();
        lb.record_timing("MolecularWeights", elapsed);
        info!("Partitioned weights of {} tasks in {:.3?}", ntasks, elapsed);
        Ok(())
    }
}
