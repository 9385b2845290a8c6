extern crate nalgebra as na;

use basis::BasisSet;
use na::Vector3;

/// A contiguous run of basis functions: `len` functions starting at
/// `full_start` in the full basis map to `local_start` in the task's
/// screened index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmatRange {
    pub full_start: usize,
    pub local_start: usize,
    pub len: usize,
}

/// Shells that are non-negligible over a task's points.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasisScreening {
    /// Shell indices in ascending order.
    pub shell_list: Vec<usize>,
    /// Number of basis functions in `shell_list`.
    pub nbe: usize,
    pub submat_map: Vec<SubmatRange>,
    /// Local offset of each shell in `shell_list`.
    pub shell_offsets: Vec<usize>,
}

impl BasisScreening {
    pub fn new(mut shell_list: Vec<usize>, basis: &BasisSet) -> Self {
        shell_list.sort_unstable();
        shell_list.dedup();

        let mut submat_map: Vec<SubmatRange> = Vec::new();
        let mut shell_offsets = Vec::with_capacity(shell_list.len());
        let mut nbe = 0;
        for &ish in &shell_list {
            let full_start = basis.shell_offset(ish);
            let len = basis[ish].size();
            shell_offsets.push(nbe);
            match submat_map.last_mut() {
                Some(last) if last.full_start + last.len == full_start => last.len += len,
                _ => submat_map.push(SubmatRange {
                    full_start,
                    local_start: nbe,
                    len,
                }),
            }
            nbe += len;
        }

        Self {
            shell_list,
            nbe,
            submat_map,
            shell_offsets,
        }
    }

    /// Screening that keeps every shell.
    pub fn full(basis: &BasisSet) -> Self {
        Self::new((0..basis.nshells()).collect(), basis)
    }
}

/// One unit of integration work: a batch of points from a single atom
/// together with the shells that matter there.
#[derive(Debug, Clone)]
pub struct XcTask {
    /// Index of the atom whose grid produced the points.
    pub atom: usize,
    pub points: Vec<Vector3<f64>>,
    /// Current weights; partitioned once the weight pass has run.
    pub weights: Vec<f64>,
    raw_weights: Vec<f64>,
    pub screening: BasisScreening,
}

impl XcTask {
    pub fn new(atom: usize, points: Vec<Vector3<f64>>, weights: Vec<f64>, screening: BasisScreening) -> Self {
        Self {
            atom,
            points,
            raw_weights: weights.clone(),
            weights,
            screening,
        }
    }

    pub fn npts(&self) -> usize {
        self.points.len()
    }

    pub fn nbe(&self) -> usize {
        self.screening.nbe
    }

    /// Estimated cost used for ordering and distribution.
    pub fn cost(&self) -> usize {
        self.npts() * self.nbe()
    }

    /// Weights as produced by the atomic quadrature, before partitioning.
    pub fn raw_weights(&self) -> &[f64] {
        &self.raw_weights
    }
}
