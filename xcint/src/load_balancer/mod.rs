//! Decomposition of the molecular grid into screened, distributed tasks.
//!
//! Each atom's grid is translated to the nucleus and cut into compact
//! batches; every batch keeps only the shells that reach it. Batches are then
//! spread over the ranks of the process group by estimated cost
//! (`npts * nbe`). The task list is built on first request and reused by
//! every later pass.

mod distribute;
mod factory;
mod partition;
mod screening;

pub use factory::LoadBalancerFactory;

use crate::error::{Result, XcError};
use crate::grid::MolGrid;
use crate::molecule::Molecule;
use crate::reduction::ProcessGroup;
use crate::task::XcTask;
use crate::timer::Timings;
use basis::{BasisSet, DEFAULT_SHELL_TOLERANCE};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use tracing::{debug, info};

use self::distribute::assign_ranks;
use self::partition::bisect_batches;
use self::screening::screen_batch;

pub const DEFAULT_BATCH_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancerState {
    /// Task weights are the raw atomic quadrature weights.
    RawWeights,
    /// Task weights have been partitioned between atoms.
    CorrectedWeights,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerSettings {
    /// Largest number of points in one task.
    pub batch_size: usize,
    /// Magnitude below which a shell is screened out of a task.
    pub basis_tolerance: f64,
}

impl LoadBalancerSettings {
    /// Reject settings under which shell cutoffs are meaningless.
    pub fn validate(&self) -> Result<()> {
        let tol = self.basis_tolerance;
        if !(tol > 0.0 && tol.is_finite()) {
            return Err(XcError::InvalidInput(format!(
                "basis tolerance must be positive and finite, got {}",
                tol
            )));
        }
        Ok(())
    }
}

impl Default for LoadBalancerSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            basis_tolerance: DEFAULT_SHELL_TOLERANCE,
        }
    }
}

struct Inputs {
    molecule: Molecule,
    grid: MolGrid,
    basis: BasisSet,
}

pub struct LoadBalancer {
    inputs: Option<Inputs>,
    group: Arc<dyn ProcessGroup>,
    settings: LoadBalancerSettings,
    tasks: OnceLock<Vec<XcTask>>,
    state: LoadBalancerState,
    timings: Mutex<Timings>,
}

impl LoadBalancer {
    /// A load balancer with nothing attached yet.
    pub fn new(group: Arc<dyn ProcessGroup>, settings: LoadBalancerSettings) -> Self {
        Self {
            inputs: None,
            group,
            settings,
            tasks: OnceLock::new(),
            state: LoadBalancerState::RawWeights,
            timings: Mutex::new(Timings::new()),
        }
    }

    pub fn with_inputs(
        group: Arc<dyn ProcessGroup>,
        settings: LoadBalancerSettings,
        molecule: Molecule,
        grid: MolGrid,
        basis: BasisSet,
    ) -> Self {
        let mut lb = Self::new(group, settings);
        lb.attach(molecule, grid, basis);
        lb
    }

    /// Attach (or replace) the inputs, discarding any cached tasks.
    pub fn attach(&mut self, molecule: Molecule, grid: MolGrid, mut basis: BasisSet) {
        basis.set_shell_tolerance(self.settings.basis_tolerance);
        self.inputs = Some(Inputs {
            molecule,
            grid,
            basis,
        });
        self.tasks = OnceLock::new();
        self.state = LoadBalancerState::RawWeights;
    }

    pub fn is_initialized(&self) -> bool {
        self.inputs.is_some()
    }

    fn inputs(&self) -> Result<&Inputs> {
        self.inputs.as_ref().ok_or(XcError::LoadBalancerUninitialized)
    }

    /// Tasks owned by this rank, created on first request.
    pub fn get_tasks(&self) -> Result<&[XcTask]> {
        if let Some(tasks) = self.tasks.get() {
            return Ok(tasks);
        }
        let created = self.create_tasks()?;
        Ok(self.tasks.get_or_init(|| created))
    }

    pub fn get_tasks_mut(&mut self) -> Result<&mut [XcTask]> {
        self.get_tasks()?;
        self.tasks
            .get_mut()
            .map(|tasks| tasks.as_mut_slice())
            .ok_or(XcError::LoadBalancerUninitialized)
    }

    pub fn max_npts(&self) -> Result<usize> {
        Ok(self.get_tasks()?.iter().map(|t| t.npts()).max().unwrap_or(0))
    }

    pub fn max_nbe(&self) -> Result<usize> {
        Ok(self.get_tasks()?.iter().map(|t| t.nbe()).max().unwrap_or(0))
    }

    pub fn max_npts_x_nbe(&self) -> Result<usize> {
        Ok(self.get_tasks()?.iter().map(|t| t.cost()).max().unwrap_or(0))
    }

    pub fn molecule(&self) -> Result<&Molecule> {
        Ok(&self.inputs()?.molecule)
    }

    pub fn basis(&self) -> Result<&BasisSet> {
        Ok(&self.inputs()?.basis)
    }

    pub fn grid(&self) -> Result<&MolGrid> {
        Ok(&self.inputs()?.grid)
    }

    pub fn process_group(&self) -> &dyn ProcessGroup {
        self.group.as_ref()
    }

    pub fn settings(&self) -> &LoadBalancerSettings {
        &self.settings
    }

    pub fn state(&self) -> LoadBalancerState {
        self.state
    }

    pub fn modified_weights_are_stored(&self) -> bool {
        self.state == LoadBalancerState::CorrectedWeights
    }

    pub(crate) fn set_state(&mut self, state: LoadBalancerState) {
        self.state = state;
    }

    pub fn timings(&self) -> Timings {
        self.timings.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub(crate) fn record_timing(&self, name: &str, elapsed: std::time::Duration) {
        if let Ok(mut timings) = self.timings.lock() {
            timings.record(name, elapsed);
        }
    }

    fn create_tasks(&self) -> Result<Vec<XcTask>> {
        let inputs = self.inputs()?;
        self.settings.validate()?;
        let start = Instant::now();
        let atom_grids = inputs.grid.atomic_grids(&inputs.molecule)?;
        let basis = &inputs.basis;
        let batch_size = self.settings.batch_size;

        let per_atom: Vec<_> = inputs.molecule.iter().zip(atom_grids).enumerate().collect();
        let all_tasks: Vec<XcTask> = per_atom
            .into_par_iter()
            .flat_map_iter(|(iat, (atom, grid))| {
                let points = grid.points().iter().map(|p| p + atom.position).collect();
                bisect_batches(points, grid.weights().to_vec(), batch_size)
                    .into_iter()
                    .map(move |(pts, wts)| {
                        let screening = screen_batch(&pts, basis);
                        XcTask::new(iat, pts, wts, screening)
                    })
            })
            .collect();

        let costs: Vec<usize> = all_tasks.iter().map(|t| t.cost()).collect();
        let owner = assign_ranks(&costs, self.group.size());
        let rank = self.group.rank();
        let ntotal = all_tasks.len();
        let local: Vec<XcTask> = all_tasks
            .into_iter()
            .zip(owner)
            .filter(|(_, r)| *r == rank)
            .map(|(t, _)| t)
            .collect();

        let elapsed = start.elapsed();
        self.record_timing("LoadBalancer.CreateTasks", elapsed);
        info!(
            "Rank {}: created {} of {} tasks in {:.3?}",
            rank,
            local.len(),
            ntotal,
            elapsed
        );
        debug!(
            "Rank {}: local cost {}",
            rank,
            local.iter().map(|t| t.cost()).sum::<usize>()
        );
        Ok(local)
    }
}
