//! Configuration management for XC integration jobs
//!
//! A job file names the molecule, the basis shells and the atomic grid of
//! every element, the density matrix and the quantities to integrate. Missing
//! integrator settings are filled in by `with_defaults`. An unrestricted job
//! gives the scalar density `Pa + Pb` as `density_matrix` and the
//! magnetization `Pa - Pb` as `density_matrix_z`.

mod args;

pub use args::Args;

use ::basis::ShellSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use xcint::load_balancer::DEFAULT_BATCH_SIZE;
use xcint::TaskOrder;

/// Main configuration structure for an integration job
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub molecule: Vec<AtomConfig>,
    /// Shells per element symbol
    pub basis: HashMap<String, Vec<ShellSpec>>,
    /// Atomic grid per element symbol
    pub grids: HashMap<String, GridConfig>,
    /// Rows of the density matrix
    pub density_matrix: Vec<Vec<f64>>,
    /// Rows of the z density matrix, for `exc_vxc_uks`
    pub density_matrix_z: Option<Vec<Vec<f64>>>,
    pub functional: Option<String>,
    pub integrator: Option<IntegratorParams>,
    pub quantities: Option<Vec<QuantityRequest>>,
}

/// Atomic position configuration, in bohr
#[derive(Debug, Deserialize, Serialize)]
pub struct AtomConfig {
    pub element: String,
    pub coords: [f64; 3],
}

/// Atomic grid, either as explicit points (x, y, z, w) relative to the
/// nucleus or as a radial (r, w) times angular (x, y, z, w) product
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct GridConfig {
    pub points: Option<Vec<[f64; 4]>>,
    pub radial: Option<Vec<[f64; 2]>>,
    pub angular: Option<Vec<[f64; 4]>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityRequest {
    Density,
    ExcVxc,
    ExcVxcUks,
    ExcGrad,
    Exx,
}

/// Integrator parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IntegratorParams {
    pub batch_size: Option<usize>,
    pub basis_tolerance: Option<f64>,
    pub num_threads: Option<usize>,
    pub task_order: Option<TaskOrder>,
    pub exx_tolerance: Option<f64>,
    pub size_adjustment: Option<bool>,
    pub ranks: Option<usize>,
}

impl Default for IntegratorParams {
    fn default() -> Self {
        IntegratorParams {
            batch_size: Some(DEFAULT_BATCH_SIZE),
            basis_tolerance: Some(1e-10),
            // one worker per core
            num_threads: None,
            task_order: Some(TaskOrder::CostDescending),
            exx_tolerance: Some(1e-10),
            size_adjustment: Some(true),
            ranks: Some(1),
        }
    }
}

impl IntegratorParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.batch_size.is_none() {
            self.batch_size = defaults.batch_size;
        }
        if self.basis_tolerance.is_none() {
            self.basis_tolerance = defaults.basis_tolerance;
        }
        if self.task_order.is_none() {
            self.task_order = defaults.task_order;
        }
        if self.exx_tolerance.is_none() {
            self.exx_tolerance = defaults.exx_tolerance;
        }
        if self.size_adjustment.is_none() {
            self.size_adjustment = defaults.size_adjustment;
        }
        if self.ranks.is_none() {
            self.ranks = defaults.ranks;
        }
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        self.integrator = Some(self.integrator.take().unwrap_or_default().with_defaults());
        if self.functional.is_none() {
            self.functional = Some("slater".to_string());
        }
        if self.quantities.as_ref().map_or(true, |q| q.is_empty()) {
            self.quantities = Some(vec![QuantityRequest::Density, QuantityRequest::ExcVxc]);
        }
        self
    }

    pub fn integrator_params(&self) -> IntegratorParams {
        self.integrator.clone().unwrap_or_default().with_defaults()
    }

    pub fn functional_name(&self) -> String {
        self.functional.clone().unwrap_or_else(|| "slater".to_string())
    }

    pub fn requests(&self, quantity: QuantityRequest) -> bool {
        self.quantities
            .as_ref()
            .is_some_and(|q| q.contains(&quantity))
    }
}
