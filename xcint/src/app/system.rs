use crate::config::{Config, GridConfig};
use ::basis::{BasisSet, ShellSpec};
use color_eyre::eyre::{eyre, Result, WrapErr};
use nalgebra::{DMatrix, Vector3};
use std::collections::HashMap;
use tracing::info;
use xcint::{Atom, AtomicGrid, MolGrid, Molecule};

/// Molecule, basis, grid and density matrix of one job.
pub struct JobSystem {
    pub molecule: Molecule,
    pub basis: BasisSet,
    pub grid: MolGrid,
    pub density: DMatrix<f64>,
    /// Magnetization density matrix of an unrestricted job.
    pub density_z: Option<DMatrix<f64>>,
}

impl JobSystem {
    pub fn from_config(config: &Config) -> Result<Self> {
        let molecule = build_molecule(config)?;
        let basis = build_basis(config, &molecule)?;
        let grid = build_grid(&config.grids, &molecule)?;
        let density = build_density(&config.density_matrix)?;
        let density_z = config
            .density_matrix_z
            .as_deref()
            .map(build_density)
            .transpose()
            .wrap_err("Invalid z density matrix")?;
        info!(
            "{} atoms, {} shells, {} basis functions, {} grid points",
            molecule.natoms(),
            basis.nshells(),
            basis.nbf(),
            grid.total_npts(&molecule)?
        );
        Ok(Self {
            molecule,
            basis,
            grid,
            density,
            density_z,
        })
    }
}

fn build_molecule(config: &Config) -> Result<Molecule> {
    let atoms = config
        .molecule
        .iter()
        .map(|a| {
            Atom::new(&a.element, Vector3::new(a.coords[0], a.coords[1], a.coords[2]))
                .wrap_err_with(|| format!("Invalid atom {}", a.element))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Molecule::new(atoms))
}

fn build_basis(config: &Config, molecule: &Molecule) -> Result<BasisSet> {
    let per_atom = molecule
        .iter()
        .map(|atom| {
            config
                .basis
                .get(&atom.symbol)
                .ok_or_else(|| eyre!("No basis shells given for element {}", atom.symbol))
                .and_then(|specs| {
                    check_shells(&atom.symbol, specs)?;
                    Ok((atom.position, specs.as_slice()))
                })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(BasisSet::from_atoms(per_atom))
}

fn check_shells(symbol: &str, specs: &[ShellSpec]) -> Result<()> {
    for (i, spec) in specs.iter().enumerate() {
        if spec.exponents.is_empty() {
            return Err(eyre!("Shell {} of {} has no primitives", i, symbol));
        }
        if spec.exponents.len() != spec.coefficients.len() {
            return Err(eyre!(
                "Shell {} of {} has {} exponents but {} coefficients",
                i,
                symbol,
                spec.exponents.len(),
                spec.coefficients.len()
            ));
        }
    }
    Ok(())
}

fn atomic_grid(symbol: &str, grid: &GridConfig) -> Result<AtomicGrid> {
    match (&grid.points, &grid.radial, &grid.angular) {
        (Some(points), None, None) => {
            let (xyz, weights): (Vec<Vector3<f64>>, Vec<f64>) = points
                .iter()
                .map(|p| (Vector3::new(p[0], p[1], p[2]), p[3]))
                .unzip();
            AtomicGrid::new(xyz, weights).wrap_err_with(|| format!("Invalid grid for {}", symbol))
        }
        (None, Some(radial), Some(angular)) => {
            let radial: Vec<(f64, f64)> = radial.iter().map(|r| (r[0], r[1])).collect();
            let angular: Vec<(Vector3<f64>, f64)> = angular
                .iter()
                .map(|a| (Vector3::new(a[0], a[1], a[2]), a[3]))
                .collect();
            Ok(AtomicGrid::product(&radial, &angular))
        }
        _ => Err(eyre!(
            "Grid for {} needs either `points` or both `radial` and `angular`",
            symbol
        )),
    }
}

fn build_grid(grids: &HashMap<String, GridConfig>, molecule: &Molecule) -> Result<MolGrid> {
    let mut mol_grid = MolGrid::new();
    for atom in molecule.iter() {
        if mol_grid.get(atom.atomic_number).is_some() {
            continue;
        }
        let grid = grids
            .get(&atom.symbol)
            .ok_or_else(|| eyre!("No atomic grid given for element {}", atom.symbol))?;
        mol_grid.insert(atom.atomic_number, atomic_grid(&atom.symbol, grid)?);
    }
    Ok(mol_grid)
}

fn build_density(rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let ncols = rows.first().map_or(0, |r| r.len());
    if let Some(bad) = rows.iter().position(|r| r.len() != ncols) {
        return Err(eyre!(
            "Density matrix row {} has {} entries, expected {}",
            bad,
            rows[bad].len(),
            ncols
        ));
    }
    Ok(DMatrix::from_row_iterator(
        rows.len(),
        ncols,
        rows.iter().flatten().copied(),
    ))
}
