extern crate nalgebra as na;

use crate::shell::{Shell, ShellSpec};
use na::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// An ordered collection of shells; basis function indices run shell by shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasisSet {
    shells: Vec<Shell>,
    offsets: Vec<usize>,
    nbf: usize,
}

impl BasisSet {
    pub fn new(shells: Vec<Shell>) -> Self {
        let mut offsets = Vec::with_capacity(shells.len());
        let mut nbf = 0;
        for sh in &shells {
            offsets.push(nbf);
            nbf += sh.size();
        }
        Self {
            shells,
            offsets,
            nbf,
        }
    }

    /// Build a basis from per-atom shell descriptions.
    ///
    /// `atoms` yields (center, shells) in atom order; shell indices follow it.
    pub fn from_atoms<'a, I>(atoms: I) -> Self
    where
        I: IntoIterator<Item = (Vector3<f64>, &'a [ShellSpec])>,
    {
        let shells = atoms
            .into_iter()
            .enumerate()
            .flat_map(|(iat, (center, specs))| {
                specs
                    .iter()
                    .map(move |spec| Shell::from_spec(iat, center, spec))
            })
            .collect();
        Self::new(shells)
    }

    pub fn nbf(&self) -> usize {
        self.nbf
    }

    pub fn nshells(&self) -> usize {
        self.shells.len()
    }

    pub fn shells(&self) -> &[Shell] {
        &self.shells
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Shell> {
        self.shells.iter()
    }

    /// Index of the first basis function of shell `ish`.
    pub fn shell_offset(&self, ish: usize) -> usize {
        self.offsets[ish]
    }

    /// Atom owning shell `ish`.
    pub fn shell_to_atom(&self, ish: usize) -> usize {
        self.shells[ish].atom
    }

    pub fn max_l(&self) -> usize {
        self.shells.iter().map(|sh| sh.l).max().unwrap_or(0)
    }

    /// Number of basis functions in the given subset of shells.
    pub fn nbf_subset(&self, shell_list: &[usize]) -> usize {
        shell_list.iter().map(|&ish| self.shells[ish].size()).sum()
    }

    /// Reset the screening tolerance (and hence cutoff radius) of every shell.
    pub fn set_shell_tolerance(&mut self, tol: f64) {
        self.shells
            .par_iter_mut()
            .for_each(|sh| sh.set_shell_tolerance(tol));
    }

    /// Copy of the basis with the shells of atom `iat` moved by `delta`.
    pub fn with_atom_displaced(&self, iat: usize, delta: Vector3<f64>) -> Self {
        let shells = self
            .shells
            .iter()
            .map(|sh| {
                if sh.atom == iat {
                    let mut moved = Shell::new(
                        sh.atom,
                        sh.center + delta,
                        sh.l,
                        sh.exponents.clone(),
                        sh.coefficients.clone(),
                    );
                    moved.set_shell_tolerance(sh.tolerance());
                    moved
                } else {
                    sh.clone()
                }
            })
            .collect();
        Self::new(shells)
    }
}

impl Index<usize> for BasisSet {
    type Output = Shell;

    fn index(&self, ish: usize) -> &Shell {
        &self.shells[ish]
    }
}
