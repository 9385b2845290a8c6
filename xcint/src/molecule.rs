extern crate nalgebra as na;

use crate::error::{Result, XcError};
use na::Vector3;
use periodic_table_on_an_enum::Element;
use std::ops::Index;

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub symbol: String,
    pub atomic_number: u32,
    /// Nuclear position in bohr.
    pub position: Vector3<f64>,
}

impl Atom {
    pub fn new(symbol: &str, position: Vector3<f64>) -> Result<Self> {
        let element = Element::from_symbol(symbol)
            .ok_or_else(|| XcError::InvalidInput(format!("unknown element symbol: {}", symbol)))?;
        Ok(Self {
            symbol: element.get_symbol().to_string(),
            atomic_number: element.get_atomic_number() as u32,
            position,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Molecule {
    atoms: Vec<Atom>,
}

impl Molecule {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self { atoms }
    }

    pub fn from_symbols(atoms: &[(&str, [f64; 3])]) -> Result<Self> {
        let atoms = atoms
            .iter()
            .map(|(sym, xyz)| Atom::new(sym, Vector3::new(xyz[0], xyz[1], xyz[2])))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(atoms))
    }

    pub fn natoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Atom> {
        self.atoms.iter()
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }
}

impl Index<usize> for Molecule {
    type Output = Atom;

    fn index(&self, iat: usize) -> &Atom {
        &self.atoms[iat]
    }
}
