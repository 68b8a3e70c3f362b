use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("species count ({species}) does not match position count ({positions})")]
pub struct AtomCountMismatch {
    pub species: usize,
    pub positions: usize,
}

/// One atomic configuration: species ids, Cartesian positions, and an
/// optional periodic cell.
///
/// Species are arbitrary integer ids (typically atomic numbers). The cell,
/// if present, is given as three row lattice vectors; `pbc` selects which
/// axes are treated as periodic and defaults to all three whenever a cell
/// is supplied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Structure {
    pub species: Vec<i32>,
    pub positions: Vec<[f64; 3]>,
    pub cell: Option<[[f64; 3]; 3]>,
    pub pbc: [bool; 3],
}

impl Structure {
    /// Creates a non-periodic structure.
    pub fn new(species: Vec<i32>, positions: Vec<[f64; 3]>) -> Result<Self, AtomCountMismatch> {
        let structure = Self {
            species,
            positions,
            cell: None,
            pbc: [false; 3],
        };
        structure.validate()?;
        Ok(structure)
    }

    /// Creates a periodic structure with the given row-major cell matrix.
    ///
    /// All three axes are marked periodic; use [`with_pbc`](Self::with_pbc)
    /// to restrict periodicity to a subset of axes.
    pub fn with_cell(
        species: Vec<i32>,
        positions: Vec<[f64; 3]>,
        cell: [[f64; 3]; 3],
    ) -> Result<Self, AtomCountMismatch> {
        let structure = Self {
            species,
            positions,
            cell: Some(cell),
            pbc: [true; 3],
        };
        structure.validate()?;
        Ok(structure)
    }

    /// Overrides the per-axis periodicity flags.
    pub fn with_pbc(mut self, pbc: [bool; 3]) -> Self {
        self.pbc = pbc;
        self
    }

    #[inline]
    pub fn atom_count(&self) -> usize {
        self.species.len()
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.cell.is_some() && self.pbc.iter().any(|&p| p)
    }

    /// Checks the species/position count invariant.
    pub fn validate(&self) -> Result<(), AtomCountMismatch> {
        if self.species.len() != self.positions.len() {
            return Err(AtomCountMismatch {
                species: self.species.len(),
                positions: self.positions.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_mismatch_is_rejected() {
        let result = Structure::new(vec![1, 8], vec![[0.0; 3]]);
        assert_eq!(
            result.unwrap_err(),
            AtomCountMismatch {
                species: 2,
                positions: 1
            }
        );
    }

    #[test]
    fn pbc_defaults() {
        let open = Structure::new(vec![1], vec![[0.0; 3]]).unwrap();
        assert_eq!(open.pbc, [false; 3]);
        assert!(!open.is_periodic());

        let cell = [[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]];
        let periodic = Structure::with_cell(vec![1], vec![[0.0; 3]], cell).unwrap();
        assert_eq!(periodic.pbc, [true; 3]);
        assert!(periodic.is_periodic());

        let slab = periodic.with_pbc([true, true, false]);
        assert!(slab.is_periodic());
        let isolated = slab.with_pbc([false; 3]);
        assert!(!isolated.is_periodic());
    }

    #[test]
    fn value_equality() {
        let a = Structure::new(vec![6, 1], vec![[0.0; 3], [1.1, 0.0, 0.0]]).unwrap();
        let b = a.clone();
        assert_eq!(a, b);
    }
}
