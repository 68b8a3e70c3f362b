//! Neighbor-list computation strategies.
//!
//! An [`EnvironmentProvider`] computes, for every atom of a [`Structure`],
//! the indices of its neighboring atoms and the periodic image (cell offset)
//! each neighbor is taken from. Two strategies are provided:
//!
//! - [`AllPairsProvider`] — exhaustive all-pairs neighbors, intended for
//!   small non-periodic structures;
//! - [`CutoffProvider`] — cutoff-pruned spatial search, with image-shell
//!   enumeration under periodic boundary conditions.
//!
//! The strategy is selected when the dataset accessor is constructed, not
//! per query.

use thiserror::Error;

use crate::model::structure::Structure;

mod all_pairs;
mod cutoff;

pub use all_pairs::AllPairsProvider;
pub use cutoff::CutoffProvider;

/// Sentinel index marking padding entries in neighbor rows.
///
/// Valid atom indices are non-negative, so consumers can mask padding with
/// `index >= 0`. Padding entries always carry a zero cell offset. This is
/// the only silent shaping the providers perform; neighbor lists are never
/// truncated.
pub const PAD_NEIGHBOR: i64 = -1;

/// Errors raised by neighbor-list computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// The cutoff radius is zero, negative, or non-finite.
    #[error("cutoff radius must be a positive finite number, got {0}")]
    InvalidCutoff(f64),

    /// A position holds NaN or an infinity.
    #[error("position of atom {atom} contains a non-finite coordinate")]
    NonFinitePosition { atom: usize },

    /// Periodic neighbor search on a cell with (near-)zero determinant is
    /// not well-defined.
    #[error("periodic cell is singular (determinant {det:e})")]
    SingularCell { det: f64 },
}

/// Strategy capability: compute the atomic environments of one structure.
///
/// Implementations are stateless per call and safe to share across threads.
pub trait EnvironmentProvider: Send + Sync {
    fn environment(&self, structure: &Structure) -> Result<Environment, GeometryError>;
}

/// Per-atom neighbor indices and cell offsets, padded rectangular.
///
/// Rows are padded to the per-structure maximum neighbor count with
/// [`PAD_NEIGHBOR`] (and zero offsets), so a batch of heterogeneous atom
/// counts can be stacked into rectangular arrays downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    atom_count: usize,
    max_neighbors: usize,
    indices: Vec<i64>,
    offsets: Vec<[i32; 3]>,
}

impl Environment {
    pub(crate) fn from_rows(rows: Vec<Vec<(usize, [i32; 3])>>) -> Self {
        let atom_count = rows.len();
        let max_neighbors = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut indices = Vec::with_capacity(atom_count * max_neighbors);
        let mut offsets = Vec::with_capacity(atom_count * max_neighbors);
        for row in &rows {
            for &(j, offset) in row {
                indices.push(j as i64);
                offsets.push(offset);
            }
            for _ in row.len()..max_neighbors {
                indices.push(PAD_NEIGHBOR);
                offsets.push([0; 3]);
            }
        }
        Self {
            atom_count,
            max_neighbors,
            indices,
            offsets,
        }
    }

    #[inline]
    pub fn atom_count(&self) -> usize {
        self.atom_count
    }

    /// Width of the padded neighbor rows.
    #[inline]
    pub fn max_neighbors(&self) -> usize {
        self.max_neighbors
    }

    /// Neighbor indices of atom `i`, including padding.
    pub fn neighbors(&self, i: usize) -> &[i64] {
        &self.indices[i * self.max_neighbors..(i + 1) * self.max_neighbors]
    }

    /// Cell offsets of atom `i`'s neighbors, including padding.
    pub fn offsets(&self, i: usize) -> &[[i32; 3]] {
        &self.offsets[i * self.max_neighbors..(i + 1) * self.max_neighbors]
    }

    /// Number of real (non-padding) neighbors of atom `i`.
    pub fn neighbor_count(&self, i: usize) -> usize {
        self.neighbors(i).iter().filter(|&&j| j != PAD_NEIGHBOR).count()
    }

    /// Row-major validity mask over the padded arrays (`true` = real
    /// neighbor).
    pub fn mask(&self) -> Vec<bool> {
        self.indices.iter().map(|&j| j != PAD_NEIGHBOR).collect()
    }

    /// Flat row-major neighbor index array (`atom_count × max_neighbors`).
    pub fn flat_neighbors(&self) -> &[i64] {
        &self.indices
    }

    /// Flat row-major cell offset array (`atom_count × max_neighbors`).
    pub fn flat_offsets(&self) -> &[[i32; 3]] {
        &self.offsets
    }
}

pub(crate) fn check_finite(structure: &Structure) -> Result<(), GeometryError> {
    for (atom, position) in structure.positions.iter().enumerate() {
        if position.iter().any(|c| !c.is_finite()) {
            return Err(GeometryError::NonFinitePosition { atom });
        }
    }
    Ok(())
}
