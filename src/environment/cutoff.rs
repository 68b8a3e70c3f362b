//! Cutoff-pruned neighbor search.
//!
//! Non-periodic structures are searched through a uniform spatial grid with
//! cell size equal to the cutoff, so each atom only tests candidates from
//! the 27 surrounding grid cells. Periodic structures enumerate image
//! shells: along each periodic axis the search covers
//! `ceil(cutoff / h_k)` shells, where `h_k` is the perpendicular width of
//! the cell along that axis, which guarantees that no in-cutoff image is
//! missed. Non-periodic axes contribute only the zero offset.

use std::collections::HashMap;

use nalgebra::{Matrix3, Vector3};

use super::{check_finite, Environment, EnvironmentProvider, GeometryError};
use crate::model::structure::Structure;

const SINGULAR_EPS: f64 = 1e-10;

/// Neighbor provider returning all pairs within a fixed cutoff radius.
///
/// Under periodic boundary conditions an atom pair can appear several
/// times, once per periodic image within the cutoff; the self pair
/// (`i == i` at zero offset) is always excluded.
#[derive(Debug, Clone, Copy)]
pub struct CutoffProvider {
    cutoff: f64,
}

impl CutoffProvider {
    /// Creates a provider for the given cutoff radius.
    ///
    /// Fails with [`GeometryError::InvalidCutoff`] unless the cutoff is
    /// positive and finite.
    pub fn new(cutoff: f64) -> Result<Self, GeometryError> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(GeometryError::InvalidCutoff(cutoff));
        }
        Ok(Self { cutoff })
    }

    #[inline]
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn open_boundary(&self, structure: &Structure) -> Environment {
        let positions = &structure.positions;
        let grid = SpatialGrid::from_positions(positions, self.cutoff);
        let cutoff_sq = self.cutoff * self.cutoff;

        let rows = positions
            .iter()
            .enumerate()
            .map(|(i, &center)| {
                let mut row: Vec<(usize, [i32; 3])> = grid
                    .candidates(center)
                    .into_iter()
                    .filter(|&j| j != i && distance_sq(center, positions[j]) <= cutoff_sq)
                    .map(|j| (j, [0i32; 3]))
                    .collect();
                row.sort_unstable_by_key(|&(j, _)| j);
                row
            })
            .collect();
        Environment::from_rows(rows)
    }

    fn periodic(
        &self,
        structure: &Structure,
        cell: &[[f64; 3]; 3],
    ) -> Result<Environment, GeometryError> {
        let h = Matrix3::new(
            cell[0][0], cell[0][1], cell[0][2],
            cell[1][0], cell[1][1], cell[1][2],
            cell[2][0], cell[2][1], cell[2][2],
        );
        let det = h.determinant();
        if det.abs() < SINGULAR_EPS {
            return Err(GeometryError::SingularCell { det });
        }

        let va = Vector3::new(cell[0][0], cell[0][1], cell[0][2]);
        let vb = Vector3::new(cell[1][0], cell[1][1], cell[1][2]);
        let vc = Vector3::new(cell[2][0], cell[2][1], cell[2][2]);
        // Perpendicular width along each axis: cell volume over the area of
        // the opposite face.
        let widths = [
            det.abs() / vb.cross(&vc).norm(),
            det.abs() / vc.cross(&va).norm(),
            det.abs() / va.cross(&vb).norm(),
        ];
        let mut shells = [0i32; 3];
        for k in 0..3 {
            if structure.pbc[k] {
                shells[k] = (self.cutoff / widths[k]).ceil() as i32;
            }
        }

        let cutoff_sq = self.cutoff * self.cutoff;
        let positions = &structure.positions;
        let n = positions.len();
        let mut rows = vec![Vec::new(); n];
        for i in 0..n {
            let pi = positions[i];
            for j in 0..n {
                let pj = positions[j];
                for na in -shells[0]..=shells[0] {
                    for nb in -shells[1]..=shells[1] {
                        for nc in -shells[2]..=shells[2] {
                            if i == j && na == 0 && nb == 0 && nc == 0 {
                                continue;
                            }
                            let shift =
                                va * (na as f64) + vb * (nb as f64) + vc * (nc as f64);
                            let dx = pj[0] + shift[0] - pi[0];
                            let dy = pj[1] + shift[1] - pi[1];
                            let dz = pj[2] + shift[2] - pi[2];
                            if dx * dx + dy * dy + dz * dz <= cutoff_sq {
                                rows[i].push((j, [na, nb, nc]));
                            }
                        }
                    }
                }
            }
        }
        Ok(Environment::from_rows(rows))
    }
}

impl EnvironmentProvider for CutoffProvider {
    fn environment(&self, structure: &Structure) -> Result<Environment, GeometryError> {
        check_finite(structure)?;
        match (&structure.cell, structure.is_periodic()) {
            (Some(cell), true) => self.periodic(structure, cell),
            _ => Ok(self.open_boundary(structure)),
        }
    }
}

#[inline]
fn distance_sq(a: [f64; 3], b: [f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Uniform cubic grid over atom positions.
///
/// With cell size equal to the cutoff, all candidates for an atom's
/// neighbor row sit in the 27 grid cells around it.
struct SpatialGrid {
    inv_cell_size: f64,
    cells: HashMap<(i32, i32, i32), Vec<usize>>,
}

impl SpatialGrid {
    fn from_positions(positions: &[[f64; 3]], cell_size: f64) -> Self {
        let mut grid = Self {
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::new(),
        };
        for (idx, &pos) in positions.iter().enumerate() {
            let cell = grid.cell_coords(pos);
            grid.cells.entry(cell).or_default().push(idx);
        }
        grid
    }

    fn cell_coords(&self, pos: [f64; 3]) -> (i32, i32, i32) {
        (
            (pos[0] * self.inv_cell_size).floor() as i32,
            (pos[1] * self.inv_cell_size).floor() as i32,
            (pos[2] * self.inv_cell_size).floor() as i32,
        )
    }

    fn candidates(&self, pos: [f64; 3]) -> Vec<usize> {
        let (cx, cy, cz) = self.cell_coords(pos);
        let mut result = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(indices) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) {
                        result.extend_from_slice(indices);
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic(side: f64) -> [[f64; 3]; 3] {
        [
            [side, 0.0, 0.0],
            [0.0, side, 0.0],
            [0.0, 0.0, side],
        ]
    }

    fn pair_set(env: &Environment) -> Vec<(usize, i64, [i32; 3])> {
        let mut pairs = Vec::new();
        for i in 0..env.atom_count() {
            for (&j, &offset) in env.neighbors(i).iter().zip(env.offsets(i)) {
                if j >= 0 {
                    pairs.push((i, j, offset));
                }
            }
        }
        pairs
    }

    #[test]
    fn rejects_bad_cutoffs() {
        assert!(matches!(
            CutoffProvider::new(0.0).unwrap_err(),
            GeometryError::InvalidCutoff(_)
        ));
        assert!(CutoffProvider::new(-1.5).is_err());
        assert!(CutoffProvider::new(f64::NAN).is_err());
        assert!(CutoffProvider::new(f64::INFINITY).is_err());
        assert!(CutoffProvider::new(5.0).is_ok());
    }

    #[test]
    fn open_boundary_within_and_without() {
        let structure = Structure::new(
            vec![8, 1, 1],
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [8.0, 0.0, 0.0]],
        )
        .unwrap();
        let env = CutoffProvider::new(2.0)
            .unwrap()
            .environment(&structure)
            .unwrap();
        assert_eq!(&env.neighbors(0)[..env.neighbor_count(0)], &[1]);
        assert_eq!(&env.neighbors(1)[..env.neighbor_count(1)], &[0]);
        assert_eq!(env.neighbor_count(2), 0);
        assert!(env.offsets(0).iter().all(|&o| o == [0; 3]));
    }

    #[test]
    fn open_boundary_matches_brute_force() {
        // Positions spread over several grid cells, some near cell borders.
        let positions = vec![
            [0.1, 0.2, 0.3],
            [1.9, 0.0, 0.0],
            [2.1, 0.1, 0.0],
            [0.0, 3.9, 0.0],
            [4.0, 4.0, 4.0],
            [-1.5, 0.5, 0.5],
        ];
        let structure = Structure::new(vec![6; 6], positions.clone()).unwrap();
        let cutoff = 2.0;
        let env = CutoffProvider::new(cutoff)
            .unwrap()
            .environment(&structure)
            .unwrap();

        for i in 0..positions.len() {
            let mut expected: Vec<i64> = (0..positions.len())
                .filter(|&j| j != i && distance_sq(positions[i], positions[j]) <= cutoff * cutoff)
                .map(|j| j as i64)
                .collect();
            expected.sort_unstable();
            let mut found: Vec<i64> = env.neighbors(i)[..env.neighbor_count(i)].to_vec();
            found.sort_unstable();
            assert_eq!(found, expected, "neighbors of atom {i}");
        }
    }

    #[test]
    fn neighbor_sets_grow_monotonically_with_cutoff() {
        let structure = Structure::new(
            vec![6; 5],
            vec![
                [0.0, 0.0, 0.0],
                [1.2, 0.3, 0.0],
                [0.0, 2.6, 0.1],
                [3.3, 3.3, 3.3],
                [1.0, 1.0, 4.5],
            ],
        )
        .unwrap();

        let mut previous: Option<Vec<(usize, i64, [i32; 3])>> = None;
        for cutoff in [1.0, 2.0, 3.5, 5.0, 9.0] {
            let env = CutoffProvider::new(cutoff)
                .unwrap()
                .environment(&structure)
                .unwrap();
            let pairs = pair_set(&env);
            if let Some(smaller) = &previous {
                for pair in smaller {
                    assert!(pairs.contains(pair), "pair {pair:?} lost at cutoff {cutoff}");
                }
            }
            previous = Some(pairs);
        }
    }

    #[test]
    fn single_atom_in_cubic_cell_sees_its_images() {
        let structure =
            Structure::with_cell(vec![18], vec![[0.0; 3]], cubic(4.0)).unwrap();

        // Below the lattice constant nothing is in range.
        let env = CutoffProvider::new(1.9)
            .unwrap()
            .environment(&structure)
            .unwrap();
        assert_eq!(env.neighbor_count(0), 0);

        // Between the lattice constant and the face diagonal: exactly the
        // six nearest images, each of the same atom.
        let env = CutoffProvider::new(4.5)
            .unwrap()
            .environment(&structure)
            .unwrap();
        assert_eq!(env.neighbor_count(0), 6);
        assert!(env.neighbors(0).iter().all(|&j| j == 0));
        for &offset in env.offsets(0) {
            let shell: i32 = offset.iter().map(|o| o.abs()).sum();
            assert_eq!(shell, 1);
        }
    }

    #[test]
    fn periodic_count_matches_all_image_brute_force() {
        let side = 6.0;
        let cutoff = 2.5; // < side / 2
        let positions = vec![
            [0.5, 0.5, 0.5],
            [2.2, 0.4, 5.8],
            [5.5, 5.5, 0.2],
            [3.0, 3.0, 3.0],
        ];
        let structure =
            Structure::with_cell(vec![6; 4], positions.clone(), cubic(side)).unwrap();
        let env = CutoffProvider::new(cutoff)
            .unwrap()
            .environment(&structure)
            .unwrap();

        // Independent enumeration over a generous ±3 shell range.
        for i in 0..positions.len() {
            let mut expected = 0usize;
            for j in 0..positions.len() {
                for na in -3i32..=3 {
                    for nb in -3i32..=3 {
                        for nc in -3i32..=3 {
                            if i == j && na == 0 && nb == 0 && nc == 0 {
                                continue;
                            }
                            let image = [
                                positions[j][0] + side * na as f64,
                                positions[j][1] + side * nb as f64,
                                positions[j][2] + side * nc as f64,
                            ];
                            if distance_sq(positions[i], image) <= cutoff * cutoff {
                                expected += 1;
                            }
                        }
                    }
                }
            }
            assert_eq!(env.neighbor_count(i), expected, "atom {i}");
        }
    }

    #[test]
    fn periodic_pairs_are_symmetric_under_offset_negation() {
        let structure = Structure::with_cell(
            vec![6, 8],
            vec![[0.2, 0.1, 0.0], [3.8, 3.9, 3.7]],
            cubic(4.0),
        )
        .unwrap();
        let env = CutoffProvider::new(2.0)
            .unwrap()
            .environment(&structure)
            .unwrap();
        let pairs = pair_set(&env);
        for &(i, j, [a, b, c]) in &pairs {
            assert!(
                pairs.contains(&(j as usize, i as i64, [-a, -b, -c])),
                "missing mirror of ({i}, {j}, {:?})",
                [a, b, c]
            );
        }
    }

    #[test]
    fn slab_periodicity_keeps_open_axis_offsets_zero() {
        let structure = Structure::with_cell(
            vec![6, 6],
            vec![[0.1, 0.1, 0.0], [3.9, 3.9, 0.0]],
            cubic(4.0),
        )
        .unwrap()
        .with_pbc([true, true, false]);
        let env = CutoffProvider::new(1.0)
            .unwrap()
            .environment(&structure)
            .unwrap();
        // The two atoms only meet through the (-1, -1, 0) image.
        assert_eq!(env.neighbor_count(0), 1);
        assert_eq!(env.offsets(0)[0], [-1, -1, 0]);
        assert!(pair_set(&env).iter().all(|&(_, _, offset)| offset[2] == 0));
    }

    #[test]
    fn singular_cell_is_rejected() {
        let flat = [
            [4.0, 0.0, 0.0],
            [8.0, 0.0, 0.0],
            [0.0, 0.0, 4.0],
        ];
        let structure = Structure::with_cell(vec![6], vec![[0.0; 3]], flat).unwrap();
        assert!(matches!(
            CutoffProvider::new(1.0)
                .unwrap()
                .environment(&structure)
                .unwrap_err(),
            GeometryError::SingularCell { .. }
        ));
    }

    #[test]
    fn cell_without_periodic_axes_is_treated_as_open() {
        let structure = Structure::with_cell(
            vec![6, 6],
            vec![[0.1, 0.0, 0.0], [3.9, 0.0, 0.0]],
            cubic(4.0),
        )
        .unwrap()
        .with_pbc([false; 3]);
        let env = CutoffProvider::new(1.0)
            .unwrap()
            .environment(&structure)
            .unwrap();
        // Without periodicity the two atoms are 3.8 apart: no neighbors.
        assert_eq!(env.neighbor_count(0), 0);
        assert_eq!(env.neighbor_count(1), 0);
    }
}
