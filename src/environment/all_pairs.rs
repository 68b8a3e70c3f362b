use super::{check_finite, Environment, EnvironmentProvider, GeometryError};
use crate::model::structure::Structure;

/// Exhaustive neighbor provider: every other atom is a neighbor.
///
/// Cell offsets are always zero. Any periodic cell on the structure is
/// ignored; this provider is meant for small, non-periodic molecules where
/// the O(n²) pair set is exactly what a dense model consumes. When a
/// periodic structure is passed anyway, the ignored cell is reported via
/// `log::warn!` so the caller is not silently handed open-boundary
/// neighbors.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllPairsProvider;

impl AllPairsProvider {
    pub fn new() -> Self {
        Self
    }
}

impl EnvironmentProvider for AllPairsProvider {
    fn environment(&self, structure: &Structure) -> Result<Environment, GeometryError> {
        check_finite(structure)?;
        if structure.is_periodic() {
            log::warn!(
                "all-pairs provider ignores the periodic cell of a {}-atom structure; \
                 use a cutoff provider for periodic neighbor lists",
                structure.atom_count()
            );
        }

        let n = structure.atom_count();
        let rows = (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (j, [0i32; 3]))
                    .collect()
            })
            .collect();
        Ok(Environment::from_rows(rows))
    }
}
