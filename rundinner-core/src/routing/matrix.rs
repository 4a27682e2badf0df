//! Pairwise distance matrices consumed by the solver.

use super::error::RouteError;
use crate::Coordinate;

/// Square matrix of walking distances in metres.
///
/// `get(i, j)` is the distance from point `i` to point `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    size: usize,
    cells: Vec<f64>,
}

impl DistanceMatrix {
    /// A matrix of zeros.
    #[must_use]
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            cells: vec![0.0; size * size],
        }
    }

    /// Build a matrix by evaluating `f(i, j)` for every `i < j` and mirroring
    /// it; the diagonal is zero.
    pub fn symmetric_from_fn<F>(size: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        let mut matrix = Self::zeros(size);
        for i in 0..size {
            for j in (i + 1)..size {
                let value = f(i, j);
                matrix.set(i, j, value);
                matrix.set(j, i, value);
            }
        }
        matrix
    }

    /// Number of rows (and columns).
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Distance from `i` to `j`, or `None` when out of range.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.size || j >= self.size {
            return None;
        }
        self.cells.get(i * self.size + j).copied()
    }

    /// Overwrite the distance from `i` to `j`. Out-of-range writes are ignored.
    pub fn set(&mut self, i: usize, j: usize, meters: f64) {
        if i >= self.size || j >= self.size {
            return;
        }
        if let Some(cell) = self.cells.get_mut(i * self.size + j) {
            *cell = meters;
        }
    }
}

/// Fetch pairwise walking distances for a set of points.
///
/// Implementers must return a square `n×n` matrix where `n == points.len()`.
///
/// # Examples
///
/// ```rust
/// use rundinner_core::{Coordinate, DistanceMatrixProvider, HaversineEstimator};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let points = [Coordinate::new(48.0, 11.0)?, Coordinate::new(48.01, 11.0)?];
/// let matrix = HaversineEstimator::default().distance_matrix(&points)?;
/// assert_eq!(matrix.size(), 2);
/// assert_eq!(matrix.get(0, 1), matrix.get(1, 0));
/// # Ok(())
/// # }
/// ```
pub trait DistanceMatrixProvider: Send + Sync {
    /// Return the matrix of distances between `points`.
    fn distance_matrix(&self, points: &[Coordinate]) -> Result<DistanceMatrix, RouteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn mirrors_upper_triangle() {
        let matrix = DistanceMatrix::symmetric_from_fn(3, |i, j| (i * 10 + j) as f64);
        assert_eq!(matrix.get(0, 2), Some(2.0));
        assert_eq!(matrix.get(2, 0), Some(2.0));
        assert_eq!(matrix.get(1, 1), Some(0.0));
        assert_eq!(matrix.get(3, 0), None);
    }

    #[rstest]
    fn ignores_out_of_range_writes() {
        let mut matrix = DistanceMatrix::zeros(2);
        matrix.set(5, 0, 1.0);
        matrix.set(0, 1, 7.5);
        assert_eq!(matrix.get(0, 1), Some(7.5));
    }
}
