//! Dynamic Time Warping (DTW) alignment of space-time trajectories.
//!
//! DTW matches every point of one trajectory to one or more points of the
//! other, in order, minimizing the summed point cost. Unlike a fixed-index
//! comparison it tolerates trajectories of different lengths and sampling
//! rates: a point may be matched many-to-one in either direction.
//!
//! The cumulative cost matrix `D` has `(n+1) × (m+1)` cells:
//!
//! ```text
//! D[0][0] = 0,  D[i][0] = D[0][j] = ∞
//! D[i][j] = cost(a[i-1], b[j-1]) + min(D[i-1][j], D[i][j-1], D[i-1][j-1])
//! ```
//!
//! and the distance is `D[n][m]`. The matrix is a flat row-major buffer
//! allocated per comparison; it is O(n·m) in both time and space.

use crate::cost::point_cost;
use crate::error::{Result, TrajectoryError};
use crate::SpaceTimePoint;

/// Outcome of aligning two trajectories.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Total DTW distance `D[n][m]`
    pub distance: f64,
    /// Matched index pairs, oldest first, from `(0, 0)` to `(n-1, m-1)`
    pub path: Vec<(usize, usize)>,
}

/// Align two trajectories using the unweighted point cost.
///
/// # Example
/// ```
/// use trajectory_matcher::{align, SpaceTimePoint};
///
/// let a = vec![SpaceTimePoint::new(40.0, -73.0, 9), SpaceTimePoint::new(40.1, -73.0, 10)];
/// let alignment = align(&a, &a).unwrap();
/// assert_eq!(alignment.distance, 0.0);
/// assert_eq!(alignment.path, vec![(0, 0), (1, 1)]);
/// ```
pub fn align(t1: &[SpaceTimePoint], t2: &[SpaceTimePoint]) -> Result<Alignment> {
    align_with(t1, t2, point_cost)
}

/// Align two trajectories with a custom point cost.
///
/// Fails with `InvalidInput` if either trajectory is empty.
pub fn align_with<F>(t1: &[SpaceTimePoint], t2: &[SpaceTimePoint], cost: F) -> Result<Alignment>
where
    F: Fn(&SpaceTimePoint, &SpaceTimePoint) -> f64,
{
    ensure_non_empty(t1, t2)?;

    let matrix = CostMatrix::fill(t1, t2, &cost);
    let distance = matrix.get(t1.len(), t2.len());
    let path = matrix.backtrack();

    Ok(Alignment { distance, path })
}

/// DTW distance without the path, keeping only two rows of the matrix.
///
/// Rows run over the longer trajectory so the buffers are O(min(n, m)).
/// The result is bit-identical to `align_with(..).distance`.
pub fn dtw_distance<F>(t1: &[SpaceTimePoint], t2: &[SpaceTimePoint], cost: F) -> Result<f64>
where
    F: Fn(&SpaceTimePoint, &SpaceTimePoint) -> f64,
{
    ensure_non_empty(t1, t2)?;

    if t2.len() <= t1.len() {
        Ok(rolling_distance(t1, t2, &cost))
    } else {
        // Transposed: arguments swapped back so asymmetric costs stay correct
        Ok(rolling_distance(t2, t1, &|a: &SpaceTimePoint, b: &SpaceTimePoint| {
            cost(b, a)
        }))
    }
}

fn ensure_non_empty(t1: &[SpaceTimePoint], t2: &[SpaceTimePoint]) -> Result<()> {
    if t1.is_empty() || t2.is_empty() {
        return Err(TrajectoryError::InvalidInput {
            message: format!(
                "cannot align empty trajectory ({} vs {} points)",
                t1.len(),
                t2.len()
            ),
        });
    }
    Ok(())
}

fn rolling_distance<F>(rows: &[SpaceTimePoint], cols: &[SpaceTimePoint], cost: &F) -> f64
where
    F: Fn(&SpaceTimePoint, &SpaceTimePoint) -> f64,
{
    let m = cols.len();
    let mut prev = vec![f64::INFINITY; m + 1];
    let mut curr = vec![f64::INFINITY; m + 1];
    prev[0] = 0.0;

    for a in rows {
        curr[0] = f64::INFINITY;
        for (j, b) in cols.iter().enumerate() {
            let best = prev[j + 1].min(curr[j]).min(prev[j]);
            curr[j + 1] = cost(a, b) + best;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m]
}

/// Cumulative cost matrix, row-major with `cols = m + 1`.
struct CostMatrix {
    cols: usize,
    cells: Vec<f64>,
}

impl CostMatrix {
    fn fill<F>(t1: &[SpaceTimePoint], t2: &[SpaceTimePoint], cost: &F) -> Self
    where
        F: Fn(&SpaceTimePoint, &SpaceTimePoint) -> f64,
    {
        let rows = t1.len() + 1;
        let cols = t2.len() + 1;
        let mut matrix = Self {
            cols,
            cells: vec![f64::INFINITY; rows * cols],
        };
        matrix.cells[0] = 0.0;

        for (i, a) in t1.iter().enumerate().map(|(i, a)| (i + 1, a)) {
            for (j, b) in t2.iter().enumerate().map(|(j, b)| (j + 1, b)) {
                let best = matrix
                    .get(i - 1, j)
                    .min(matrix.get(i, j - 1))
                    .min(matrix.get(i - 1, j - 1));
                let idx = i * cols + j;
                matrix.cells[idx] = cost(a, b) + best;
            }
        }

        matrix
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        self.cells[i * self.cols + j]
    }

    /// Walk back from `(n, m)` toward the cheapest predecessor.
    ///
    /// Ties prefer the diagonal, then vertical, then horizontal step.
    fn backtrack(&self) -> Vec<(usize, usize)> {
        let mut i = self.cells.len() / self.cols - 1;
        let mut j = self.cols - 1;
        let mut path = Vec::with_capacity(i + j);

        while i > 0 && j > 0 {
            path.push((i - 1, j - 1));

            let diagonal = self.get(i - 1, j - 1);
            let vertical = self.get(i - 1, j);
            let horizontal = self.get(i, j - 1);
            let min = diagonal.min(vertical).min(horizontal);

            if diagonal == min {
                i -= 1;
                j -= 1;
            } else if vertical == min {
                i -= 1;
            } else {
                j -= 1;
            }
        }

        path.reverse();
        path
    }
}
