//! Point cost model.
//!
//! Dissimilarity between two space-time points is the planar distance between
//! their coordinates (in degrees, not meters) plus the hour difference
//! normalized to a day:
//!
//! ```text
//! cost = sqrt(Δlat² + Δlng²) + |Δhour| / 24
//! ```
//!
//! Planar distance is adequate because trajectories are only compared against
//! each other and cover a small region. One hour of difference weighs about as
//! much as 0.04° of displacement.

use geo::{Distance, Euclidean, Point};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};
use crate::SpaceTimePoint;

/// Hours in a day, used to normalize the temporal term to [0, 1].
pub const HOURS_PER_DAY: f64 = 24.0;

/// Relative weights of the spatial and temporal terms.
///
/// The default 1:1 blend reproduces the unweighted cost exactly. There is no
/// calibration behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    pub spatial: f64,
    pub temporal: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            spatial: 1.0,
            temporal: 1.0,
        }
    }
}

impl CostWeights {
    pub fn new(spatial: f64, temporal: f64) -> Self {
        Self { spatial, temporal }
    }

    /// Weights must be finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("spatial", self.spatial), ("temporal", self.temporal)] {
            if !w.is_finite() || w < 0.0 {
                return Err(TrajectoryError::ConfigError {
                    message: format!("{} weight must be finite and >= 0, got {}", name, w),
                });
            }
        }
        Ok(())
    }

    /// Weighted cost between two points.
    #[inline]
    pub fn cost(&self, a: &SpaceTimePoint, b: &SpaceTimePoint) -> f64 {
        self.spatial * spatial_cost(a, b) + self.temporal * temporal_cost(a, b)
    }
}

/// Unweighted cost between two points (the 1:1 blend).
#[inline]
pub fn point_cost(a: &SpaceTimePoint, b: &SpaceTimePoint) -> f64 {
    spatial_cost(a, b) + temporal_cost(a, b)
}

/// Planar coordinate distance in degrees.
#[inline]
pub fn spatial_cost(a: &SpaceTimePoint, b: &SpaceTimePoint) -> f64 {
    let pa = Point::new(a.longitude, a.latitude);
    let pb = Point::new(b.longitude, b.latitude);
    Euclidean::distance(pa, pb)
}

/// Hour difference normalized to [0, 1).
#[inline]
pub fn temporal_cost(a: &SpaceTimePoint, b: &SpaceTimePoint) -> f64 {
    (a.hour as f64 - b.hour as f64).abs() / HOURS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_points_cost_zero() {
        let p = SpaceTimePoint::new(40.0, -73.0, 9);
        assert_eq!(point_cost(&p, &p), 0.0);
    }

    #[test]
    fn test_spatial_term() {
        let a = SpaceTimePoint::new(0.0, 0.0, 12);
        let b = SpaceTimePoint::new(3.0, 4.0, 12);
        assert!((point_cost(&a, &b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_temporal_term() {
        let a = SpaceTimePoint::new(40.0, -73.0, 6);
        let b = SpaceTimePoint::new(40.0, -73.0, 18);
        assert!((point_cost(&a, &b) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_cost_is_symmetric() {
        let a = SpaceTimePoint::new(40.71, -74.00, 8);
        let b = SpaceTimePoint::new(40.73, -73.98, 21);
        assert_eq!(point_cost(&a, &b), point_cost(&b, &a));
    }

    #[test]
    fn test_default_weights_match_unweighted() {
        let a = SpaceTimePoint::new(40.71, -74.00, 8);
        let b = SpaceTimePoint::new(40.73, -73.98, 21);
        let weighted = CostWeights::default().cost(&a, &b);
        assert!((weighted - point_cost(&a, &b)).abs() < 1e-12);
    }

    #[test]
    fn test_zero_temporal_weight_ignores_hours() {
        let a = SpaceTimePoint::new(40.0, -73.0, 0);
        let b = SpaceTimePoint::new(40.0, -73.0, 23);
        assert_eq!(CostWeights::new(1.0, 0.0).cost(&a, &b), 0.0);
    }

    #[test]
    fn test_weight_validation() {
        assert!(CostWeights::new(1.0, 0.0).validate().is_ok());
        assert!(CostWeights::new(-1.0, 1.0).validate().is_err());
        assert!(CostWeights::new(1.0, f64::INFINITY).validate().is_err());
    }
}
