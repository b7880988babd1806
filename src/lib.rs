//! # Trajectory Matcher
//!
//! Space-time trajectory similarity and venue recommendation.
//!
//! This library provides:
//! - A point cost model blending coordinate distance and hour-of-day difference
//! - Dynamic Time Warping (DTW) alignment with path reconstruction
//! - Top-K ranking of a corpus of entity trajectories against a query
//! - Venue aggregation over the visits of a set of matched entities
//!
//! ## Features
//!
//! - **`parallel`** (default) - Fan corpus comparisons out with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use trajectory_matcher::{rank_trajectories, EntityTrajectory, MatchConfig, SpaceTimePoint};
//!
//! let query = vec![
//!     SpaceTimePoint::new(40.7128, -74.0060, 9),
//!     SpaceTimePoint::new(40.7306, -73.9866, 12),
//! ];
//!
//! let corpus = vec![
//!     EntityTrajectory::new("u1", query.clone()),
//!     EntityTrajectory::new("u2", vec![
//!         SpaceTimePoint::new(35.6762, 139.6503, 20),
//!         SpaceTimePoint::new(35.6895, 139.6917, 22),
//!     ]),
//! ];
//!
//! let matches = rank_trajectories(&query, &corpus, &MatchConfig::default()).unwrap();
//! assert_eq!(matches[0].entity_id, "u1");
//! assert_eq!(matches[0].similarity, 1.0);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrajectoryError};

// Point cost model (spatial + temporal dissimilarity)
pub mod cost;
pub use cost::{point_cost, CostWeights};

// Dynamic Time Warping alignment
pub mod dtw;
pub use dtw::{align, align_with, dtw_distance, Alignment};

// Similarity ranking over a corpus
pub mod ranking;
pub use ranking::{
    distance_to_similarity, rank_trajectories, rank_trajectories_with_cancel,
    rank_trajectories_with_progress, CancellationToken, ProgressCallback,
};

// Venue recommendation aggregation
pub mod recommend;
pub use recommend::aggregate_venues;

// Collaborator store boundary
pub mod store;
pub use store::{CheckIn, InMemoryStore, TrajectoryStore};

// Request engine (validation, boundary I/O, corpus snapshots)
pub mod engine;
pub use engine::{CorpusSnapshot, SimilarityEngine};

// JSON request/response boundary
pub mod api;
pub use api::{handle_recommendation_request, handle_similarity_request, ApiResponse};

// ============================================================================
// Core Types
// ============================================================================

/// A visit in space and time-of-day.
///
/// `hour` is the local hour (0-23), not a timestamp: the same place at the
/// same hour on different days is the same point.
///
/// # Example
/// ```
/// use trajectory_matcher::SpaceTimePoint;
/// let point = SpaceTimePoint::new(40.7128, -74.0060, 9); // Manhattan, 9am
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpaceTimePoint {
    pub latitude: f64,
    pub longitude: f64,
    pub hour: u8,
}

impl SpaceTimePoint {
    /// Create a new space-time point.
    pub fn new(latitude: f64, longitude: f64, hour: u8) -> Self {
        Self {
            latitude,
            longitude,
            hour,
        }
    }

    /// Check if the point has valid coordinates and an hour in 0..=23.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
            && self.hour <= 23
    }
}

/// A trajectory owned by an entity in the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTrajectory {
    /// Identifier of the owning entity
    pub entity_id: String,
    /// Visits in visiting order
    pub points: Vec<SpaceTimePoint>,
}

impl EntityTrajectory {
    pub fn new(entity_id: impl Into<String>, points: Vec<SpaceTimePoint>) -> Self {
        Self {
            entity_id: entity_id.into(),
            points,
        }
    }
}

/// One corpus entry scored against the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// Entity owning the matched trajectory
    #[serde(rename = "userId")]
    pub entity_id: String,
    /// Bounded score in (0, 1], 1 = zero alignment cost
    pub similarity: f64,
    /// Total DTW distance (>= 0)
    pub distance: f64,
    /// The full matched trajectory
    pub trajectory: Vec<SpaceTimePoint>,
    /// Alignment path as (query index, trajectory index) pairs
    #[serde(rename = "matchingPath")]
    pub path: Vec<(usize, usize)>,
}

/// A single visit of an entity to a venue, as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub venue_id: String,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    pub entity_id: String,
}

/// A venue ranked by how many selected entities visited it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueAggregate {
    pub venue_id: String,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Distinct entities that visited this venue
    #[serde(rename = "user_count")]
    pub visitor_count: u32,
    /// Total visits across those entities
    pub visit_count: u32,
}

/// Configuration for matching and recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Maximum number of matches returned by ranking.
    /// Default: 10
    pub max_matches: usize,

    /// Maximum number of venues returned by aggregation.
    /// Default: 15
    pub max_venues: usize,

    /// Relative weights of the spatial and temporal cost terms.
    /// Default: 1.0 / 1.0
    pub weights: CostWeights,

    /// Corpus entries with fewer points are not considered.
    /// Must be at least [`store::MIN_TRAJECTORY_POINTS`], which the corpus
    /// fetch already enforces; this setting can only raise it.
    /// Default: 2
    pub min_corpus_points: usize,

    /// Reuse a fetched corpus for this many seconds (None = fetch per request).
    /// Default: None
    pub snapshot_max_age_secs: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_matches: 10,
            max_venues: 15,
            weights: CostWeights::default(),
            min_corpus_points: store::MIN_TRAJECTORY_POINTS,
            snapshot_max_age_secs: None,
        }
    }
}

impl MatchConfig {
    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_matches == 0 {
            return Err(TrajectoryError::ConfigError {
                message: "max_matches must be at least 1".to_string(),
            });
        }
        if self.max_venues == 0 {
            return Err(TrajectoryError::ConfigError {
                message: "max_venues must be at least 1".to_string(),
            });
        }
        if self.min_corpus_points < store::MIN_TRAJECTORY_POINTS {
            return Err(TrajectoryError::ConfigError {
                message: format!(
                    "min_corpus_points must be at least {}",
                    store::MIN_TRAJECTORY_POINTS
                ),
            });
        }
        self.weights.validate()
    }
}

/// Validate every point of a query trajectory.
///
/// Fails with `InvalidInput` for an empty trajectory and `InvalidPoint` for the
/// first out-of-range point.
pub fn validate_trajectory(points: &[SpaceTimePoint]) -> Result<()> {
    if points.is_empty() {
        return Err(TrajectoryError::invalid_input("trajectory must not be empty"));
    }
    for (index, p) in points.iter().enumerate() {
        if !p.is_valid() {
            return Err(TrajectoryError::InvalidPoint {
                index,
                message: format!(
                    "({}, {}) at hour {} is out of range",
                    p.latitude, p.longitude, p.hour
                ),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
