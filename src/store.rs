//! Collaborator store boundary.
//!
//! The core never talks to a database directly. It consumes two fetches
//! through [`TrajectoryStore`]:
//! - the whole corpus of entity trajectories (visit-time ordered, >= 2 points)
//! - the raw visit records of a set of entities
//!
//! [`InMemoryStore`] implements both over a list of raw check-ins and is what
//! the tests and benchmarks run against.

use std::collections::{BTreeMap, HashSet};

use chrono::{FixedOffset, TimeZone, Timelike, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};
use crate::{EntityTrajectory, SpaceTimePoint, VisitRecord};

/// Entities with fewer usable check-ins are not part of the corpus.
///
/// This is also the floor for `MatchConfig::min_corpus_points`.
pub const MIN_TRAJECTORY_POINTS: usize = 2;

/// Source of corpus trajectories and visit records.
///
/// Any error returned here reaches the caller unchanged as
/// `CollaboratorUnavailable`; the core does not retry.
pub trait TrajectoryStore: Send + Sync {
    /// All entity trajectories with at least two points, each in visit order.
    fn fetch_corpus(&self) -> Result<Vec<EntityTrajectory>>;

    /// All visit records belonging to the given entities.
    fn fetch_visits(&self, entity_ids: &[String]) -> Result<Vec<VisitRecord>>;
}

/// A raw check-in as recorded by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckIn {
    pub entity_id: String,
    pub venue_id: String,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Unix timestamp (seconds since epoch, UTC)
    pub utc_time: i64,
    /// Offset of the venue's local time from UTC, in minutes
    #[serde(default)]
    pub timezone_offset_minutes: i32,
}

impl CheckIn {
    /// Local hour of day (0-23) of this check-in.
    ///
    /// Returns `None` for an out-of-range timestamp or offset.
    pub fn local_hour(&self) -> Option<u8> {
        let offset = FixedOffset::east_opt(self.timezone_offset_minutes.checked_mul(60)?)?;
        let utc = Utc.timestamp_opt(self.utc_time, 0).single()?;
        Some(utc.with_timezone(&offset).hour() as u8)
    }

    /// The check-in as a space-time point.
    pub fn to_point(&self) -> Option<SpaceTimePoint> {
        let hour = self.local_hour()?;
        Some(SpaceTimePoint::new(self.latitude, self.longitude, hour))
    }

    pub fn to_visit(&self) -> VisitRecord {
        VisitRecord {
            venue_id: self.venue_id.clone(),
            category: self.category.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            entity_id: self.entity_id.clone(),
        }
    }
}

/// Store backed by an in-memory list of check-ins.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    checkins: Vec<CheckIn>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_checkins(checkins: Vec<CheckIn>) -> Self {
        info!("[InMemoryStore] Loaded {} check-ins", checkins.len());
        Self { checkins }
    }

    /// Load check-ins from a JSON array.
    pub fn from_json(json: &str) -> Result<Self> {
        let checkins: Vec<CheckIn> =
            serde_json::from_str(json).map_err(|e| TrajectoryError::CollaboratorUnavailable {
                message: format!("failed to parse check-ins: {}", e),
            })?;
        Ok(Self::from_checkins(checkins))
    }

    pub fn add_checkin(&mut self, checkin: CheckIn) {
        self.checkins.push(checkin);
    }

    pub fn len(&self) -> usize {
        self.checkins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkins.is_empty()
    }
}

impl TrajectoryStore for InMemoryStore {
    fn fetch_corpus(&self) -> Result<Vec<EntityTrajectory>> {
        let mut by_entity: BTreeMap<&str, Vec<&CheckIn>> = BTreeMap::new();
        for checkin in &self.checkins {
            by_entity
                .entry(checkin.entity_id.as_str())
                .or_default()
                .push(checkin);
        }

        let mut corpus = Vec::with_capacity(by_entity.len());
        for (entity_id, mut checkins) in by_entity {
            if checkins.len() < MIN_TRAJECTORY_POINTS {
                continue;
            }
            checkins.sort_by_key(|c| c.utc_time);

            let points: Vec<SpaceTimePoint> = checkins
                .iter()
                .filter_map(|c| match c.to_point() {
                    Some(point) if point.is_valid() => Some(point),
                    Some(point) => {
                        warn!(
                            "[InMemoryStore] Dropping check-in of '{}' at invalid location ({}, {})",
                            entity_id, point.latitude, point.longitude
                        );
                        None
                    }
                    None => {
                        warn!(
                            "[InMemoryStore] Dropping check-in of '{}' with bad time {} ({:+} min)",
                            entity_id, c.utc_time, c.timezone_offset_minutes
                        );
                        None
                    }
                })
                .collect();

            if points.len() >= MIN_TRAJECTORY_POINTS {
                corpus.push(EntityTrajectory::new(entity_id, points));
            }
        }

        Ok(corpus)
    }

    fn fetch_visits(&self, entity_ids: &[String]) -> Result<Vec<VisitRecord>> {
        let wanted: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        Ok(self
            .checkins
            .iter()
            .filter(|c| wanted.contains(c.entity_id.as_str()))
            .map(CheckIn::to_visit)
            .collect())
    }
}
