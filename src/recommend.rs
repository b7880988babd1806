//! Venue recommendation from the visits of matched entities.
//!
//! Visits are grouped by venue; each venue counts the distinct entities that
//! went there and the total number of visits. Venues shared by more of the
//! selected entities rank first, then venues with more visits.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, TrajectoryError};
use crate::{VenueAggregate, VisitRecord};

/// Per-venue accumulator while scanning visit records.
struct VenueTally<'a> {
    first: &'a VisitRecord,
    visitors: HashSet<&'a str>,
    visits: u32,
}

/// Aggregate visit records of the selected entities into ranked venues.
///
/// Records whose entity is not in `entity_ids` are ignored. Returns at most
/// `max_venues` aggregates sorted by `(visitor_count desc, visit_count desc,
/// venue_id asc)`. Fails with `InvalidInput` if `entity_ids` is empty; an
/// empty vector means the entities visited nothing in common with the store.
///
/// # Example
/// ```
/// use trajectory_matcher::{aggregate_venues, VisitRecord};
///
/// let visit = |venue: &str, entity: &str| VisitRecord {
///     venue_id: venue.to_string(),
///     category: "Coffee Shop".to_string(),
///     latitude: 40.0,
///     longitude: -73.0,
///     entity_id: entity.to_string(),
/// };
/// let visits = vec![visit("v1", "u1"), visit("v1", "u2"), visit("v2", "u1")];
///
/// let venues = aggregate_venues(&["u1".to_string(), "u2".to_string()], &visits, 15).unwrap();
/// assert_eq!(venues[0].venue_id, "v1");
/// assert_eq!(venues[0].visitor_count, 2);
/// ```
pub fn aggregate_venues(
    entity_ids: &[String],
    visits: &[VisitRecord],
    max_venues: usize,
) -> Result<Vec<VenueAggregate>> {
    if entity_ids.is_empty() {
        return Err(TrajectoryError::invalid_input(
            "at least one entity id is required",
        ));
    }

    let selected: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();

    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut tallies: Vec<VenueTally> = Vec::new();

    for visit in visits {
        if !selected.contains(visit.entity_id.as_str()) {
            continue;
        }
        let slot = *index.entry(visit.venue_id.as_str()).or_insert_with(|| {
            tallies.push(VenueTally {
                first: visit,
                visitors: HashSet::new(),
                visits: 0,
            });
            tallies.len() - 1
        });
        let tally = &mut tallies[slot];
        tally.visitors.insert(visit.entity_id.as_str());
        tally.visits += 1;
    }

    let mut venues: Vec<VenueAggregate> = tallies
        .into_iter()
        .map(|t| VenueAggregate {
            venue_id: t.first.venue_id.clone(),
            category: t.first.category.clone(),
            latitude: t.first.latitude,
            longitude: t.first.longitude,
            visitor_count: t.visitors.len() as u32,
            visit_count: t.visits,
        })
        .collect();

    venues.sort_by(|a, b| {
        b.visitor_count
            .cmp(&a.visitor_count)
            .then_with(|| b.visit_count.cmp(&a.visit_count))
            .then_with(|| a.venue_id.cmp(&b.venue_id))
    });
    venues.truncate(max_venues);

    Ok(venues)
}
