//! Similarity ranking of a corpus against a query trajectory.
//!
//! Every corpus entry is scored with DTW, the distance is mapped to a bounded
//! similarity, and the best `max_matches` entries are returned in descending
//! order of similarity. Ties keep corpus order (stable sort).
//!
//! Scoring is done in two passes: a distance-only DTW over the whole corpus
//! (two rolling rows per comparison), then a full alignment with path
//! reconstruction for the survivors of the top-K cut only.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;

use crate::dtw::{align_with, dtw_distance};
use crate::error::{Result, TrajectoryError};
use crate::{EntityTrajectory, MatchConfig, MatchResult, SpaceTimePoint};

/// Cooperative cancellation flag shared between a request and its caller.
///
/// Checked between corpus entries, never inside a single alignment.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Visible to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Progress callback type: `(scored so far, corpus size)`.
pub type ProgressCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// Shared completion counter for one corpus scan.
struct ScanProgress {
    completed: AtomicU32,
    total: u32,
    callback: Option<ProgressCallback>,
}

impl ScanProgress {
    fn new(total: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            completed: AtomicU32::new(0),
            total: total as u32,
            callback,
        }
    }

    fn tick(&self) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(ref cb) = self.callback {
            cb(done, self.total);
        }
    }
}

/// Map a DTW distance to a similarity in (0, 1].
///
/// The distance is normalized by the longer trajectory length, so the score
/// reads as "average cost per aligned point":
/// `similarity = 1 / (1 + distance / max(n, m))`.
pub fn distance_to_similarity(distance: f64, query_len: usize, entry_len: usize) -> f64 {
    let max_len = query_len.max(entry_len).max(1) as f64;
    1.0 / (1.0 + distance / max_len)
}

/// Rank corpus trajectories by similarity to the query.
///
/// Returns at most `config.max_matches` results. An empty corpus yields an
/// empty vector; an empty query fails with `InvalidInput`.
///
/// # Example
/// ```
/// use trajectory_matcher::{rank_trajectories, EntityTrajectory, MatchConfig, SpaceTimePoint};
///
/// let query = vec![SpaceTimePoint::new(40.0, -73.0, 9)];
/// let corpus = vec![EntityTrajectory::new("u1", query.clone())];
///
/// let matches = rank_trajectories(&query, &corpus, &MatchConfig::default()).unwrap();
/// assert_eq!(matches[0].distance, 0.0);
/// assert_eq!(matches[0].similarity, 1.0);
/// ```
pub fn rank_trajectories(
    query: &[SpaceTimePoint],
    corpus: &[EntityTrajectory],
    config: &MatchConfig,
) -> Result<Vec<MatchResult>> {
    rank_trajectories_with_cancel(query, corpus, config, &CancellationToken::new())
}

/// Rank corpus trajectories, aborting with `Cancelled` once `cancel` fires.
pub fn rank_trajectories_with_cancel(
    query: &[SpaceTimePoint],
    corpus: &[EntityTrajectory],
    config: &MatchConfig,
    cancel: &CancellationToken,
) -> Result<Vec<MatchResult>> {
    rank_trajectories_with_progress(query, corpus, config, cancel, None)
}

/// Rank corpus trajectories, reporting each scored corpus entry to `on_progress`.
///
/// The callback runs on the worker that scored the entry. Cancelling from
/// inside it stops every entry that has not started yet.
pub fn rank_trajectories_with_progress(
    query: &[SpaceTimePoint],
    corpus: &[EntityTrajectory],
    config: &MatchConfig,
    cancel: &CancellationToken,
    on_progress: Option<ProgressCallback>,
) -> Result<Vec<MatchResult>> {
    if query.is_empty() {
        return Err(TrajectoryError::invalid_input(
            "query trajectory must not be empty",
        ));
    }

    // Scored entries in corpus order: (corpus index, distance, similarity)
    let progress = ScanProgress::new(corpus.len(), on_progress);
    let mut scored = score_corpus(query, corpus, config, cancel, &progress)?;

    // Stable: equal similarities keep corpus order
    scored.sort_by(|a, b| b.2.total_cmp(&a.2));
    scored.truncate(config.max_matches);

    let weights = config.weights;
    let mut results = Vec::with_capacity(scored.len());
    for (idx, distance, similarity) in scored {
        let entry = &corpus[idx];
        let alignment = align_with(query, &entry.points, |a, b| weights.cost(a, b))?;

        results.push(MatchResult {
            entity_id: entry.entity_id.clone(),
            similarity,
            distance,
            trajectory: entry.points.clone(),
            path: alignment.path,
        });
    }

    Ok(results)
}

/// Score a single corpus entry.
///
/// `None` for entries with no points or with an invalid point: a non-finite
/// coordinate would yield a NaN or zero similarity.
fn score_entry(
    query: &[SpaceTimePoint],
    idx: usize,
    entry: &EntityTrajectory,
    config: &MatchConfig,
    cancel: &CancellationToken,
    progress: &ScanProgress,
) -> Result<Option<(usize, f64, f64)>> {
    if cancel.is_cancelled() {
        return Err(TrajectoryError::Cancelled);
    }

    let scored = if entry.points.is_empty() {
        debug!("Skipping entity '{}' with empty trajectory", entry.entity_id);
        None
    } else if let Some(bad) = entry.points.iter().position(|p| !p.is_valid()) {
        debug!(
            "Skipping entity '{}' with invalid point at index {}",
            entry.entity_id, bad
        );
        None
    } else {
        let weights = config.weights;
        let distance = dtw_distance(query, &entry.points, |a, b| weights.cost(a, b))?;
        let similarity = distance_to_similarity(distance, query.len(), entry.points.len());
        Some((idx, distance, similarity))
    };

    progress.tick();
    Ok(scored)
}

#[cfg(feature = "parallel")]
fn score_corpus(
    query: &[SpaceTimePoint],
    corpus: &[EntityTrajectory],
    config: &MatchConfig,
    cancel: &CancellationToken,
    progress: &ScanProgress,
) -> Result<Vec<(usize, f64, f64)>> {
    use rayon::prelude::*;

    // Indexed collect preserves corpus order for the stable sort
    let scored: Vec<Option<(usize, f64, f64)>> = corpus
        .par_iter()
        .enumerate()
        .map(|(idx, entry)| score_entry(query, idx, entry, config, cancel, progress))
        .collect::<Result<_>>()?;

    Ok(scored.into_iter().flatten().collect())
}

#[cfg(not(feature = "parallel"))]
fn score_corpus(
    query: &[SpaceTimePoint],
    corpus: &[EntityTrajectory],
    config: &MatchConfig,
    cancel: &CancellationToken,
    progress: &ScanProgress,
) -> Result<Vec<(usize, f64, f64)>> {
    let mut scored = Vec::with_capacity(corpus.len());
    for (idx, entry) in corpus.iter().enumerate() {
        if let Some(s) = score_entry(query, idx, entry, config, cancel, progress)? {
            scored.push(s);
        }
    }
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CostWeights;

    fn query() -> Vec<SpaceTimePoint> {
        vec![
            SpaceTimePoint::new(40.7128, -74.0060, 9),
            SpaceTimePoint::new(40.7306, -73.9866, 12),
            SpaceTimePoint::new(40.7484, -73.9857, 15),
        ]
    }

    fn far_away() -> Vec<SpaceTimePoint> {
        vec![
            SpaceTimePoint::new(51.5074, -0.1278, 2),
            SpaceTimePoint::new(51.5090, -0.1300, 3),
        ]
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(distance_to_similarity(0.0, 3, 5), 1.0);
        let s = distance_to_similarity(1e9, 3, 5);
        assert!(s > 0.0 && s < 1e-6);
    }

    #[test]
    fn test_similarity_strictly_decreasing() {
        let mut last = distance_to_similarity(0.0, 4, 4);
        for d in [0.1, 0.5, 1.0, 2.0, 10.0, 100.0] {
            let s = distance_to_similarity(d, 4, 4);
            assert!(s < last);
            assert!(s > 0.0);
            last = s;
        }
    }

    #[test]
    fn test_similarity_normalized_by_longer_length() {
        // distance 4 over max(2, 4) = 4 points -> 1 / (1 + 1)
        assert_eq!(distance_to_similarity(4.0, 2, 4), 0.5);
        assert_eq!(distance_to_similarity(4.0, 4, 2), 0.5);
    }

    #[test]
    fn test_empty_corpus_returns_empty() {
        let results = rank_trajectories(&query(), &[], &MatchConfig::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_empty_query_rejected() {
        let corpus = vec![EntityTrajectory::new("u1", query())];
        let result = rank_trajectories(&[], &corpus, &MatchConfig::default());
        assert!(matches!(result, Err(TrajectoryError::InvalidInput { .. })));
    }

    #[test]
    fn test_identical_trajectory_ranks_first() {
        let corpus = vec![
            EntityTrajectory::new("far", far_away()),
            EntityTrajectory::new("same", query()),
        ];
        let results = rank_trajectories(&query(), &corpus, &MatchConfig::default()).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entity_id, "same");
        assert_eq!(results[0].similarity, 1.0);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results[0].path, vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(results[0].trajectory, query());
        assert!(results[1].similarity < 1.0);
    }

    #[test]
    fn test_truncates_to_max_matches() {
        let corpus: Vec<EntityTrajectory> = (0..25)
            .map(|i| {
                let points = query()
                    .iter()
                    .map(|p| SpaceTimePoint::new(p.latitude + i as f64 * 0.01, p.longitude, p.hour))
                    .collect();
                EntityTrajectory::new(format!("u{}", i), points)
            })
            .collect();

        let results = rank_trajectories(&query(), &corpus, &MatchConfig::default()).unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].entity_id, "u0");
        for w in results.windows(2) {
            assert!(w[0].similarity >= w[1].similarity);
        }
    }

    #[test]
    fn test_ties_keep_corpus_order() {
        let corpus = vec![
            EntityTrajectory::new("b", query()),
            EntityTrajectory::new("a", query()),
            EntityTrajectory::new("c", query()),
        ];
        let results = rank_trajectories(&query(), &corpus, &MatchConfig::default()).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_empty_corpus_entry_skipped() {
        let corpus = vec![
            EntityTrajectory::new("empty", vec![]),
            EntityTrajectory::new("same", query()),
        ];
        let results = rank_trajectories(&query(), &corpus, &MatchConfig::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity_id, "same");
    }

    #[test]
    fn test_cancelled_request() {
        let corpus = vec![EntityTrajectory::new("u1", query())];
        let token = CancellationToken::new();
        token.clone().cancel();

        let result =
            rank_trajectories_with_cancel(&query(), &corpus, &MatchConfig::default(), &token);
        assert!(matches!(result, Err(TrajectoryError::Cancelled)));
    }

    #[test]
    fn test_invalid_corpus_points_skipped() {
        let q = vec![SpaceTimePoint::new(40.0, -73.0, 9)];
        let corpus = vec![
            EntityTrajectory::new("nan-lat", vec![SpaceTimePoint::new(f64::NAN, -73.0, 9)]),
            EntityTrajectory::new("exact", q.clone()),
            EntityTrajectory::new(
                "inf-lat",
                vec![
                    SpaceTimePoint::new(40.0, -73.0, 9),
                    SpaceTimePoint::new(f64::INFINITY, -73.0, 9),
                ],
            ),
            EntityTrajectory::new("bad-hour", vec![SpaceTimePoint::new(40.0, -73.0, 40)]),
        ];

        let results = rank_trajectories(&q, &corpus, &MatchConfig::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity_id, "exact");
        assert_eq!(results[0].similarity, 1.0);
        assert!(results.iter().all(|r| r.similarity > 0.0 && r.similarity <= 1.0));
    }

    #[test]
    fn test_cancel_during_scan_stops_remaining_entries() {
        let corpus: Vec<EntityTrajectory> = (0..2_000)
            .map(|i| EntityTrajectory::new(format!("u{}", i), query()))
            .collect();

        let token = CancellationToken::new();
        let scored = Arc::new(AtomicU32::new(0));
        let callback: ProgressCallback = {
            let token = token.clone();
            let scored = Arc::clone(&scored);
            Arc::new(move |done, _total| {
                scored.store(done, Ordering::Relaxed);
                if done == 1 {
                    token.cancel();
                }
            })
        };

        let result = rank_trajectories_with_progress(
            &query(),
            &corpus,
            &MatchConfig::default(),
            &token,
            Some(callback),
        );
        assert!(matches!(result, Err(TrajectoryError::Cancelled)));
        assert!((scored.load(Ordering::Relaxed) as usize) < corpus.len());
    }

    #[test]
    fn test_progress_reports_every_entry() {
        let corpus = vec![
            EntityTrajectory::new("empty", vec![]),
            EntityTrajectory::new("u1", query()),
            EntityTrajectory::new("u2", far_away()),
        ];
        let last = Arc::new(AtomicU32::new(0));
        let callback: ProgressCallback = {
            let last = Arc::clone(&last);
            Arc::new(move |done, total| {
                assert_eq!(total, 3);
                last.fetch_max(done, Ordering::Relaxed);
            })
        };

        let results = rank_trajectories_with_progress(
            &query(),
            &corpus,
            &MatchConfig::default(),
            &CancellationToken::new(),
            Some(callback),
        )
        .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(last.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_weights_change_ranking() {
        // Same place at the wrong hour vs. a nearby place at the right hour
        let q = vec![SpaceTimePoint::new(40.0, -73.0, 9)];
        let corpus = vec![
            EntityTrajectory::new("wrong-hour", vec![SpaceTimePoint::new(40.0, -73.0, 21)]),
            EntityTrajectory::new("nearby", vec![SpaceTimePoint::new(40.1, -73.0, 9)]),
        ];

        let results = rank_trajectories(&q, &corpus, &MatchConfig::default()).unwrap();
        assert_eq!(results[0].entity_id, "nearby");

        let spatial_only = MatchConfig {
            weights: CostWeights::new(1.0, 0.0),
            ..MatchConfig::default()
        };
        let results = rank_trajectories(&q, &corpus, &spatial_only).unwrap();
        assert_eq!(results[0].entity_id, "wrong-hour");
        assert_eq!(results[0].similarity, 1.0);
    }
}
