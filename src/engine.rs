//! # Similarity Engine
//!
//! Request-level entry point wrapping a [`TrajectoryStore`].
//!
//! Each request:
//! 1. Validates its input (before any I/O)
//! 2. Fetches what it needs from the store once
//! 3. Runs the pure ranking or aggregation
//!
//! The corpus may optionally be reused across requests as an explicit,
//! versioned [`CorpusSnapshot`]. A request holds an `Arc` to the snapshot it
//! started with, so a refresh never changes the corpus under it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{Result, TrajectoryError};
use crate::ranking::{rank_trajectories_with_cancel, CancellationToken};
use crate::recommend::aggregate_venues;
use crate::store::TrajectoryStore;
use crate::{
    validate_trajectory, EntityTrajectory, MatchConfig, MatchResult, SpaceTimePoint,
    VenueAggregate,
};

/// An immutable corpus fetched from the store at a point in time.
#[derive(Debug)]
pub struct CorpusSnapshot {
    /// Increments on every fetch
    pub version: u64,
    pub fetched_at: Instant,
    pub entries: Vec<EntityTrajectory>,
}

impl CorpusSnapshot {
    fn is_fresh(&self, max_age: Duration) -> bool {
        self.fetched_at.elapsed() < max_age
    }
}

/// Similarity and recommendation requests over a store.
pub struct SimilarityEngine<S> {
    store: S,
    config: MatchConfig,
    snapshot: Mutex<Option<Arc<CorpusSnapshot>>>,
    next_version: AtomicU64,
}

impl<S: TrajectoryStore> SimilarityEngine<S> {
    /// Create an engine with default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: MatchConfig::default(),
            snapshot: Mutex::new(None),
            next_version: AtomicU64::new(1),
        }
    }

    /// Create an engine with custom configuration.
    pub fn with_config(store: S, config: MatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(store)
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Find the corpus entities moving most like `query`.
    pub fn find_similar(&self, query: &[SpaceTimePoint]) -> Result<Vec<MatchResult>> {
        self.find_similar_with_cancel(query, &CancellationToken::new())
    }

    /// Like [`find_similar`](Self::find_similar), aborting once `cancel` fires.
    pub fn find_similar_with_cancel(
        &self,
        query: &[SpaceTimePoint],
        cancel: &CancellationToken,
    ) -> Result<Vec<MatchResult>> {
        validate_trajectory(query)?;

        let corpus = self.corpus()?;
        if cancel.is_cancelled() {
            debug!("[SimilarityEngine] Request cancelled after corpus fetch");
            return Err(TrajectoryError::Cancelled);
        }
        if corpus.entries.is_empty() {
            info!("[SimilarityEngine] Corpus is empty, nothing to match");
            return Ok(vec![]);
        }

        let start = Instant::now();
        let results =
            rank_trajectories_with_cancel(query, &corpus.entries, &self.config, cancel)?;

        info!(
            "[SimilarityEngine] Ranked {} trajectories against {}-point query in {:.1}ms (snapshot v{}), returning {}",
            corpus.entries.len(),
            query.len(),
            start.elapsed().as_secs_f64() * 1000.0,
            corpus.version,
            results.len()
        );

        Ok(results)
    }

    /// Rank the venues visited by the given entities.
    pub fn recommend_venues(&self, entity_ids: &[String]) -> Result<Vec<VenueAggregate>> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(entity_ids.len());
        let mut unique: Vec<String> = Vec::with_capacity(entity_ids.len());
        for id in entity_ids {
            if seen.insert(id.as_str()) {
                unique.push(id.clone());
            }
        }

        if unique.is_empty() {
            return Err(TrajectoryError::invalid_input(
                "at least one entity id is required",
            ));
        }

        let visits = self.store.fetch_visits(&unique)?;
        debug!(
            "[SimilarityEngine] Fetched {} visits for {} entities",
            visits.len(),
            unique.len()
        );

        let venues = aggregate_venues(&unique, &visits, self.config.max_venues)?;
        info!(
            "[SimilarityEngine] Recommending {} venues from {} entities",
            venues.len(),
            unique.len()
        );
        Ok(venues)
    }

    /// The corpus a new request should use.
    ///
    /// Without `snapshot_max_age_secs` every call fetches from the store.
    /// Otherwise a cached snapshot is returned while younger than the max age.
    /// The store is read without holding the snapshot lock, so concurrent
    /// refreshes may each fetch; the newest version wins.
    pub fn corpus(&self) -> Result<Arc<CorpusSnapshot>> {
        let max_age = match self.config.snapshot_max_age_secs {
            Some(secs) => Duration::from_secs(secs),
            None => return self.fetch_snapshot().map(Arc::new),
        };

        if let Some(snapshot) = self.lock_snapshot().as_ref() {
            if snapshot.is_fresh(max_age) {
                return Ok(Arc::clone(snapshot));
            }
            debug!(
                "[SimilarityEngine] Snapshot v{} expired, refreshing",
                snapshot.version
            );
        }

        let snapshot = self.fetch_snapshot()?;
        Ok(self.install_snapshot(snapshot))
    }

    /// Cache `snapshot` unless a newer version was installed meanwhile.
    /// Returns whichever snapshot is now cached.
    fn install_snapshot(&self, snapshot: CorpusSnapshot) -> Arc<CorpusSnapshot> {
        let mut cached = self.lock_snapshot();
        if let Some(current) = cached.as_ref() {
            if current.version > snapshot.version {
                debug!(
                    "[SimilarityEngine] Discarding snapshot v{}, v{} already installed",
                    snapshot.version, current.version
                );
                return Arc::clone(current);
            }
        }
        let snapshot = Arc::new(snapshot);
        *cached = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Drop the cached snapshot; the next request refetches.
    pub fn invalidate_snapshot(&self) {
        if self.lock_snapshot().take().is_some() {
            info!("[SimilarityEngine] Snapshot invalidated");
        }
    }

    fn fetch_snapshot(&self) -> Result<CorpusSnapshot> {
        let start = Instant::now();
        let mut entries = self.store.fetch_corpus()?;
        let fetched = entries.len();
        entries.retain(|e| e.points.len() >= self.config.min_corpus_points);

        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        info!(
            "[SimilarityEngine] Fetched corpus v{}: {} trajectories ({} below {} points dropped) in {:.1}ms",
            version,
            entries.len(),
            fetched - entries.len(),
            self.config.min_corpus_points,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(CorpusSnapshot {
            version,
            fetched_at: Instant::now(),
            entries,
        })
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, Option<Arc<CorpusSnapshot>>> {
        // A panic while holding the lock leaves a valid Option behind
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
