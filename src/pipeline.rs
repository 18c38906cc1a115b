// 🚴 Ranking Pipeline - Incremental, chronological batch orchestration
// Enumerate unprocessed contest files, resolve identities, fold in date
// order, snapshot all caches at the batch boundary.

use crate::cache::{CacheState, CacheStore, HistoryEntry, RaceRecord};
use crate::contest::{self, Contest};
use crate::identity::{IdentityResolver, MergeDecision, TreatAsDistinct};
use crate::rating::{
    contest_time, ContestRatingParams, RatingEngine, RatingPrimitive, DEFAULT_SEED_UNCERTAINTY,
};
use crate::report::{self, ParticipantStats, RankingRow};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// BATCH REPORT
// ============================================================================

/// What happened to each file of one ranking run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Folded into rating state this run
    pub folded: Vec<String>,

    /// Already in the processed registry, skipped
    pub skipped: Vec<String>,

    /// Fewer than two usable entries, skipped with a warning
    pub short: Vec<String>,

    /// Unreadable or undecodable, left out of the registry for retry
    pub failed: Vec<(String, String)>,

    /// Participants known after the batch
    pub participants: usize,

    /// Total contests in the history after the batch
    pub contests_total: usize,
}

impl BatchReport {
    pub fn summary(&self) -> String {
        format!(
            "{} folded, {} skipped, {} too short, {} failed | {} participants, {} contests",
            self.folded.len(),
            self.skipped.len(),
            self.short.len(),
            self.failed.len(),
            self.participants,
            self.contests_total
        )
    }
}

// ============================================================================
// RANKING PIPELINE
// ============================================================================

pub struct RankingPipeline {
    resolver: IdentityResolver,
    engine: RatingEngine,
    store: CacheStore,
    processed: BTreeSet<String>,
    history: Vec<RaceRecord>,
    decision: Box<dyn MergeDecision>,

    /// Weight passed to the rating primitive for every contest (default 1.0)
    pub contest_weight: f64,

    /// True once a previous-ranking baseline was seeded; only then does the
    /// processed registry gate files out of the batch.
    incremental: bool,
}

impl RankingPipeline {
    /// Open a pipeline over a cache directory, loading all persisted state.
    pub fn open(cache_dir: impl AsRef<Path>) -> Self {
        let store = CacheStore::new(cache_dir.as_ref());
        let state = store.load_all();
        RankingPipeline {
            resolver: IdentityResolver::from_cache(state.mappings, state.different),
            engine: RatingEngine::new(),
            store,
            processed: state.processed,
            history: state.history,
            decision: Box::new(TreatAsDistinct),
            contest_weight: 1.0,
            incremental: false,
        }
    }

    /// Replace the ambiguity decision port (attended vs unattended runs).
    pub fn with_decision(mut self, decision: Box<dyn MergeDecision>) -> Self {
        self.decision = decision;
        self
    }

    /// Replace the rating primitive.
    pub fn with_primitive(mut self, primitive: Box<dyn RatingPrimitive>) -> Self {
        self.engine = RatingEngine::with_primitive(primitive);
        self
    }

    /// Seed rating state from a previous-ranking file and switch the run to
    /// incremental mode. Baseline names go through the resolver, so a known
    /// variant spelling seeds its canonical participant. Seeds carry update
    /// time 0 and the default uncertainty when the column is absent.
    pub fn seed_baseline(&mut self, path: &Path) -> Result<usize> {
        let rows = report::load_baseline(path)?;
        for row in &rows {
            let canonical = self.resolver.resolve(&row.name, self.decision.as_mut());
            if self.resolver.take_dirty() {
                self.store
                    .save_identity(self.resolver.mappings(), &self.resolver.different_as_map())?;
            }
            self.engine.seed(
                &canonical,
                row.rating,
                row.uncertainty.unwrap_or(DEFAULT_SEED_UNCERTAINTY),
            );
        }
        self.incremental = true;
        info!(seeded = rows.len(), baseline = %path.display(), "seeded baseline ratings");
        Ok(rows.len())
    }

    /// Process every unprocessed contest file under `folder` in
    /// chronological order, then snapshot all four caches.
    pub fn run(&mut self, folder: &Path) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        // Without a baseline there is no prior rating state to be
        // incremental against: rebuild registry, history, and ratings from
        // scratch so each registered contest is folded exactly once.
        if !self.incremental {
            self.processed.clear();
            self.history.clear();
            self.engine.reset();
        }

        let mut file_names: Vec<String> = std::fs::read_dir(folder)
            .with_context(|| format!("failed to read contest folder {}", folder.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        file_names.sort();

        let mut batch: Vec<Contest> = Vec::new();
        for file_name in file_names {
            if self.incremental && self.processed.contains(&file_name) {
                report.skipped.push(file_name);
                continue;
            }
            match contest::load(&folder.join(&file_name)) {
                Ok(contest) if contest.entries.len() < 2 => {
                    warn!(source = %file_name, entries = contest.entries.len(),
                        "contest too short to rate, skipping");
                    report.short.push(file_name);
                }
                Ok(contest) => batch.push(contest),
                Err(err) => {
                    warn!(source = %file_name, error = %err, "failed to load contest, skipping");
                    report.failed.push((file_name, err.to_string()));
                }
            }
        }

        // Files without a parsable date fall back to the batch minimum;
        // the stable sort keeps file order within equal dates.
        let fallback_date = batch
            .iter()
            .filter_map(|c| c.date)
            .min()
            // No dated file in the whole batch: the epoch is as good a
            // shared sentinel as any.
            .unwrap_or_default();
        batch.sort_by_key(|c| contest_time(c.date.unwrap_or(fallback_date)));

        for contest in batch {
            self.fold_contest(&contest, fallback_date)?;
            report.folded.push(contest.source_id);
        }

        self.store.save_all(&CacheState {
            mappings: self.resolver.mappings().clone(),
            different: self.resolver.different_as_map(),
            processed: self.processed.clone(),
            history: self.history.clone(),
        })?;

        report.participants = self.engine.player_count();
        report.contests_total = self.history.len();
        info!(summary = %report.summary(), "batch complete");
        Ok(report)
    }

    fn fold_contest(&mut self, contest: &Contest, fallback_date: NaiveDate) -> Result<()> {
        let mut resolved = Vec::with_capacity(contest.entries.len());
        let mut history_entries = Vec::with_capacity(contest.entries.len());
        for entry in &contest.entries {
            let canonical = self.resolver.resolve(&entry.name, self.decision.as_mut());
            // Identity decisions persist immediately: a crash later in the
            // batch must not lose a confirmed mapping or rejection.
            if self.resolver.take_dirty() {
                self.store
                    .save_identity(self.resolver.mappings(), &self.resolver.different_as_map())?;
            }
            history_entries.push(HistoryEntry {
                place: entry.placement.clone(),
                name: canonical.clone(),
                club: entry.club.clone(),
            });
            resolved.push((canonical, entry.placement.clone()));
        }

        let date = contest.date.unwrap_or(fallback_date);
        let params = ContestRatingParams {
            weight: self.contest_weight,
            contest_time: contest_time(date),
        };
        self.engine.fold(&params, &resolved);

        self.history.push(RaceRecord {
            source_id: contest.source_id.clone(),
            date: contest.date,
            entries: history_entries,
        });
        self.processed.insert(contest.source_id.clone());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read-only views
    // ------------------------------------------------------------------

    pub fn rankings(&self, min_races: usize) -> Vec<RankingRow> {
        report::rankings(&self.engine, &self.history, min_races)
    }

    pub fn participant_stats(&self, name: &str) -> Option<ParticipantStats> {
        report::participant_stats(&self.engine, &self.history, name)
    }

    /// Export the ranking artifact, re-importable as a baseline.
    pub fn export_rankings(&self, path: &Path, min_races: usize) -> Result<()> {
        report::export_csv(&self.rankings(min_races), path)
    }

    /// Delete all four cache stores and reset in-memory state. Rating state
    /// resets with them, keeping the registry and ratings consistent.
    pub fn clear_cache(&mut self) -> Result<()> {
        self.store.clear()?;
        self.resolver = IdentityResolver::new();
        self.engine.reset();
        self.processed.clear();
        self.history.clear();
        self.incremental = false;
        Ok(())
    }

    pub fn engine(&self) -> &RatingEngine {
        &self.engine
    }

    pub fn history(&self) -> &[RaceRecord] {
        &self.history
    }
}

// ============================================================================
// TESTS
// ============================================================================
