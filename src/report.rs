// 📊 Ranking Report - Read-only views over rating state and race history
// Plus the CSV ranking artifact and its round-trip baseline import

use crate::cache::RaceRecord;
use crate::contest::Placement;
use crate::rating::RatingEngine;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// ROW TYPES
// ============================================================================

/// One row of the exported ranking artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingRow {
    pub rank: usize,
    pub name: String,
    pub rating: f64,
    pub uncertainty: f64,
    pub races: usize,
}

/// Per-participant statistics derived from history and rating state.
#[derive(Debug, Clone)]
pub struct ParticipantStats {
    pub name: String,
    pub rating: f64,
    pub uncertainty: f64,
    pub races: usize,

    /// Best numeric finish across history (1-based). A non-finish counts as
    /// the field size for this statistic. None without any recorded race.
    pub best_finish: Option<u32>,
}

/// One row of a previous-ranking baseline file.
#[derive(Debug, Clone)]
pub struct BaselineRow {
    pub name: String,
    pub rating: f64,
    pub uncertainty: Option<f64>,
}

// ============================================================================
// DERIVED VIEWS
// ============================================================================

/// Races participated per canonical name, from the history log.
pub fn races_by_participant(history: &[RaceRecord]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for race in history {
        for entry in &race.entries {
            *counts.entry(entry.name.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// Sorted rankings, rating descending, restricted to participants with at
/// least `min_races` recorded races. Pure read: no mutation, no I/O.
pub fn rankings(engine: &RatingEngine, history: &[RaceRecord], min_races: usize) -> Vec<RankingRow> {
    let counts = races_by_participant(history);

    let mut rows: Vec<(String, f64, f64, usize)> = engine
        .players()
        .iter()
        .map(|(name, state)| {
            let races = counts.get(name).copied().unwrap_or(0);
            (name.clone(), state.rating.mean, state.rating.uncertainty, races)
        })
        .filter(|(_, _, _, races)| *races >= min_races)
        .collect();

    // Rating descending; name ascending keeps equal ratings deterministic.
    rows.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    rows.into_iter()
        .enumerate()
        .map(|(idx, (name, rating, uncertainty, races))| RankingRow {
            rank: idx + 1,
            name,
            rating,
            uncertainty,
            races,
        })
        .collect()
}

/// Statistics for one canonical participant, or None if unknown.
pub fn participant_stats(
    engine: &RatingEngine,
    history: &[RaceRecord],
    name: &str,
) -> Option<ParticipantStats> {
    let state = engine.player(name)?;

    let mut races = 0usize;
    let mut best_finish: Option<u32> = None;
    for race in history {
        let field = race.entries.len() as u32;
        for entry in &race.entries {
            if entry.name != name {
                continue;
            }
            races += 1;
            let finish = match &entry.place {
                Placement::Finished(place) => *place,
                Placement::NotFinished(_) => field,
            };
            best_finish = Some(best_finish.map_or(finish, |b| b.min(finish)));
        }
    }

    Some(ParticipantStats {
        name: name.to_string(),
        rating: state.rating.mean,
        uncertainty: state.rating.uncertainty,
        races,
        best_finish,
    })
}

// ============================================================================
// EXPORT / BASELINE IMPORT
// ============================================================================

/// Write the ranking artifact: rank,name,rating,uncertainty,races.
pub fn export_csv(rows: &[RankingRow], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create ranking file {}", path.display()))?;
    writer
        .write_record(["rank", "name", "rating", "uncertainty", "races"])
        .context("failed to write ranking header")?;
    for row in rows {
        writer
            .write_record([
                row.rank.to_string(),
                row.name.clone(),
                format!("{}", row.rating),
                format!("{}", row.uncertainty),
                row.races.to_string(),
            ])
            .context("failed to write ranking row")?;
    }
    writer.flush().context("failed to flush ranking file")?;
    Ok(())
}

/// Read a previous-ranking baseline: rows of (rank, name, rating[,
/// uncertainty]); extra columns and a header row are ignored.
pub fn load_baseline(path: &Path) -> Result<Vec<BaselineRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open baseline {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("malformed baseline {}", path.display()))?;
        let name = record.get(1).unwrap_or("").trim();
        let rating = record.get(2).unwrap_or("").trim().parse::<f64>();
        let (name, rating) = match (name, rating) {
            (n, Ok(r)) if !n.is_empty() => (n, r),
            // Header row or otherwise unusable line.
            _ => continue,
        };
        let uncertainty = record
            .get(3)
            .and_then(|u| u.trim().parse::<f64>().ok());
        rows.push(BaselineRow {
            name: name.to_string(),
            rating,
            uncertainty,
        });
    }
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================
