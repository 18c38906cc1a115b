// 🗄️ Persistence Layer - Four durable JSON stores, loaded and saved as a unit
// Writes are atomic (temp file + rename) so an aborted batch never leaves
// a half-written store behind.

use crate::contest::Placement;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const NAME_MAPPINGS_FILE: &str = "name_mappings.json";
pub const DIFFERENT_NAMES_FILE: &str = "different_names.json";
pub const PROCESSED_RACES_FILE: &str = "processed_races.json";
pub const RACE_HISTORY_FILE: &str = "race_history.json";

// ============================================================================
// PERSISTED SHAPES
// ============================================================================

/// One resolved row of a folded contest, kept for reporting only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub place: Placement,

    /// Canonical participant name
    pub name: String,

    pub club: String,
}

/// One folded contest in the append-only race history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceRecord {
    pub source_id: String,
    pub date: Option<NaiveDate>,
    pub entries: Vec<HistoryEntry>,
}

/// In-memory image of all four stores.
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    /// normalized name -> canonical name, alphabetically keyed
    pub mappings: BTreeMap<String, String>,

    /// name -> set of names confirmed distinct from it (symmetric)
    pub different: BTreeMap<String, BTreeSet<String>>,

    /// source-file identifiers already folded into ratings
    pub processed: BTreeSet<String>,

    /// append-only log of folded contests
    pub history: Vec<RaceRecord>,
}

// ============================================================================
// CACHE STORE
// ============================================================================

pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CacheStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load all four stores. A missing file yields an empty store; a corrupt
    /// file is logged and treated as empty rather than failing the run.
    pub fn load_all(&self) -> CacheState {
        CacheState {
            mappings: self.load_store(NAME_MAPPINGS_FILE),
            different: self.load_store(DIFFERENT_NAMES_FILE),
            processed: self.load_store(PROCESSED_RACES_FILE),
            history: self.load_store(RACE_HISTORY_FILE),
        }
    }

    fn load_store<T: DeserializeOwned + Default>(&self, file_name: &str) -> T {
        let path = self.dir.join(file_name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => return T::default(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    store = file_name,
                    error = %err,
                    "cache store unreadable, starting that store empty (prior decisions in it are lost)"
                );
                T::default()
            }
        }
    }

    /// Persist only the identity stores. Called right after a resolution
    /// adds a mapping or a confirmed-different pair, so a crash later in the
    /// batch cannot lose an already-confirmed decision.
    pub fn save_identity(
        &self,
        mappings: &BTreeMap<String, String>,
        different: &BTreeMap<String, BTreeSet<String>>,
    ) -> Result<()> {
        self.write_atomic(NAME_MAPPINGS_FILE, mappings)?;
        self.write_atomic(DIFFERENT_NAMES_FILE, different)?;
        Ok(())
    }

    /// Persist all four stores together at a batch boundary.
    pub fn save_all(&self, state: &CacheState) -> Result<()> {
        self.write_atomic(NAME_MAPPINGS_FILE, &state.mappings)?;
        self.write_atomic(DIFFERENT_NAMES_FILE, &state.different)?;
        self.write_atomic(PROCESSED_RACES_FILE, &state.processed)?;
        self.write_atomic(RACE_HISTORY_FILE, &state.history)?;
        Ok(())
    }

    /// Delete every store. The next run degrades to a full batch.
    pub fn clear(&self) -> Result<()> {
        for file_name in [
            NAME_MAPPINGS_FILE,
            DIFFERENT_NAMES_FILE,
            PROCESSED_RACES_FILE,
            RACE_HISTORY_FILE,
        ] {
            let path = self.dir.join(file_name);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("failed to delete cache store {}", path.display()))?;
            }
        }
        Ok(())
    }

    /// Serialize to a sibling temp file, then rename over the target.
    /// BTreeMap/BTreeSet keys give deterministic, diffable output.
    fn write_atomic<T: Serialize>(&self, file_name: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache dir {}", self.dir.display()))?;

        let path = self.dir.join(file_name);
        let tmp = self.dir.join(format!("{}.tmp", file_name));
        let json = serde_json::to_vec_pretty(value)
            .with_context(|| format!("failed to serialize cache store {}", file_name))?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> CacheState {
        let mut state = CacheState::default();
        state
            .mappings
            .insert("jean duppont".to_string(), "Jean Dupont".to_string());
        state
            .mappings
            .insert("jean dupont".to_string(), "Jean Dupont".to_string());
        state
            .different
            .entry("jean dupont".to_string())
            .or_default()
            .insert("jean dumont".to_string());
        state
            .different
            .entry("jean dumont".to_string())
            .or_default()
            .insert("jean dupont".to_string());
        state.processed.insert("2024-01-07_0.csv".to_string());
        state.history.push(RaceRecord {
            source_id: "2024-01-07_0.csv".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 7),
            entries: vec![HistoryEntry {
                place: Placement::Finished(1),
                name: "Jean Dupont".to_string(),
                club: "ClubA".to_string(),
            }],
        });
        state
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());

        let state = store.load_all();
        assert!(state.mappings.is_empty());
        assert!(state.different.is_empty());
        assert!(state.processed.is_empty());
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let state = sample_state();

        store.save_all(&state).unwrap();
        let reloaded = store.load_all();

        assert_eq!(reloaded.mappings, state.mappings);
        assert_eq!(reloaded.different, state.different);
        assert_eq!(reloaded.processed, state.processed);
        assert_eq!(reloaded.history.len(), 1);
        assert_eq!(reloaded.history[0].source_id, "2024-01-07_0.csv");
        assert_eq!(reloaded.history[0].entries[0].name, "Jean Dupont");
    }

    #[test]
    fn test_corrupt_store_recovers_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.save_all(&sample_state()).unwrap();

        std::fs::write(dir.path().join(NAME_MAPPINGS_FILE), b"{not json").unwrap();

        let state = store.load_all();
        assert!(state.mappings.is_empty());
        // Other stores are unaffected.
        assert_eq!(state.processed.len(), 1);
    }

    #[test]
    fn test_mapping_keys_sorted_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.save_all(&sample_state()).unwrap();

        let text = std::fs::read_to_string(dir.path().join(NAME_MAPPINGS_FILE)).unwrap();
        let dupont = text.find("jean dupont").unwrap();
        let duppont = text.find("jean duppont").unwrap();
        assert!(dupont < duppont);
    }

    #[test]
    fn test_clear_removes_all_stores() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.save_all(&sample_state()).unwrap();

        store.clear().unwrap();
        for file_name in [
            NAME_MAPPINGS_FILE,
            DIFFERENT_NAMES_FILE,
            PROCESSED_RACES_FILE,
            RACE_HISTORY_FILE,
        ] {
            assert!(!dir.path().join(file_name).exists());
        }

        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_no_temp_files_left_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.save_all(&sample_state()).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_save_identity_only_touches_identity_stores() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let state = sample_state();

        store.save_identity(&state.mappings, &state.different).unwrap();
        assert!(dir.path().join(NAME_MAPPINGS_FILE).exists());
        assert!(dir.path().join(DIFFERENT_NAMES_FILE).exists());
        assert!(!dir.path().join(PROCESSED_RACES_FILE).exists());
        assert!(!dir.path().join(RACE_HISTORY_FILE).exists());
    }
}
