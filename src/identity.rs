// 🧩 Identity Resolver - Map noisy name strings to canonical participants
// Three outcomes per candidate pair: Auto-merge, Confirm, Distinct

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Reduce a raw name to its comparison form:
/// lowercase, accents folded to base letters, anything outside
/// letters/digits/space dropped, internal whitespace collapsed.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        match fold_accent(c) {
            Some(base) => folded.push_str(base),
            None => {
                if c.is_alphanumeric() || c.is_whitespace() {
                    folded.push(c);
                }
            }
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fixed accent table for the characters seen in source result sheets.
/// Returns None for characters that need no folding.
fn fold_accent(c: char) -> Option<&'static str> {
    let base = match c {
        'à' | 'â' | 'ä' | 'á' | 'ã' | 'å' => "a",
        'é' | 'è' | 'ê' | 'ë' => "e",
        'î' | 'ï' | 'í' | 'ì' => "i",
        'ô' | 'ö' | 'ó' | 'ò' | 'õ' => "o",
        'ù' | 'û' | 'ü' | 'ú' => "u",
        'ÿ' | 'ý' => "y",
        'ç' => "c",
        'ñ' => "n",
        'œ' => "oe",
        'æ' => "ae",
        _ => return None,
    };
    Some(base)
}

// ============================================================================
// DECISION PORT
// ============================================================================

/// Decision port for the ambiguous similarity band.
///
/// The resolver never talks to a terminal directly; attended and unattended
/// runs plug in different implementations without touching core logic.
pub trait MergeDecision {
    /// Are `candidate_a` and `candidate_b` the same person?
    fn decide(&mut self, candidate_a: &str, candidate_b: &str) -> bool;
}

/// Default unattended policy: ambiguous pairs are kept distinct.
pub struct TreatAsDistinct;

impl MergeDecision for TreatAsDistinct {
    fn decide(&mut self, _candidate_a: &str, _candidate_b: &str) -> bool {
        false
    }
}

/// Attended policy: yes/no loop on stdin.
pub struct StdinConfirm;

impl MergeDecision for StdinConfirm {
    fn decide(&mut self, candidate_a: &str, candidate_b: &str) -> bool {
        loop {
            println!(
                "Are '{}' and '{}' the same person? yes/no: ",
                candidate_a, candidate_b
            );
            let mut input = String::new();
            if std::io::stdin().read_line(&mut input).is_err() {
                // stdin closed: fall back to the unattended default
                return false;
            }
            match input.trim().to_lowercase().as_str() {
                "yes" | "y" => return true,
                "no" | "n" => return false,
                _ => continue,
            }
        }
    }
}

/// Closure adapter, mostly useful for tests and embedding.
pub struct DecisionFn<F>(pub F);

impl<F: FnMut(&str, &str) -> bool> MergeDecision for DecisionFn<F> {
    fn decide(&mut self, candidate_a: &str, candidate_b: &str) -> bool {
        (self.0)(candidate_a, candidate_b)
    }
}

// ============================================================================
// CONFIRMED-DIFFERENT PAIR
// ============================================================================

/// Unordered pair of normalized names confirmed to be distinct people.
/// Canonically ordered on construction so (a,b) and (b,a) compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NamePair {
    first: String,
    second: String,
}

impl NamePair {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            NamePair {
                first: a.to_string(),
                second: b.to_string(),
            }
        } else {
            NamePair {
                first: b.to_string(),
                second: a.to_string(),
            }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }
}

// ============================================================================
// MATCH BAND
// ============================================================================

/// Where a similarity score lands relative to the two thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBand {
    /// score >= auto-merge threshold: merge without asking
    AutoMerge,
    /// confirm threshold <= score < auto-merge threshold: ask the decision port
    Confirm,
    /// score < confirm threshold: different people
    Distinct,
}

// ============================================================================
// IDENTITY RESOLVER
// ============================================================================

pub struct IdentityResolver {
    /// normalized name -> canonical name (grows monotonically)
    mappings: BTreeMap<String, String>,

    /// normalized canonical form -> canonical display name
    canonicals: BTreeMap<String, String>,

    /// pairs of normalized names confirmed distinct
    different: BTreeSet<NamePair>,

    /// Similarity at or above this merges without confirmation (default: 0.93)
    pub auto_merge_threshold: f64,

    /// Similarity at or above this asks the decision port (default: 0.85)
    pub confirm_threshold: f64,

    /// Set whenever a resolution adds a mapping or a different-pair;
    /// the pipeline persists the identity stores and clears it.
    dirty: bool,
}

impl IdentityResolver {
    pub fn new() -> Self {
        IdentityResolver {
            mappings: BTreeMap::new(),
            canonicals: BTreeMap::new(),
            different: BTreeSet::new(),
            auto_merge_threshold: 0.93,
            confirm_threshold: 0.85,
            dirty: false,
        }
    }

    /// Rebuild a resolver from persisted cache state.
    pub fn from_cache(
        mappings: BTreeMap<String, String>,
        different: BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        let mut resolver = IdentityResolver::new();
        for (norm, canonical) in &mappings {
            // Symbol-only canonicals normalize to nothing and never take
            // part in similarity scoring.
            let canon_norm = normalize(canonical);
            if !canon_norm.is_empty() {
                resolver.canonicals.insert(canon_norm, canonical.clone());
            }
            resolver.mappings.insert(norm.clone(), canonical.clone());
        }
        for (name, others) in &different {
            for other in others {
                resolver.different.insert(NamePair::new(name, other));
            }
        }
        resolver
    }

    /// Resolve a raw name string to a canonical participant name.
    ///
    /// Exact normalized matches short-circuit without any similarity
    /// computation. Otherwise every known canonical name is scored and the
    /// best candidates are walked in descending order through the threshold
    /// bands. A genuinely new identity becomes its own canonical name.
    pub fn resolve(&mut self, raw: &str, decision: &mut dyn MergeDecision) -> String {
        let norm = normalize(raw);
        if norm.is_empty() {
            // Nothing left to compare on. The trimmed spelling stands for
            // itself, keyed verbatim so the persisted mapping still covers
            // every name that reaches the history.
            let canonical = raw.trim().to_string();
            if !self.mappings.contains_key(&canonical) {
                self.mappings.insert(canonical.clone(), canonical.clone());
                self.dirty = true;
            }
            return canonical;
        }

        if let Some(canonical) = self.mappings.get(&norm) {
            return canonical.clone();
        }

        // Score against every known canonical, skipping confirmed-different
        // pairs. Sorted by descending score, then name, for determinism.
        let mut scored: Vec<(f64, String, String)> = self
            .canonicals
            .iter()
            .filter(|(canon_norm, _)| !self.different.contains(&NamePair::new(&norm, canon_norm)))
            .map(|(canon_norm, canonical)| {
                (
                    strsim::jaro_winkler(&norm, canon_norm),
                    canon_norm.clone(),
                    canonical.clone(),
                )
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });

        for (score, canon_norm, canonical) in scored {
            match self.band(score) {
                MatchBand::AutoMerge => {
                    debug!(raw, canonical = %canonical, score, "auto-merged name");
                    self.mappings.insert(norm, canonical.clone());
                    self.dirty = true;
                    return canonical;
                }
                MatchBand::Confirm => {
                    if decision.decide(raw, &canonical) {
                        debug!(raw, canonical = %canonical, score, "confirmed merge");
                        self.mappings.insert(norm, canonical.clone());
                        self.dirty = true;
                        return canonical;
                    }
                    // Remember the rejection so this pair is never asked again.
                    self.different.insert(NamePair::new(&norm, &canon_norm));
                    self.dirty = true;
                }
                MatchBand::Distinct => break,
            }
        }

        // New identity: the trimmed raw spelling becomes the canonical name.
        let canonical = raw.trim().to_string();
        debug!(canonical = %canonical, "registered new participant");
        self.canonicals.insert(norm.clone(), canonical.clone());
        self.mappings.insert(norm, canonical.clone());
        self.dirty = true;
        canonical
    }

    /// Classify a similarity score into its threshold band.
    pub fn band(&self, score: f64) -> MatchBand {
        if score >= self.auto_merge_threshold {
            MatchBand::AutoMerge
        } else if score >= self.confirm_threshold {
            MatchBand::Confirm
        } else {
            MatchBand::Distinct
        }
    }

    /// Take-and-clear the dirty flag (set by resolutions that changed state).
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn mappings(&self) -> &BTreeMap<String, String> {
        &self.mappings
    }

    /// Confirmed-different pairs as a symmetric name -> {others} map,
    /// the shape the different-names store persists.
    pub fn different_as_map(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for pair in &self.different {
            map.entry(pair.first.clone())
                .or_default()
                .insert(pair.second.clone());
            map.entry(pair.second.clone())
                .or_default()
                .insert(pair.first.clone());
        }
        map
    }

    pub fn canonical_count(&self) -> usize {
        self.canonicals.len()
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Decision port that fails the test if it is ever consulted.
    struct NeverAsked;
    impl MergeDecision for NeverAsked {
        fn decide(&mut self, a: &str, b: &str) -> bool {
            panic!("unexpected confirmation prompt for '{}' / '{}'", a, b);
        }
    }

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("  Jean   DUPONT "), "jean dupont");
        assert_eq!(normalize("Chloé Lefèvre"), "chloe lefevre");
        assert_eq!(normalize("O'Brien, Pat"), "obrien pat");
    }

    #[test]
    fn test_normalize_idempotent() {
        for raw in [
            "Jean Dupont",
            "  ÉLODIE   Muñoz  ",
            "Jean-Pierre Cœur",
            "A.B. 42",
            "",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_band_partition() {
        let resolver = IdentityResolver::new();
        assert_eq!(resolver.band(0.93), MatchBand::AutoMerge);
        assert_eq!(resolver.band(0.9299), MatchBand::Confirm);
        assert_eq!(resolver.band(0.85), MatchBand::Confirm);
        assert_eq!(resolver.band(0.8499), MatchBand::Distinct);
        assert_eq!(resolver.band(0.0), MatchBand::Distinct);
        assert_eq!(resolver.band(1.0), MatchBand::AutoMerge);
    }

    #[test]
    fn test_auto_merge_close_spelling() {
        let mut resolver = IdentityResolver::new();
        let first = resolver.resolve("Jean Dupont", &mut NeverAsked);
        assert_eq!(first, "Jean Dupont");

        // One doubled letter: well above the auto-merge threshold.
        let second = resolver.resolve("Jean Duppont", &mut NeverAsked);
        assert_eq!(second, "Jean Dupont");
        assert_eq!(resolver.canonical_count(), 1);
    }

    #[test]
    fn test_distinct_names_no_prompt() {
        let mut resolver = IdentityResolver::new();
        resolver.resolve("Jean Dupont", &mut NeverAsked);
        let other = resolver.resolve("Marie Leroy", &mut NeverAsked);
        assert_eq!(other, "Marie Leroy");
        assert_eq!(resolver.canonical_count(), 2);
    }

    #[test]
    fn test_same_raw_name_resolves_once() {
        let mut resolver = IdentityResolver::new();
        // Widen the confirm band so any repeat comparison would prompt.
        resolver.confirm_threshold = 0.0;
        resolver.auto_merge_threshold = 1.01;

        let mut calls = 0;
        let mut count_calls = DecisionFn(|_: &str, _: &str| {
            calls += 1;
            false
        });
        let a = resolver.resolve("Jean Dupont", &mut count_calls);
        let b = resolver.resolve("Jean Dupont", &mut count_calls);
        assert_eq!(a, b);
        // Second resolution short-circuits on the exact mapping.
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_confirm_band_accept_and_reject() {
        let mut resolver = IdentityResolver::new();
        // Force everything non-identical into the confirm band.
        resolver.auto_merge_threshold = 1.01;
        resolver.confirm_threshold = 0.5;

        resolver.resolve("Jean Dupont", &mut TreatAsDistinct);

        // Accepted: merges into the existing canonical.
        let merged = resolver.resolve("Jean Dupond", &mut DecisionFn(|_: &str, _: &str| true));
        assert_eq!(merged, "Jean Dupont");

        // Rejected: becomes its own canonical and records the pair.
        let kept = resolver.resolve("Jean Dumont", &mut DecisionFn(|_: &str, _: &str| false));
        assert_eq!(kept, "Jean Dumont");
        assert!(resolver
            .different_as_map()
            .get("jean dumont")
            .map(|s| s.contains("jean dupont"))
            .unwrap_or(false));
    }

    #[test]
    fn test_different_pair_symmetric_across_reload() {
        let mut resolver = IdentityResolver::new();
        resolver.auto_merge_threshold = 1.01;
        resolver.confirm_threshold = 0.5;

        resolver.resolve("Jean Dupont", &mut TreatAsDistinct);
        resolver.resolve("Jean Dumont", &mut DecisionFn(|_: &str, _: &str| false));

        // Reload from the persisted shapes, as a fresh run would.
        let mut reloaded =
            IdentityResolver::from_cache(resolver.mappings().clone(), resolver.different_as_map());
        reloaded.auto_merge_threshold = 1.01;
        reloaded.confirm_threshold = 0.5;

        // Resolving either spelling again must not re-prompt.
        let a = reloaded.resolve("Jean Dumont", &mut NeverAsked);
        let b = reloaded.resolve("Jean Dupont", &mut NeverAsked);
        assert_eq!(a, "Jean Dumont");
        assert_eq!(b, "Jean Dupont");
    }

    #[test]
    fn test_unattended_default_treats_ambiguous_as_distinct() {
        let mut resolver = IdentityResolver::new();
        resolver.auto_merge_threshold = 1.01;
        resolver.confirm_threshold = 0.5;

        resolver.resolve("Jean Dupont", &mut TreatAsDistinct);
        let kept = resolver.resolve("Jean Dupond", &mut TreatAsDistinct);
        assert_eq!(kept, "Jean Dupond");
        assert_eq!(resolver.canonical_count(), 2);
    }

    #[test]
    fn test_symbol_only_name_registered_in_mapping() {
        let mut resolver = IdentityResolver::new();
        let canonical = resolver.resolve(" ??? ", &mut NeverAsked);
        assert_eq!(canonical, "???");
        // Recorded in the persisted mapping, keyed by its own spelling.
        assert_eq!(resolver.mappings().get("???"), Some(&"???".to_string()));
        assert!(resolver.take_dirty());

        // Repeat resolutions reuse the entry without dirtying state.
        assert_eq!(resolver.resolve("???", &mut NeverAsked), "???");
        assert!(!resolver.take_dirty());

        // Reloading keeps the entry and never scores against it.
        let mut reloaded =
            IdentityResolver::from_cache(resolver.mappings().clone(), resolver.different_as_map());
        assert_eq!(reloaded.resolve("???", &mut NeverAsked), "???");
        assert_eq!(reloaded.resolve("Jean Dupont", &mut NeverAsked), "Jean Dupont");
    }

    #[test]
    fn test_name_pair_unordered() {
        assert_eq!(NamePair::new("b", "a"), NamePair::new("a", "b"));
        let mut set = BTreeSet::new();
        set.insert(NamePair::new("jean dupont", "jean dumont"));
        assert!(set.contains(&NamePair::new("jean dumont", "jean dupont")));
    }

    #[test]
    fn test_dirty_flag_lifecycle() {
        let mut resolver = IdentityResolver::new();
        assert!(!resolver.take_dirty());

        resolver.resolve("Jean Dupont", &mut TreatAsDistinct);
        assert!(resolver.take_dirty());
        assert!(!resolver.take_dirty());

        // Exact repeat changes nothing.
        resolver.resolve("Jean Dupont", &mut TreatAsDistinct);
        assert!(!resolver.take_dirty());
    }
}
