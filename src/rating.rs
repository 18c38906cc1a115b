// 🏆 Rating Engine - Fold resolved standings into posterior skill ratings
// The statistical update itself sits behind the RatingPrimitive trait

use crate::contest::Placement;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Starting mean for a participant never seen before.
pub const DEFAULT_RATING: f64 = 1500.0;

/// Starting uncertainty for a participant never seen before.
pub const DEFAULT_UNCERTAINTY: f64 = 350.0;

/// Uncertainty assumed for baseline rows that omit the column.
pub const DEFAULT_SEED_UNCERTAINTY: f64 = 500.0;

// ============================================================================
// CORE TYPES
// ============================================================================

/// A posterior skill distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub mean: f64,
    pub uncertainty: f64,
}

/// Per-contest parameters handed to the rating primitive.
#[derive(Debug, Clone, Copy)]
pub struct ContestRatingParams {
    /// Relative weight of the contest (default 1.0)
    pub weight: f64,

    /// Monotonic contest time: 10000*year + 100*month + day
    pub contest_time: i64,
}

/// One standing: a prior rating plus its 0-based rank range.
/// `lo == hi` for a clean finisher; non-finishers share a trailing band.
#[derive(Debug, Clone)]
pub struct RankedRating {
    pub rating: Rating,
    pub lo: usize,
    pub hi: usize,
}

/// Boundary to the external rating algorithm.
///
/// Input is one contest's rank-ranged standings plus weight and monotonic
/// time; output is the posterior rating per standing, positionally. The
/// pipeline never looks inside.
pub trait RatingPrimitive {
    fn round_update(&self, params: &ContestRatingParams, standings: &[RankedRating]) -> Vec<Rating>;
}

/// Encode a calendar date as a monotonic integer contest time.
pub fn contest_time(date: NaiveDate) -> i64 {
    10000 * date.year() as i64 + 100 * date.month() as i64 + date.day() as i64
}

// ============================================================================
// RANK RANGES
// ============================================================================

/// Build each entry's 0-based rank range from source-order placements.
///
/// Numeric place p maps to (p-1, p-1). A non-finisher spans from the count
/// of numeric places strictly preceding it up to the end of the field.
pub fn rank_ranges(placements: &[Placement]) -> Vec<(usize, usize)> {
    let field = placements.len();
    let mut finished_before = 0usize;
    placements
        .iter()
        .map(|p| match p {
            Placement::Finished(place) => {
                finished_before += 1;
                let rank = place.saturating_sub(1) as usize;
                (rank, rank)
            }
            Placement::NotFinished(_) => (finished_before, field.saturating_sub(1)),
        })
        .collect()
}

// ============================================================================
// DEFAULT PRIMITIVE - PAIRWISE GLICKO
// ============================================================================

/// Compact Glicko-style rating system over pairwise outcomes.
///
/// Each contest inflates a player's deviation by a fixed drift, compares the
/// player against every other standing (win/loss/tie from rank-range
/// overlap), and shrinks the deviation by the information gained. The
/// contest weight scales the mean step.
pub struct PairwiseGlicko {
    /// Deviation added before each contest (default: 35.0)
    pub drift: f64,

    /// Deviation ceiling after drift (default: 350.0)
    pub max_uncertainty: f64,

    /// Deviation floor after update (default: 30.0)
    pub min_uncertainty: f64,
}

const Q: f64 = std::f64::consts::LN_10 / 400.0;

impl PairwiseGlicko {
    pub fn new() -> Self {
        PairwiseGlicko {
            drift: 35.0,
            max_uncertainty: DEFAULT_UNCERTAINTY,
            min_uncertainty: 30.0,
        }
    }

    fn g(uncertainty: f64) -> f64 {
        let pi2 = std::f64::consts::PI * std::f64::consts::PI;
        1.0 / (1.0 + 3.0 * Q * Q * uncertainty * uncertainty / pi2).sqrt()
    }

    fn expected(mean: f64, other: &Rating) -> f64 {
        1.0 / (1.0 + 10f64.powf(-Self::g(other.uncertainty) * (mean - other.mean) / 400.0))
    }

    /// Pairwise outcome from rank ranges: ahead = win, behind = loss,
    /// overlapping ranges = tie.
    fn score(a: &RankedRating, b: &RankedRating) -> f64 {
        if a.hi < b.lo {
            1.0
        } else if a.lo > b.hi {
            0.0
        } else {
            0.5
        }
    }
}

impl RatingPrimitive for PairwiseGlicko {
    fn round_update(&self, params: &ContestRatingParams, standings: &[RankedRating]) -> Vec<Rating> {
        if standings.len() < 2 {
            return standings.iter().map(|s| s.rating).collect();
        }

        standings
            .iter()
            .enumerate()
            .map(|(i, me)| {
                let pre = Rating {
                    mean: me.rating.mean,
                    uncertainty: (me.rating.uncertainty.hypot(self.drift))
                        .min(self.max_uncertainty),
                };

                let mut d2_inv = 0.0;
                let mut delta = 0.0;
                for (j, other) in standings.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let g = Self::g(other.rating.uncertainty);
                    let e = Self::expected(pre.mean, &other.rating);
                    d2_inv += Q * Q * g * g * e * (1.0 - e);
                    delta += g * (Self::score(me, other) - e);
                }

                let denom = 1.0 / (pre.uncertainty * pre.uncertainty) + d2_inv;
                Rating {
                    mean: pre.mean + params.weight * (Q / denom) * delta,
                    uncertainty: (1.0 / denom).sqrt().max(self.min_uncertainty),
                }
            })
            .collect()
    }
}

impl Default for PairwiseGlicko {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// RATING ENGINE
// ============================================================================

/// A participant's state as the engine carries it between contests.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub rating: Rating,

    /// Contest time of the last update; 0 for baseline seeds so a seed
    /// never outranks a real update chronologically.
    pub last_update: i64,
}

/// Owns every participant's rating and applies contests in order.
/// The caller guarantees non-decreasing contest time across `fold` calls.
pub struct RatingEngine {
    players: BTreeMap<String, PlayerState>,
    primitive: Box<dyn RatingPrimitive>,
}

impl RatingEngine {
    pub fn new() -> Self {
        RatingEngine {
            players: BTreeMap::new(),
            primitive: Box::new(PairwiseGlicko::new()),
        }
    }

    pub fn with_primitive(primitive: Box<dyn RatingPrimitive>) -> Self {
        RatingEngine {
            players: BTreeMap::new(),
            primitive,
        }
    }

    /// Drop all participant state, keeping the installed primitive.
    pub fn reset(&mut self) {
        self.players.clear();
    }

    /// Initialize a participant from a previous-ranking baseline.
    pub fn seed(&mut self, canonical: &str, mean: f64, uncertainty: f64) {
        self.players.insert(
            canonical.to_string(),
            PlayerState {
                rating: Rating { mean, uncertainty },
                last_update: 0,
            },
        );
    }

    /// Fold one contest into rating state. Entries are (canonical name,
    /// placement) in source order; unknown names start at the defaults.
    pub fn fold(&mut self, params: &ContestRatingParams, entries: &[(String, Placement)]) {
        let placements: Vec<Placement> = entries.iter().map(|(_, p)| p.clone()).collect();
        let ranges = rank_ranges(&placements);

        let standings: Vec<RankedRating> = entries
            .iter()
            .zip(&ranges)
            .map(|((name, _), &(lo, hi))| {
                let state = self
                    .players
                    .entry(name.clone())
                    .or_insert_with(|| PlayerState {
                        rating: Rating {
                            mean: DEFAULT_RATING,
                            uncertainty: DEFAULT_UNCERTAINTY,
                        },
                        last_update: 0,
                    });
                RankedRating {
                    rating: state.rating,
                    lo,
                    hi,
                }
            })
            .collect();

        let updated = self.primitive.round_update(params, &standings);

        for ((name, _), rating) in entries.iter().zip(updated) {
            if let Some(state) = self.players.get_mut(name) {
                state.rating = rating;
                state.last_update = params.contest_time;
            }
        }
    }

    pub fn player(&self, canonical: &str) -> Option<&PlayerState> {
        self.players.get(canonical)
    }

    pub fn players(&self) -> &BTreeMap<String, PlayerState> {
        &self.players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

impl Default for RatingEngine {
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

    fn finished(place: u32) -> Placement {
        Placement::Finished(place)
    }

    fn dnf() -> Placement {
        Placement::NotFinished("Ab.".to_string())
    }

    #[test]
    fn test_contest_time_encoding() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(contest_time(d), 20240107);

        // Monotonic across arbitrary calendar gaps.
        let earlier = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert!(contest_time(earlier) < contest_time(d));
    }

    #[test]
    fn test_rank_ranges_clean_finish() {
        let ranges = rank_ranges(&[finished(1), finished(2), finished(3)]);
        assert_eq!(ranges, vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_rank_ranges_non_finisher_mid_field() {
        // Five entries, third one abandoned: two numeric places precede it,
        // so it ties from rank 2 down to the end of the field.
        let ranges = rank_ranges(&[finished(1), finished(2), dnf(), finished(3), finished(4)]);
        assert_eq!(ranges[2], (2, 4));
        assert_eq!(ranges[3], (2, 2));
    }

    #[test]
    fn test_rank_ranges_all_non_finishers_tie_for_last() {
        let ranges = rank_ranges(&[finished(1), finished(2), dnf(), dnf()]);
        assert_eq!(ranges[2], (2, 3));
        assert_eq!(ranges[3], (2, 3));
    }

    #[test]
    fn test_winner_gains_loser_drops() {
        let glicko = PairwiseGlicko::new();
        let params = ContestRatingParams {
            weight: 1.0,
            contest_time: 20240107,
        };
        let prior = Rating {
            mean: DEFAULT_RATING,
            uncertainty: DEFAULT_UNCERTAINTY,
        };
        let standings = vec![
            RankedRating { rating: prior, lo: 0, hi: 0 },
            RankedRating { rating: prior, lo: 1, hi: 1 },
        ];

        let updated = glicko.round_update(&params, &standings);
        assert!(updated[0].mean > DEFAULT_RATING);
        assert!(updated[1].mean < DEFAULT_RATING);
        assert!(updated[0].uncertainty < DEFAULT_UNCERTAINTY);
        // Symmetric field, symmetric movement.
        assert!((updated[0].mean - DEFAULT_RATING + updated[1].mean - DEFAULT_RATING).abs() < 1e-9);
    }

    #[test]
    fn test_tied_equal_players_do_not_move() {
        let glicko = PairwiseGlicko::new();
        let params = ContestRatingParams {
            weight: 1.0,
            contest_time: 20240107,
        };
        let prior = Rating {
            mean: DEFAULT_RATING,
            uncertainty: 100.0,
        };
        let standings = vec![
            RankedRating { rating: prior, lo: 2, hi: 3 },
            RankedRating { rating: prior, lo: 2, hi: 3 },
        ];

        let updated = glicko.round_update(&params, &standings);
        assert!((updated[0].mean - DEFAULT_RATING).abs() < 1e-9);
        assert!((updated[1].mean - DEFAULT_RATING).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weight_freezes_means() {
        let glicko = PairwiseGlicko::new();
        let params = ContestRatingParams {
            weight: 0.0,
            contest_time: 20240107,
        };
        let prior = Rating {
            mean: DEFAULT_RATING,
            uncertainty: DEFAULT_UNCERTAINTY,
        };
        let standings = vec![
            RankedRating { rating: prior, lo: 0, hi: 0 },
            RankedRating { rating: prior, lo: 1, hi: 1 },
        ];

        let updated = glicko.round_update(&params, &standings);
        assert_eq!(updated[0].mean, DEFAULT_RATING);
        assert_eq!(updated[1].mean, DEFAULT_RATING);
    }

    #[test]
    fn test_fold_creates_and_updates_players() {
        let mut engine = RatingEngine::new();
        let params = ContestRatingParams {
            weight: 1.0,
            contest_time: 20240107,
        };
        engine.fold(
            &params,
            &[
                ("Jean Dupont".to_string(), finished(1)),
                ("Marie Leroy".to_string(), finished(2)),
            ],
        );

        assert_eq!(engine.player_count(), 2);
        let winner = engine.player("Jean Dupont").unwrap();
        let loser = engine.player("Marie Leroy").unwrap();
        assert!(winner.rating.mean > loser.rating.mean);
        assert_eq!(winner.last_update, 20240107);
    }

    #[test]
    fn test_seed_is_exact_before_any_fold() {
        let mut engine = RatingEngine::new();
        engine.seed("jean dupont", 1500.0, 300.0);

        let state = engine.player("jean dupont").unwrap();
        assert_eq!(state.rating.mean, 1500.0);
        assert_eq!(state.rating.uncertainty, 300.0);
        assert_eq!(state.last_update, 0);
    }

    #[test]
    fn test_single_entry_round_is_identity() {
        let glicko = PairwiseGlicko::new();
        let params = ContestRatingParams {
            weight: 1.0,
            contest_time: 20240107,
        };
        let prior = Rating {
            mean: 1600.0,
            uncertainty: 120.0,
        };
        let standings = vec![RankedRating { rating: prior, lo: 0, hi: 0 }];
        let updated = glicko.round_update(&params, &standings);
        assert_eq!(updated[0], prior);
    }
}
