// CX Ranking System - Core Library
// Incremental skill-rating pipeline over noisy contest result sheets

pub mod cache;
pub mod contest;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod rating;
pub mod report;

// Re-export commonly used types
pub use cache::{CacheState, CacheStore, HistoryEntry, RaceRecord};
pub use contest::{Contest, ContestEntry, Placement};
pub use error::LoadError;
pub use identity::{
    normalize, DecisionFn, IdentityResolver, MatchBand, MergeDecision, NamePair, StdinConfirm,
    TreatAsDistinct,
};
pub use pipeline::{BatchReport, RankingPipeline};
pub use rating::{
    contest_time, ContestRatingParams, PairwiseGlicko, PlayerState, RankedRating, Rating,
    RatingEngine, RatingPrimitive, DEFAULT_RATING, DEFAULT_SEED_UNCERTAINTY, DEFAULT_UNCERTAINTY,
};
pub use report::{BaselineRow, ParticipantStats, RankingRow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
