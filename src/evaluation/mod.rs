//! Recommendation Evaluation
//!
//! Scores the answers of a live news-recommendation contest against the log of
//! real user clicks.
//!
//! # Architecture
//!
//! ```text
//!   prediction log                          ground-truth log
//!        │                                        │
//!        ▼                                        ▼
//! ┌─────────────────┐                   ┌──────────────────┐
//! │   Evaluator     │                   │ GroundTruthFeed  │
//! │ (decode, tally) │                   │ (TSV, read-ahead)│
//! └────────┬────────┘                   └────────┬─────────┘
//!          │ check_prediction(candidate)         │ pull on advance
//!          ▼                                     ▼
//! ┌─────────────────┐   advance_to(t)   ┌──────────────────┐
//! │GroundTruthMatcher├─────────────────▶│  SlidingWindow   │
//! │ (policy, lookup)│                   │ (arena + index)  │
//! └────────┬────────┘                   └────────┬─────────┘
//!          │ mark / is_consumed                  │ forget on evict
//!          ▼                                     ▼
//!        ┌────────────────────────────────────────┐
//!        │           ConsumptionGuard             │
//!        └────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **Window bound**: every held event satisfies `ts >= cursor - window_size`
//! - **Single use**: a ground-truth event confirms at most one prediction
//! - **Eviction forgets**: an evicted event never confirms anything
//! - **Blacklist absolute**: blacklisted items are never confirmed

pub mod config;
pub mod consumption;
pub mod evaluator;
pub mod events;
pub mod feed;
pub mod matcher;
pub mod prediction;
pub mod stats;
pub mod timestamp;
pub mod window;

#[cfg(test)]
mod window_tests;

pub use config::{EvaluatorConfig, CONFIG_PATH_ENV};
pub use consumption::ConsumptionGuard;
pub use evaluator::{
    DomainResult, EvaluationContext, EvaluationError, EvaluationReport, Evaluator, LineCounters,
};
pub use events::{
    DomainId, EventId, GroundTruthEvent, ItemId, MatchKey, Millis, PredictionCandidate, UserId,
    MILLIS_PER_MIN, MILLIS_PER_SEC, UNKNOWN_USER,
};
pub use feed::{
    FeedCounters, FeedError, GroundTruthFeed, GroundTruthLayout, TsvGroundTruthFeed, VecFeed,
};
pub use matcher::{
    Blacklist, GroundTruthMatcher, MatchError, MatchPolicy, MatcherConfig, MatcherStats,
    OutOfOrderPolicy, UserMatchPolicy, DEFAULT_WINDOW_SIZE_MS,
};
pub use prediction::{
    PredictionHeader, PredictionParseError, PredictionRecord, DEFAULT_RECOMMENDATION_KEY,
    MAX_NUMBER_OF_RECOMMENDATIONS,
};
pub use stats::{
    DomainTallies, DomainTally, ResponseTimeHistogram, ResponseTimeStats, ResponseTimeSummary,
};
pub use timestamp::{parse_newsreel_timestamp, parse_timestamp_field, TimestampError};
pub use window::{AdvanceSummary, SlidingWindow, WindowCounters};
