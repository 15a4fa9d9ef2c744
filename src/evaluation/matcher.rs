//! Ground-Truth Matcher
//!
//! Public entry point of the evaluation core. Given a prediction candidate it
//! advances the sliding window to the candidate's timestamp and looks for an
//! unconsumed ground-truth event with the same domain and item (and user, as
//! the [`MatchPolicy`] decides). A found event is consumed so it can never
//! confirm a second prediction.
//!
//! "No match" is an ordinary `Ok(false)`. The error channel only carries I/O
//! failures of the ground-truth log and, under [`OutOfOrderPolicy::Reject`],
//! candidates that go back in time.

use crate::evaluation::consumption::ConsumptionGuard;
use crate::evaluation::events::{
    EventId, GroundTruthEvent, ItemId, Millis, PredictionCandidate, MILLIS_PER_MIN,
};
use crate::evaluation::feed::{
    FeedCounters, FeedError, GroundTruthFeed, GroundTruthLayout, TsvGroundTruthFeed,
};
use crate::evaluation::window::{SlidingWindow, WindowCounters};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Items that can never confirm a prediction. Owned by the caller.
pub type Blacklist = HashSet<ItemId>;

/// Default window: five minutes.
pub const DEFAULT_WINDOW_SIZE_MS: Millis = 5 * MILLIS_PER_MIN;

// =============================================================================
// POLICIES
// =============================================================================

/// Predicate deciding whether a ground-truth event confirms a candidate that
/// already agrees on domain and item.
pub trait MatchPolicy {
    fn accepts(&self, candidate: &PredictionCandidate, event: &GroundTruthEvent) -> bool;

    fn name(&self) -> &str {
        "custom"
    }
}

/// Built-in user matching rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserMatchPolicy {
    /// Known users must match; an unknown user never disqualifies.
    Lenient,
    /// Domain and item suffice.
    IgnoreUser,
    /// Users must match; an unknown user never matches.
    Strict,
}

impl Default for UserMatchPolicy {
    fn default() -> Self {
        Self::Lenient
    }
}

impl MatchPolicy for UserMatchPolicy {
    fn accepts(&self, candidate: &PredictionCandidate, event: &GroundTruthEvent) -> bool {
        match self {
            Self::Lenient => !candidate.has_known_user() || candidate.user_id == event.user_id,
            Self::IgnoreUser => true,
            Self::Strict => candidate.has_known_user() && candidate.user_id == event.user_id,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Lenient => "lenient",
            Self::IgnoreUser => "ignore_user",
            Self::Strict => "strict",
        }
    }
}

/// Action when a candidate's timestamp is behind an earlier candidate's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfOrderPolicy {
    /// Keep the cursor where it is and search what the window still holds,
    /// restricted to the candidate's own bounds. Evicted events stay lost.
    Tolerate,
    /// Fail the check with `MatchError::OutOfOrder`.
    Reject,
}

impl Default for OutOfOrderPolicy {
    fn default() -> Self {
        Self::Tolerate
    }
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// How far back (ms) a ground-truth event may lie before the prediction.
    pub window_size_ms: Millis,
    /// How far ahead (ms) of the prediction events are pulled and eligible.
    pub lookahead_ms: Millis,
    pub user_match: UserMatchPolicy,
    pub out_of_order: OutOfOrderPolicy,
    pub layout: GroundTruthLayout,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            window_size_ms: DEFAULT_WINDOW_SIZE_MS,
            lookahead_ms: 0,
            user_match: UserMatchPolicy::default(),
            out_of_order: OutOfOrderPolicy::default(),
            layout: GroundTruthLayout::default(),
        }
    }
}

impl MatcherConfig {
    pub fn with_window(window_size_ms: Millis) -> Self {
        Self {
            window_size_ms,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.window_size_ms <= 0 {
            return Err(MatchError::InvalidConfig {
                message: format!("window_size_ms must be positive, got {}", self.window_size_ms),
            });
        }
        if self.lookahead_ms < 0 {
            return Err(MatchError::InvalidConfig {
                message: format!("lookahead_ms must not be negative, got {}", self.lookahead_ms),
            });
        }
        Ok(())
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug)]
pub enum MatchError {
    /// Ground-truth log could not be opened or read.
    Feed(FeedError),
    /// Candidate went back in time under `OutOfOrderPolicy::Reject`.
    OutOfOrder { timestamp: Millis, previous: Millis },
    InvalidConfig { message: String },
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feed(e) => write!(f, "{}", e),
            Self::OutOfOrder {
                timestamp,
                previous,
            } => write!(
                f,
                "prediction at {} is older than a previous prediction at {}",
                timestamp, previous
            ),
            Self::InvalidConfig { message } => write!(f, "invalid matcher config: {}", message),
        }
    }
}

impl std::error::Error for MatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Feed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FeedError> for MatchError {
    fn from(e: FeedError) -> Self {
        Self::Feed(e)
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Snapshot of matcher activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherStats {
    pub checks: u64,
    pub confirmed: u64,
    pub unmatched: u64,
    pub blacklisted: u64,
    pub out_of_order: u64,
    /// Consumed events still held by the window.
    pub consumed_in_window: usize,
    pub events_in_window: usize,
    pub window: WindowCounters,
    pub feed: FeedCounters,
}

#[derive(Debug, Clone, Copy, Default)]
struct CheckCounters {
    checks: u64,
    confirmed: u64,
    unmatched: u64,
    blacklisted: u64,
    out_of_order: u64,
}

// =============================================================================
// MATCHER
// =============================================================================

pub struct GroundTruthMatcher<F: GroundTruthFeed = TsvGroundTruthFeed> {
    window: SlidingWindow<F>,
    guard: ConsumptionGuard,
    policy: Box<dyn MatchPolicy>,
    out_of_order: OutOfOrderPolicy,
    counters: CheckCounters,
}

impl GroundTruthMatcher<TsvGroundTruthFeed> {
    /// Open the ground-truth log at `path` with a window of `window_size_ms`.
    pub fn initialize(path: impl AsRef<Path>, window_size_ms: Millis) -> Result<Self, MatchError> {
        Self::initialize_with(path, MatcherConfig::with_window(window_size_ms))
    }

    pub fn initialize_with(
        path: impl AsRef<Path>,
        config: MatcherConfig,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        let feed = TsvGroundTruthFeed::open(path, config.layout)?;
        Self::with_feed(feed, config)
    }
}

impl<F: GroundTruthFeed> GroundTruthMatcher<F> {
    pub fn with_feed(feed: F, config: MatcherConfig) -> Result<Self, MatchError> {
        config.validate()?;
        let window = SlidingWindow::new(feed, config.window_size_ms, config.lookahead_ms)?;
        info!(
            feed = window.feed().name(),
            window_size_ms = config.window_size_ms,
            lookahead_ms = config.lookahead_ms,
            user_match = config.user_match.name(),
            out_of_order = ?config.out_of_order,
            start = ?window.cursor(),
            "ground truth matcher initialized"
        );
        Ok(Self {
            window,
            guard: ConsumptionGuard::new(),
            policy: Box::new(config.user_match),
            out_of_order: config.out_of_order,
            counters: CheckCounters::default(),
        })
    }

    /// Replace the match predicate.
    pub fn with_policy(mut self, policy: Box<dyn MatchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Decide whether `candidate` is confirmed by an unconsumed ground-truth event.
    pub fn check_prediction(
        &mut self,
        candidate: &PredictionCandidate,
        blacklist: &Blacklist,
    ) -> Result<bool, MatchError> {
        self.counters.checks += 1;

        if blacklist.contains(&candidate.item_id) {
            self.counters.blacklisted += 1;
            return Ok(false);
        }

        let previous = self.window.last_target();
        let advance = self.window.advance_to(candidate.timestamp, &mut self.guard)?;
        if !advance.moved {
            self.counters.out_of_order += 1;
            let previous = previous.unwrap_or(candidate.timestamp);
            match self.out_of_order {
                OutOfOrderPolicy::Reject => {
                    return Err(MatchError::OutOfOrder {
                        timestamp: candidate.timestamp,
                        previous,
                    });
                }
                OutOfOrderPolicy::Tolerate => {
                    debug!(
                        ts = candidate.timestamp,
                        previous, "out-of-order prediction checked against current window"
                    );
                }
            }
        }

        match self.find_unconsumed(candidate) {
            Some(id) => {
                self.guard.mark_consumed(id);
                self.window.retire(id);
                self.counters.confirmed += 1;
                Ok(true)
            }
            None => {
                self.counters.unmatched += 1;
                Ok(false)
            }
        }
    }

    /// Oldest eligible, unconsumed event for `candidate`.
    fn find_unconsumed(&self, candidate: &PredictionCandidate) -> Option<EventId> {
        let (lower, upper) = self.window.bounds_for(candidate.timestamp);
        self.window
            .bucket(&candidate.key())
            .find(|(id, event)| {
                event.timestamp >= lower
                    && event.timestamp <= upper
                    && !self.guard.is_consumed(*id)
                    && self.policy.accepts(candidate, event)
            })
            .map(|(id, _)| id)
    }

    pub fn stats(&self) -> MatcherStats {
        MatcherStats {
            checks: self.counters.checks,
            confirmed: self.counters.confirmed,
            unmatched: self.counters.unmatched,
            blacklisted: self.counters.blacklisted,
            out_of_order: self.counters.out_of_order,
            consumed_in_window: self.guard.len(),
            events_in_window: self.window.len(),
            window: self.window.counters(),
            feed: self.window.feed().counters(),
        }
    }

    pub fn window(&self) -> &SlidingWindow<F> {
        &self.window
    }

    pub fn guard(&self) -> &ConsumptionGuard {
        &self.guard
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    /// Release the ground-truth log. Close failures are logged, never returned.
    pub fn close(mut self) -> MatcherStats {
        if let Err(e) = self.window.feed_mut().close() {
            warn!(error = %e, "failed to close ground truth feed");
        }
        let stats = self.stats();
        info!(
            checks = stats.checks,
            confirmed = stats.confirmed,
            evicted = stats.window.evicted,
            peak_window = stats.window.peak_len,
            "ground truth matcher closed"
        );
        stats
    }
}
