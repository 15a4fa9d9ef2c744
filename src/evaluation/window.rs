//! Sliding Ground-Truth Window
//!
//! Holds the ground-truth events that may still confirm a prediction, i.e.
//! those with `timestamp >= cursor - window_size`. Events are pulled lazily from
//! a [`GroundTruthFeed`] as the cursor advances and evicted oldest-first, so
//! memory is bounded by window duration x event rate instead of log size.
//!
//! # Layout
//!
//! ```text
//!   arena (VecDeque, arrival order)        index (HashMap<MatchKey, VecDeque<EventId>>)
//!   ┌──────┬──────┬──────┬──────┐          (d9,i5) → [gt#0, gt#3]
//!   │ gt#0 │ gt#1 │ gt#2 │ gt#3 │          (d9,i7) → [gt#1]
//!   └──────┴──────┴──────┴──────┘          (d2,i5) → [gt#2]
//!    ▲ evict front                 push back ▲
//! ```
//!
//! Ids are contiguous in the arena, so `id - front_id` is the arena offset.
//! Every index bucket lists its ids in arena order, so evicting the arena
//! front pops the front of at most one bucket. Both are O(1). Consumed events
//! are retired from their bucket right away, so a lookup only walks events
//! that can still match.

use crate::evaluation::consumption::ConsumptionGuard;
use crate::evaluation::events::{EventId, GroundTruthEvent, MatchKey, Millis};
use crate::evaluation::feed::{FeedError, GroundTruthFeed};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Result of a single `advance_to` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceSummary {
    /// Events pulled from the feed and inserted.
    pub ingested: u64,
    /// Events dropped from the window.
    pub evicted: u64,
    /// Events pulled but already older than the lower edge.
    pub stale_skipped: u64,
    /// Events pulled that were older than an event already ingested.
    pub source_out_of_order: u64,
    /// False when the requested time was behind a previous request.
    pub moved: bool,
}

/// Cumulative window counters over the lifetime of the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounters {
    pub ingested: u64,
    pub evicted: u64,
    pub stale_skipped: u64,
    pub source_out_of_order: u64,
    /// Largest number of events held at once.
    pub peak_len: usize,
}

pub struct SlidingWindow<F: GroundTruthFeed> {
    feed: F,
    window_size_ms: Millis,
    lookahead_ms: Millis,
    arena: VecDeque<(EventId, GroundTruthEvent)>,
    index: HashMap<MatchKey, VecDeque<EventId>>,
    next_id: u64,
    /// Starts at the first ground-truth timestamp; never decreases.
    cursor: Option<Millis>,
    /// Highest time ever requested through `advance_to`.
    last_target: Option<Millis>,
    /// Timestamp of the newest ingested event.
    newest_ingested: Option<Millis>,
    exhausted: bool,
    counters: WindowCounters,
}

impl<F: GroundTruthFeed> SlidingWindow<F> {
    /// Create a window over `feed`. The cursor is primed with the feed's first timestamp.
    pub fn new(
        mut feed: F,
        window_size_ms: Millis,
        lookahead_ms: Millis,
    ) -> Result<Self, FeedError> {
        let cursor = feed.peek_time()?;
        let exhausted = cursor.is_none();
        if exhausted {
            warn!(
                feed = feed.name(),
                "ground truth feed is empty; no prediction can be confirmed"
            );
        }
        Ok(Self {
            feed,
            window_size_ms: window_size_ms.max(0),
            lookahead_ms: lookahead_ms.max(0),
            arena: VecDeque::new(),
            index: HashMap::new(),
            next_id: 0,
            cursor,
            last_target: None,
            newest_ingested: None,
            exhausted,
            counters: WindowCounters::default(),
        })
    }

    /// Move the window to `t`: pull every event up to `t + lookahead`, then
    /// evict everything older than `t - window_size`.
    ///
    /// The lower edge is inclusive: an event at exactly `t - window_size` stays.
    /// A `t` behind a previous request leaves the window untouched.
    pub fn advance_to(
        &mut self,
        t: Millis,
        guard: &mut ConsumptionGuard,
    ) -> Result<AdvanceSummary, FeedError> {
        let mut summary = AdvanceSummary::default();

        if matches!(self.last_target, Some(last) if t < last) {
            return Ok(summary);
        }
        summary.moved = true;
        self.last_target = Some(t);
        self.cursor = Some(self.cursor.map_or(t, |c| c.max(t)));

        let lower = self.lower_edge(t);
        let upper = self.upper_edge(t);

        while !self.exhausted {
            match self.feed.peek_time()? {
                Some(ts) if ts <= upper => {}
                Some(_) => break,
                None => {
                    self.exhausted = true;
                    debug!(feed = self.feed.name(), at = t, "ground truth feed exhausted");
                    break;
                }
            }
            let Some(event) = self.feed.next_event()? else {
                self.exhausted = true;
                break;
            };
            self.ingest(event, lower, &mut summary);
        }

        while let Some(&(id, event)) = self.arena.front() {
            if event.timestamp >= lower {
                break;
            }
            self.arena.pop_front();
            self.unindex(id, event.key());
            guard.forget(id);
            summary.evicted += 1;
        }

        self.counters.ingested += summary.ingested;
        self.counters.evicted += summary.evicted;
        self.counters.stale_skipped += summary.stale_skipped;
        self.counters.source_out_of_order += summary.source_out_of_order;
        self.counters.peak_len = self.counters.peak_len.max(self.arena.len());

        Ok(summary)
    }

    fn ingest(&mut self, event: GroundTruthEvent, lower: Millis, summary: &mut AdvanceSummary) {
        if event.timestamp < lower {
            summary.stale_skipped += 1;
            return;
        }
        if matches!(self.newest_ingested, Some(newest) if event.timestamp < newest) {
            if self.counters.source_out_of_order + summary.source_out_of_order == 0 {
                warn!(
                    feed = self.feed.name(),
                    ts = event.timestamp,
                    "ground truth log is not time-ordered; dropping out-of-order events"
                );
            }
            summary.source_out_of_order += 1;
            return;
        }

        let id = EventId(self.next_id);
        self.next_id += 1;
        self.newest_ingested = Some(event.timestamp);
        self.arena.push_back((id, event));
        self.index.entry(event.key()).or_default().push_back(id);
        summary.ingested += 1;
    }

    fn unindex(&mut self, id: EventId, key: MatchKey) {
        if let Some(bucket) = self.index.get_mut(&key) {
            // A retired id is already gone; anything left is newer.
            debug_assert!(
                bucket.front().map_or(true, |&f| f >= id),
                "bucket out of arena order"
            );
            if bucket.front() == Some(&id) {
                bucket.pop_front();
            }
            if bucket.is_empty() {
                self.index.remove(&key);
            }
        }
    }

    /// Remove a consumed event from its index bucket so later lookups on the
    /// same key do not scan it again. The event stays in the arena until evicted.
    pub fn retire(&mut self, id: EventId) {
        let Some(key) = self.get(id).map(GroundTruthEvent::key) else {
            return;
        };
        if let Some(bucket) = self.index.get_mut(&key) {
            if let Some(pos) = bucket.iter().position(|&b| b == id) {
                bucket.remove(pos);
            }
            if bucket.is_empty() {
                self.index.remove(&key);
            }
        }
    }

    #[inline]
    fn lower_edge(&self, t: Millis) -> Millis {
        t.saturating_sub(self.window_size_ms)
    }

    #[inline]
    fn upper_edge(&self, t: Millis) -> Millis {
        t.saturating_add(self.lookahead_ms)
    }

    /// Inclusive `[lower, upper]` eligibility bounds for a prediction made at `t`.
    pub fn bounds_for(&self, t: Millis) -> (Millis, Millis) {
        (self.lower_edge(t), self.upper_edge(t))
    }

    /// Look up an event held by the window.
    pub fn get(&self, id: EventId) -> Option<&GroundTruthEvent> {
        let (front_id, _) = self.arena.front()?;
        let offset = id.0.checked_sub(front_id.0)?;
        self.arena.get(offset as usize).map(|(_, e)| e)
    }

    /// Unretired events sharing `key`, oldest first.
    pub fn bucket<'a>(
        &'a self,
        key: &MatchKey,
    ) -> impl Iterator<Item = (EventId, &'a GroundTruthEvent)> + 'a {
        self.index
            .get(key)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(move |&id| self.get(id).map(|e| (id, e)))
    }

    /// All held events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &(EventId, GroundTruthEvent)> {
        self.arena.iter()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Number of distinct domain+item keys indexed.
    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    pub fn cursor(&self) -> Option<Millis> {
        self.cursor
    }

    pub fn last_target(&self) -> Option<Millis> {
        self.last_target
    }

    pub fn oldest_timestamp(&self) -> Option<Millis> {
        self.arena.front().map(|(_, e)| e.timestamp)
    }

    pub fn window_size_ms(&self) -> Millis {
        self.window_size_ms
    }

    pub fn lookahead_ms(&self) -> Millis {
        self.lookahead_ms
    }

    pub fn source_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn counters(&self) -> WindowCounters {
        self.counters
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }
}
