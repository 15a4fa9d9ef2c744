//! Consumption Guard
//!
//! Enforces single use of ground-truth events: once an event has confirmed a
//! prediction it can never confirm another. Entries are forgotten when the
//! sliding window evicts the event, so memory tracks window membership rather
//! than run history.

use crate::evaluation::events::EventId;
use std::collections::HashSet;
use tracing::trace;

#[derive(Debug, Default)]
pub struct ConsumptionGuard {
    consumed: HashSet<EventId>,
    /// Total events ever marked (survives `forget`).
    total_consumed: u64,
}

impl ConsumptionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an event as used. Returns `false` if it was already consumed.
    pub fn mark_consumed(&mut self, id: EventId) -> bool {
        let fresh = self.consumed.insert(id);
        if fresh {
            self.total_consumed += 1;
            trace!(event = %id, "ground truth event consumed");
        }
        fresh
    }

    #[inline]
    pub fn is_consumed(&self, id: EventId) -> bool {
        self.consumed.contains(&id)
    }

    /// Drop bookkeeping for an evicted event.
    #[inline]
    pub fn forget(&mut self, id: EventId) {
        self.consumed.remove(&id);
    }

    /// Number of consumed events still tracked.
    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }

    pub fn total_consumed(&self) -> u64 {
        self.total_consumed
    }
}
