//! Evaluation Event Types
//!
//! Ground-truth interactions read from the click log, and the transient
//! prediction candidates checked against them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Epoch milliseconds.
pub type Millis = i64;

pub type UserId = i64;
pub type ItemId = i64;
pub type DomainId = i64;

/// Sentinel for a prediction whose user could not be identified.
pub const UNKNOWN_USER: UserId = -1;

/// Milliseconds per second.
pub const MILLIS_PER_SEC: Millis = 1_000;

/// Milliseconds per minute.
pub const MILLIS_PER_MIN: Millis = 60 * MILLIS_PER_SEC;

/// A recorded user interaction. Immutable once read from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroundTruthEvent {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub domain_id: DomainId,
    pub timestamp: Millis,
}

impl GroundTruthEvent {
    pub fn new(user_id: UserId, item_id: ItemId, domain_id: DomainId, timestamp: Millis) -> Self {
        Self {
            user_id,
            item_id,
            domain_id,
            timestamp,
        }
    }

    #[inline]
    pub fn key(&self) -> MatchKey {
        MatchKey::new(self.domain_id, self.item_id)
    }
}

/// One recommended item of a prediction record, checked once and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PredictionCandidate {
    /// `UNKNOWN_USER` when the request carried no usable user.
    pub user_id: UserId,
    pub item_id: ItemId,
    pub domain_id: DomainId,
    pub timestamp: Millis,
}

impl PredictionCandidate {
    pub fn new(user_id: UserId, item_id: ItemId, domain_id: DomainId, timestamp: Millis) -> Self {
        Self {
            user_id,
            item_id,
            domain_id,
            timestamp,
        }
    }

    #[inline]
    pub fn has_known_user(&self) -> bool {
        self.user_id != UNKNOWN_USER
    }

    #[inline]
    pub fn key(&self) -> MatchKey {
        MatchKey::new(self.domain_id, self.item_id)
    }
}

/// Arena identifier of a ground-truth event held by the sliding window.
///
/// Assigned in arrival order, so ids are strictly increasing with (non-decreasing)
/// event time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gt#{}", self.0)
    }
}

/// Lookup key of the window index: domain + item.
///
/// The user is deliberately not part of the key; user matching is a policy
/// applied while scanning the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey {
    pub domain_id: DomainId,
    pub item_id: ItemId,
}

impl MatchKey {
    #[inline]
    pub fn new(domain_id: DomainId, item_id: ItemId) -> Self {
        Self { domain_id, item_id }
    }
}
