//! Sliding Window Tests

use crate::evaluation::consumption::ConsumptionGuard;
use crate::evaluation::events::{EventId, GroundTruthEvent, MatchKey};
use crate::evaluation::feed::{GroundTruthFeed, VecFeed};
use crate::evaluation::window::SlidingWindow;

fn ev(user: i64, item: i64, domain: i64, ts: i64) -> GroundTruthEvent {
    GroundTruthEvent::new(user, item, domain, ts)
}

fn window(events: Vec<GroundTruthEvent>, size: i64) -> SlidingWindow<VecFeed> {
    SlidingWindow::new(VecFeed::new("test", events), size, 0).unwrap()
}

#[test]
fn test_cursor_primed_with_first_timestamp() {
    let w = window(vec![ev(1, 5, 9, 1000), ev(1, 6, 9, 2000)], 1000);
    assert_eq!(w.cursor(), Some(1000));
    assert!(w.is_empty());
    assert!(!w.source_exhausted());
}

#[test]
fn test_empty_feed_is_exhausted_immediately() {
    let mut w = window(vec![], 1000);
    let mut guard = ConsumptionGuard::new();
    assert_eq!(w.cursor(), None);
    assert!(w.source_exhausted());

    let summary = w.advance_to(5000, &mut guard).unwrap();
    assert!(summary.moved);
    assert_eq!(summary.ingested, 0);
    assert_eq!(w.cursor(), Some(5000));
}

#[test]
fn test_advance_pulls_only_up_to_target() {
    let mut w = window(vec![ev(1, 5, 9, 1000), ev(1, 6, 9, 1500), ev(1, 7, 9, 2500)], 1000);
    let mut guard = ConsumptionGuard::new();

    let summary = w.advance_to(1500, &mut guard).unwrap();
    assert_eq!(summary.ingested, 2);
    assert_eq!(w.len(), 2);
    assert_eq!(w.feed().remaining(), 1);
}

#[test]
fn test_lower_edge_is_inclusive() {
    let mut w = window(vec![ev(1, 5, 9, 1000)], 1000);
    let mut guard = ConsumptionGuard::new();

    w.advance_to(2000, &mut guard).unwrap();
    assert_eq!(w.len(), 1, "event at exactly t - window stays");

    let summary = w.advance_to(2001, &mut guard).unwrap();
    assert_eq!(summary.evicted, 1);
    assert!(w.is_empty());
    assert_eq!(w.key_count(), 0);
}

#[test]
fn test_stale_events_are_skipped_not_held() {
    let mut w = window(vec![ev(1, 5, 9, 100), ev(1, 6, 9, 200), ev(1, 7, 9, 5000)], 1000);
    let mut guard = ConsumptionGuard::new();

    let summary = w.advance_to(5000, &mut guard).unwrap();
    assert_eq!(summary.stale_skipped, 2);
    assert_eq!(summary.ingested, 1);
    assert_eq!(w.oldest_timestamp(), Some(5000));
}

#[test]
fn test_window_bound_holds_for_monotonic_advances() {
    let events: Vec<_> = (0..200).map(|i| ev(i % 7, i % 13, i % 3, i * 37)).collect();
    let mut w = window(events, 500);
    let mut guard = ConsumptionGuard::new();

    let mut t = 0;
    while t < 200 * 37 + 1000 {
        w.advance_to(t, &mut guard).unwrap();
        let lower = t - 500;
        assert!(w.iter().all(|(_, e)| e.timestamp >= lower && e.timestamp <= t));
        t += 53;
    }
    assert!(w.source_exhausted());
    let c = w.counters();
    assert_eq!(c.ingested + c.stale_skipped, 200);
    assert!(c.peak_len <= 500 / 37 + 1);
}

#[test]
fn test_backwards_advance_does_not_move() {
    let mut w = window(vec![ev(1, 5, 9, 1000), ev(1, 5, 9, 3000)], 1000);
    let mut guard = ConsumptionGuard::new();

    w.advance_to(3000, &mut guard).unwrap();
    let summary = w.advance_to(1500, &mut guard).unwrap();
    assert!(!summary.moved);
    assert_eq!(w.cursor(), Some(3000));
    assert_eq!(w.last_target(), Some(3000));
}

#[test]
fn test_lookahead_pulls_future_events() {
    let mut w = SlidingWindow::new(
        VecFeed::new("test", vec![ev(1, 5, 9, 1000), ev(1, 5, 9, 1400)]),
        1000,
        500,
    )
    .unwrap();
    let mut guard = ConsumptionGuard::new();

    w.advance_to(1000, &mut guard).unwrap();
    assert_eq!(w.len(), 2);
    assert_eq!(w.bounds_for(1000), (0, 1500));
}

#[test]
fn test_bucket_lists_matches_oldest_first() {
    let mut w = window(
        vec![ev(1, 5, 9, 1000), ev(2, 6, 9, 1100), ev(3, 5, 9, 1200), ev(4, 5, 2, 1300)],
        1000,
    );
    let mut guard = ConsumptionGuard::new();
    w.advance_to(1300, &mut guard).unwrap();

    let users: Vec<i64> = w.bucket(&MatchKey::new(9, 5)).map(|(_, e)| e.user_id).collect();
    assert_eq!(users, vec![1, 3]);
    assert_eq!(w.bucket(&MatchKey::new(9, 99)).count(), 0);
    assert_eq!(w.key_count(), 3);
}

#[test]
fn test_get_by_id_after_eviction() {
    let mut w = window(vec![ev(1, 5, 9, 1000), ev(1, 6, 9, 2000), ev(1, 7, 9, 2500)], 1000);
    let mut guard = ConsumptionGuard::new();

    w.advance_to(2500, &mut guard).unwrap();
    assert!(w.get(EventId(0)).is_none(), "evicted");
    assert_eq!(w.get(EventId(1)).map(|e| e.item_id), Some(6));
    assert_eq!(w.get(EventId(2)).map(|e| e.item_id), Some(7));
    assert!(w.get(EventId(3)).is_none());
}

#[test]
fn test_eviction_forgets_consumed_ids() {
    let mut w = window(vec![ev(1, 5, 9, 1000), ev(1, 6, 9, 1900)], 1000);
    let mut guard = ConsumptionGuard::new();

    w.advance_to(1900, &mut guard).unwrap();
    guard.mark_consumed(EventId(0));
    guard.mark_consumed(EventId(1));

    w.advance_to(2500, &mut guard).unwrap();
    assert_eq!(guard.len(), 1);
    assert!(!guard.is_consumed(EventId(0)));
    assert!(guard.is_consumed(EventId(1)));
}

#[test]
fn test_out_of_order_source_events_dropped() {
    struct Unsorted(Vec<GroundTruthEvent>);
    impl GroundTruthFeed for Unsorted {
        fn next_event(
            &mut self,
        ) -> Result<Option<GroundTruthEvent>, crate::evaluation::feed::FeedError> {
            Ok(if self.0.is_empty() { None } else { Some(self.0.remove(0)) })
        }
        fn peek_time(&mut self) -> Result<Option<i64>, crate::evaluation::feed::FeedError> {
            Ok(self.0.first().map(|e| e.timestamp))
        }
    }

    let feed = Unsorted(vec![ev(1, 5, 9, 1000), ev(1, 6, 9, 1200), ev(1, 7, 9, 1100)]);
    let mut w = SlidingWindow::new(feed, 1000, 0).unwrap();
    let mut guard = ConsumptionGuard::new();

    let summary = w.advance_to(1300, &mut guard).unwrap();
    assert_eq!(summary.ingested, 2);
    assert_eq!(summary.source_out_of_order, 1);
    assert!(w.iter().all(|(_, e)| e.item_id != 7));
}

#[test]
fn test_retired_events_leave_bucket_but_stay_until_evicted() {
    let mut w = window(vec![ev(1, 5, 9, 1000), ev(2, 5, 9, 1100), ev(3, 5, 9, 1200)], 1000);
    let mut guard = ConsumptionGuard::new();
    w.advance_to(1200, &mut guard).unwrap();

    w.retire(EventId(1));
    let ids: Vec<EventId> = w.bucket(&MatchKey::new(9, 5)).map(|(id, _)| id).collect();
    assert_eq!(ids, vec![EventId(0), EventId(2)]);
    assert_eq!(w.len(), 3);

    w.retire(EventId(0));
    w.retire(EventId(2));
    assert_eq!(w.bucket(&MatchKey::new(9, 5)).count(), 0);
    assert_eq!(w.key_count(), 0);

    let summary = w.advance_to(2300, &mut guard).unwrap();
    assert_eq!(summary.evicted, 3);
    assert!(w.is_empty());
}

#[test]
fn test_eviction_after_partial_retire_keeps_index_consistent() {
    let mut w = window(vec![ev(1, 5, 9, 1000), ev(2, 5, 9, 1500), ev(3, 5, 9, 1900)], 1000);
    let mut guard = ConsumptionGuard::new();
    w.advance_to(1900, &mut guard).unwrap();

    w.retire(EventId(1));
    w.advance_to(2600, &mut guard).unwrap();

    let ids: Vec<EventId> = w.bucket(&MatchKey::new(9, 5)).map(|(id, _)| id).collect();
    assert_eq!(ids, vec![EventId(2)]);
    assert_eq!(w.len(), 1);
}
