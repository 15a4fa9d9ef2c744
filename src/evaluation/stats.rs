//! Evaluation Statistics
//!
//! Per-domain confirmation tallies and response-time summaries.

use crate::evaluation::events::DomainId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// DOMAIN TALLIES
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTally {
    pub confirmed: u64,
    pub unconfirmed: u64,
}

impl DomainTally {
    #[inline]
    pub fn record(&mut self, confirmed: bool) {
        if confirmed {
            self.confirmed += 1;
        } else {
            self.unconfirmed += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.confirmed + self.unconfirmed
    }

    /// Contest score: confirmed per thousand unconfirmed (integer division).
    /// `None` when nothing went unconfirmed.
    pub fn permille(&self) -> Option<u64> {
        (self.unconfirmed > 0).then(|| 1000 * self.confirmed / self.unconfirmed)
    }

    /// Share of checked recommendations that were confirmed.
    pub fn confirmation_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => self.confirmed as f64 / n as f64,
        }
    }

    fn merge(&mut self, other: &DomainTally) {
        self.confirmed += other.confirmed;
        self.unconfirmed += other.unconfirmed;
    }
}

/// Tallies keyed by domain, iterated in domain order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTallies {
    by_domain: BTreeMap<DomainId, DomainTally>,
}

impl DomainTallies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, domain_id: DomainId, confirmed: bool) {
        self.by_domain.entry(domain_id).or_default().record(confirmed);
    }

    pub fn get(&self, domain_id: DomainId) -> Option<&DomainTally> {
        self.by_domain.get(&domain_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DomainId, &DomainTally)> {
        self.by_domain.iter()
    }

    pub fn overall(&self) -> DomainTally {
        let mut all = DomainTally::default();
        for tally in self.by_domain.values() {
            all.merge(tally);
        }
        all
    }

    pub fn len(&self) -> usize {
        self.by_domain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }
}

// =============================================================================
// RESPONSE TIMES
// =============================================================================

/// Streaming response-time statistics (Welford), constant memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseTimeStats {
    n: u64,
    mean: f64,
    /// Sum of squared deviations from the running mean.
    m2: f64,
    min: f64,
    max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeSummary {
    pub n: u64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; 0 for a single sample.
    pub std_dev: f64,
}

impl ResponseTimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, response_time_ms: i64) {
        let x = response_time_ms as f64;
        if self.n == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn len(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn summary(&self) -> Option<ResponseTimeSummary> {
        if self.n == 0 {
            return None;
        }
        let std_dev = if self.n > 1 {
            (self.m2 / (self.n - 1) as f64).sqrt()
        } else {
            0.0
        };
        Some(ResponseTimeSummary {
            n: self.n,
            mean: self.mean,
            min: self.min,
            max: self.max,
            std_dev,
        })
    }
}

/// Number of 10 ms buckets; slower responses land in the last one.
pub const HISTOGRAM_BUCKETS: usize = 500;

/// Bucket width (ms).
pub const HISTOGRAM_BUCKET_MS: i64 = 10;

/// Fixed-width response-time histogram for detailed analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTimeHistogram {
    buckets: Vec<u64>,
}

impl Default for ResponseTimeHistogram {
    fn default() -> Self {
        Self {
            buckets: vec![0; HISTOGRAM_BUCKETS],
        }
    }
}

impl ResponseTimeHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, response_time_ms: i64) {
        let idx = (response_time_ms / HISTOGRAM_BUCKET_MS).clamp(0, HISTOGRAM_BUCKETS as i64 - 1);
        self.buckets[idx as usize] += 1;
    }

    pub fn count(&self, bucket: usize) -> u64 {
        self.buckets.get(bucket).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }

    /// `(bucket lower bound ms, count)` for every bucket.
    pub fn iter(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .map(|(i, &c)| (i as i64 * HISTOGRAM_BUCKET_MS, c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_permille() {
        let mut t = DomainTally::default();
        assert_eq!(t.permille(), None);
        t.record(true);
        t.record(false);
        t.record(false);
        t.record(false);
        assert_eq!(t.total(), 4);
        assert_eq!(t.permille(), Some(333));
        assert!((t.confirmation_rate() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_tallies_overall_sums_domains() {
        let mut tallies = DomainTallies::new();
        tallies.record(9, true);
        tallies.record(9, false);
        tallies.record(2, false);
        let domains: Vec<DomainId> = tallies.iter().map(|(d, _)| *d).collect();
        assert_eq!(domains, vec![2, 9]);
        assert_eq!(
            tallies.overall(),
            DomainTally {
                confirmed: 1,
                unconfirmed: 2
            }
        );
    }

    #[test]
    fn test_response_summary() {
        let mut stats = ResponseTimeStats::new();
        assert!(stats.summary().is_none());
        for v in [10, 20, 30] {
            stats.add(v);
        }
        let s = stats.summary().unwrap();
        assert_eq!(s.n, 3);
        assert!((s.mean - 20.0).abs() < 1e-9);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 30.0);
        assert!((s.std_dev - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_streaming_summary_agrees_with_batch_statistics() {
        use statrs::statistics::Statistics;

        let samples: Vec<i64> = (0..1000).map(|i| (i * 7919) % 613 + 3).collect();
        let mut stats = ResponseTimeStats::new();
        for &v in &samples {
            stats.add(v);
        }
        let batch: Vec<f64> = samples.iter().map(|&v| v as f64).collect();
        let s = stats.summary().unwrap();

        assert_eq!(s.n, 1000);
        assert!((s.mean - Statistics::mean(batch.iter())).abs() < 1e-9);
        assert!((s.std_dev - Statistics::std_dev(batch.iter())).abs() < 1e-9);
        assert_eq!(s.min, Statistics::min(batch.iter()));
        assert_eq!(s.max, Statistics::max(batch.iter()));
    }

    #[test]
    fn test_single_sample_has_zero_std_dev() {
        let mut stats = ResponseTimeStats::new();
        stats.add(42);
        assert_eq!(stats.summary().unwrap().std_dev, 0.0);
    }

    #[test]
    fn test_histogram_buckets_and_overflow() {
        let mut h = ResponseTimeHistogram::new();
        h.record(0);
        h.record(9);
        h.record(10);
        h.record(1_000_000);
        h.record(-5);
        assert_eq!(h.count(0), 3);
        assert_eq!(h.count(1), 1);
        assert_eq!(h.count(HISTOGRAM_BUCKETS - 1), 1);
        assert_eq!(h.total(), 5);
        assert_eq!(h.iter().nth(2), Some((20, 0)));
    }
}
