//! Health metrics over a log snapshot.
//!
//! Every function here is pure: same entries and `now`, same answer. Nothing
//! is cached between calls.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use sentinel_protocol::{LatencySummary, MetricsSnapshot, TimelineBucket};

use crate::log::LoggedEvent;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct MetricsCalculator {
    window: Duration,
}

impl Default for MetricsCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl MetricsCalculator {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Throughput is windowed; error and latency figures cover the whole log.
    pub fn compute(&self, entries: &[LoggedEvent], now_ms: u64) -> MetricsSnapshot {
        let window_ms = self.window.as_millis() as u64;
        let window_secs = self.window.as_secs_f64();

        let recent = entries
            .iter()
            .filter(|entry| now_ms.saturating_sub(entry.event.timestamp) < window_ms)
            .count();
        let requests_per_second = if window_secs > 0.0 {
            recent as f64 / window_secs
        } else {
            0.0
        };

        let total_requests = entries.len();
        let total_errors = entries.iter().filter(|e| e.is_failed_response()).count();
        let error_rate = if total_requests > 0 {
            total_errors as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };

        let latencies = sorted_latencies(entries);
        let active_tools = entries
            .iter()
            .filter_map(|entry| entry.event.method())
            .collect::<HashSet<_>>()
            .len();

        MetricsSnapshot {
            requests_per_second,
            error_rate,
            p95_latency: percentile_of_sorted(&latencies, 0.95),
            active_tools,
            total_requests,
            total_errors,
        }
    }
}

/// Response latencies in ascending order. Events without a latency are skipped.
pub fn sorted_latencies(entries: &[LoggedEvent]) -> Vec<u64> {
    let mut latencies: Vec<u64> = entries
        .iter()
        .filter(|entry| entry.event.is_inbound())
        .filter_map(|entry| entry.event.latency_ms)
        .collect();
    latencies.sort_unstable();
    latencies
}

/// Nearest-rank percentile: index `floor(n × quantile)`, clamped to the last
/// element. Zero for an empty sample.
pub fn percentile_of_sorted(sorted: &[u64], quantile: f64) -> u64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0;
    };
    let rank = (sorted.len() as f64 * quantile).floor();
    let index = if rank.is_sign_negative() {
        0
    } else {
        (rank as usize).min(last)
    };
    sorted[index]
}

pub fn latency_percentile(entries: &[LoggedEvent], quantile: f64) -> u64 {
    percentile_of_sorted(&sorted_latencies(entries), quantile)
}

pub fn latency_summary(entries: &[LoggedEvent]) -> LatencySummary {
    let latencies = sorted_latencies(entries);
    LatencySummary {
        p50: percentile_of_sorted(&latencies, 0.50),
        p95: percentile_of_sorted(&latencies, 0.95),
        p99: percentile_of_sorted(&latencies, 0.99),
        max: latencies.last().copied().unwrap_or(0),
        samples: latencies.len(),
    }
}

/// Events grouped into fixed-width buckets by timestamp, oldest first.
/// Empty buckets are omitted. A zero width yields no buckets.
pub fn timeline(entries: &[LoggedEvent], bucket: Duration) -> Vec<TimelineBucket> {
    let width = bucket.as_millis() as u64;
    if width == 0 {
        return Vec::new();
    }

    let mut buckets: BTreeMap<u64, TimelineBucket> = BTreeMap::new();
    for entry in entries {
        let start = entry.event.timestamp / width * width;
        let slot = buckets.entry(start).or_insert(TimelineBucket {
            start,
            events: 0,
            errors: 0,
        });
        slot.events += 1;
        if entry.is_failed_response() {
            slot.errors += 1;
        }
    }
    buckets.into_values().collect()
}
