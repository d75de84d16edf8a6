//! Health metric records.

use serde::{Deserialize, Serialize};

/// Flat health summary over one log snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests_per_second: f64,
    /// Percentage in `[0, 100]`.
    pub error_rate: f64,
    pub p95_latency: u64,
    pub active_tools: usize,
    pub total_requests: usize,
    pub total_errors: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
    pub samples: usize,
}

/// Event counts for one fixed-width slice of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBucket {
    /// Bucket start, Unix milliseconds.
    pub start: u64,
    pub events: usize,
    pub errors: usize,
}
