//! Per-tool running statistics.
//!
//! Updated in place as each event is committed. `rebuild` replays a log from
//! scratch and must always agree with the incremental table for the same
//! prefix; the tests hold the two against each other.

use std::collections::{BTreeMap, HashMap};

use sentinel_protocol::{EventStatus, RequestId};
use serde::Serialize;

use crate::correlation::CorrelationIndex;
use crate::log::{LoggedEvent, Seq};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub total: u64,
    pub outbound: u64,
    pub inbound: u64,
    pub errors: u64,
    /// Most recent call id attributed to the tool, either direction.
    pub last_request_id: Option<RequestId>,
    /// Summed over inbound events that carried a latency.
    pub total_latency: u64,
    pub max_latency: u64,
}

impl ToolStats {
    pub fn avg_latency(&self) -> f64 {
        if self.inbound == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.inbound as f64
        }
    }

    fn record(&mut self, entry: &LoggedEvent, request_id: RequestId) {
        self.total += 1;
        self.last_request_id = Some(request_id);

        if entry.event.is_outbound() {
            self.outbound += 1;
            return;
        }

        self.inbound += 1;
        if let Some(latency) = entry.event.latency_ms {
            self.total_latency += latency;
            self.max_latency = self.max_latency.max(latency);
        }
        if entry.outcome.is_failure() {
            self.errors += 1;
        }
    }
}

/// The most recent inbound event attributed to a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastInbound {
    pub seq: Seq,
    pub status: EventStatus,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AggregationTable {
    tools: BTreeMap<String, ToolStats>,
    last_inbound: HashMap<String, LastInbound>,
}

impl AggregationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one committed event into the table under its resolved method.
    ///
    /// Events without a request id are not attributable and leave the table
    /// untouched. Returns true when the event introduced a new tool.
    pub fn apply(&mut self, entry: &LoggedEvent, method: &str) -> bool {
        let Some(request_id) = entry.event.request_id else {
            return false;
        };

        let created = !self.tools.contains_key(method);
        self.tools
            .entry(method.to_owned())
            .or_default()
            .record(entry, request_id);

        if entry.event.is_inbound() {
            self.last_inbound.insert(
                method.to_owned(),
                LastInbound {
                    seq: entry.seq,
                    status: entry.status(),
                },
            );
        }
        created
    }

    /// Full replay of `entries` with a fresh correlation index.
    ///
    /// Methods are resolved against the index as it stood when each event was
    /// committed, matching what `apply` saw during live ingestion.
    pub fn rebuild<'a>(entries: impl IntoIterator<Item = &'a LoggedEvent>) -> Self {
        let mut index = CorrelationIndex::new();
        let mut table = Self::new();
        for entry in entries {
            index.record(&entry.event);
            if let Some(method) = index.resolve(&entry.event) {
                table.apply(entry, method);
            }
        }
        table
    }

    pub fn get(&self, method: &str) -> Option<&ToolStats> {
        self.tools.get(method)
    }

    pub fn last_inbound(&self, method: &str) -> Option<LastInbound> {
        self.last_inbound.get(method).copied()
    }

    /// Known tool methods in lexicographic order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ToolStats)> {
        self.tools.iter().map(|(method, stats)| (method.as_str(), stats))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
