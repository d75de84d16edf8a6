//! The engine: one write path that keeps every derived view in step with the log.

use std::time::Duration;

use sentinel_protocol::{
    EventFilter, LatencySummary, McpEvent, MetricsSnapshot, RequestId, TimelineBucket,
    TopologyView,
};
use tracing::{debug, info};

use crate::aggregate::{AggregationTable, ToolStats};
use crate::correlation::CorrelationIndex;
use crate::filter;
use crate::log::{EventLog, LoggedEvent, Seq};
use crate::metrics::{self, DEFAULT_WINDOW, MetricsCalculator};
use crate::projector::{ProjectedAttributes, StatsProjector};
use crate::topology::{LayoutConfig, TopologyBuilder, TopologyLayout};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Trailing window for throughput.
    pub metrics_window: Duration,
    pub layout: LayoutConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metrics_window: DEFAULT_WINDOW,
            layout: LayoutConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_metrics_window(mut self, window: Duration) -> Self {
        self.metrics_window = window;
        self
    }

    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.layout.radius = radius;
        self
    }
}

/// What one ingestion cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub seq: Seq,
    /// Resolved tool, `None` when the event could not be attributed.
    pub method: Option<String>,
    pub topology_rebuilt: bool,
}

/// Owns the log and every view derived from it.
///
/// Writes go through [`TopologyEngine::ingest`] one event at a time; each call
/// runs a full cycle (correlate, aggregate, maybe rebuild structure, project)
/// before returning. Reads never mutate.
#[derive(Debug)]
pub struct TopologyEngine {
    config: EngineConfig,
    log: EventLog,
    index: CorrelationIndex,
    table: AggregationTable,
    builder: TopologyBuilder,
    layout: TopologyLayout,
    projector: StatsProjector,
    attributes: ProjectedAttributes,
    metrics: MetricsCalculator,
    rebuilds: u64,
}

impl Default for TopologyEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TopologyEngine {
    pub fn new(config: EngineConfig) -> Self {
        let builder = TopologyBuilder::new(config.layout);
        let layout = builder.build(std::iter::empty());
        Self {
            metrics: MetricsCalculator::new(config.metrics_window),
            config,
            log: EventLog::new(),
            index: CorrelationIndex::new(),
            table: AggregationTable::new(),
            builder,
            layout,
            projector: StatsProjector,
            attributes: ProjectedAttributes::default(),
            rebuilds: 0,
        }
    }

    /// Load a recorded log in one pass: append every event, then derive the
    /// views once instead of cycling per event.
    pub fn replay(config: EngineConfig, events: impl IntoIterator<Item = McpEvent>) -> Self {
        let mut engine = Self::new(config);
        for event in events {
            engine.log.append(event);
        }
        engine.rebuild_views();
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ingest(&mut self, event: McpEvent) -> CycleReport {
        let entry = self.log.append(event);
        let seq = entry.seq;
        self.index.record(&entry.event);
        let method = self.index.resolve(&entry.event).map(str::to_owned);
        let created = method
            .as_deref()
            .is_some_and(|method| self.table.apply(entry, method));

        let topology_rebuilt =
            created && self.builder.is_stale(&self.layout, self.table.methods());
        if topology_rebuilt {
            self.layout = self.builder.build(self.table.methods());
            self.attributes = self.projector.project_all(&self.layout, &self.table);
            self.rebuilds += 1;
            info!(
                seq,
                tools = self.layout.tool_count(),
                fingerprint = %self.layout.fingerprint(),
                "topology rebuilt"
            );
        } else if let Some(method) = method.as_deref() {
            self.projector
                .refresh(&mut self.attributes, &self.layout, &self.table, method);
        }

        debug!(seq, method = ?method, topology_rebuilt, "cycle complete");
        CycleReport {
            seq,
            method,
            topology_rebuilt,
        }
    }

    /// Recompute every derived view from the log alone.
    pub fn rebuild_views(&mut self) {
        let mut index = CorrelationIndex::new();
        for entry in &self.log {
            index.record(&entry.event);
        }
        self.index = index;
        self.table = AggregationTable::rebuild(self.log.entries());
        if self.builder.is_stale(&self.layout, self.table.methods()) {
            self.layout = self.builder.build(self.table.methods());
            self.rebuilds += 1;
        }
        self.attributes = self.projector.project_all(&self.layout, &self.table);
        info!(events = self.log.len(), tools = self.table.len(), "views rebuilt from log");
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn correlation(&self) -> &CorrelationIndex {
        &self.index
    }

    pub fn tools(&self) -> &AggregationTable {
        &self.table
    }

    pub fn tool_stats(&self, method: &str) -> Option<&ToolStats> {
        self.table.get(method)
    }

    pub fn layout(&self) -> &TopologyLayout {
        &self.layout
    }

    pub fn attributes(&self) -> &ProjectedAttributes {
        &self.attributes
    }

    /// How many times the structure has been rebuilt.
    pub fn topology_rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn topology(&self) -> TopologyView {
        self.layout.view(&self.attributes)
    }

    pub fn metrics(&self, now_ms: u64) -> MetricsSnapshot {
        self.metrics.compute(self.log.entries(), now_ms)
    }

    /// Metrics over a different throughput window than the configured one.
    pub fn metrics_with_window(&self, window: Duration, now_ms: u64) -> MetricsSnapshot {
        MetricsCalculator::new(window).compute(self.log.entries(), now_ms)
    }

    pub fn latency_summary(&self) -> LatencySummary {
        metrics::latency_summary(self.log.entries())
    }

    pub fn timeline(&self, bucket: Duration) -> Vec<TimelineBucket> {
        metrics::timeline(self.log.entries(), bucket)
    }

    pub fn filter<'a>(
        &'a self,
        filter: &'a EventFilter,
    ) -> impl Iterator<Item = &'a LoggedEvent> + 'a {
        filter::filter_events(filter, self.log.entries())
    }

    pub fn unique_methods(&self) -> Vec<String> {
        filter::unique_methods(self.log.entries())
    }

    /// The first logged event carrying `request_id`, usually the call.
    pub fn event_for_request(&self, request_id: RequestId) -> Option<&LoggedEvent> {
        self.log
            .iter()
            .find(|entry| entry.event.request_id == Some(request_id))
    }

    /// Every logged event carrying `request_id`, in log order.
    pub fn events_for_request(&self, request_id: RequestId) -> impl Iterator<Item = &LoggedEvent> {
        self.log
            .iter()
            .filter(move |entry| entry.event.request_id == Some(request_id))
    }
}

#[cfg(test)]
mod tests {
    use sentinel_protocol::{Direction, EventStatus, NodeAttributes, NodeId, ToolAttributes};
    use serde_json::json;

    use super::*;

    fn tool_attributes<'a>(view: &'a TopologyView, method: &str) -> &'a ToolAttributes {
        let node = view.node(&NodeId::tool(method)).expect("tool node");
        match &node.attributes {
            NodeAttributes::Tool(attributes) => attributes,
            NodeAttributes::Hub(_) => panic!("expected tool attributes"),
        }
    }

    #[test]
    fn correlation_fallback_attributes_response() {
        let mut engine = TopologyEngine::default();
        engine.ingest(McpEvent::outbound("fs.read", 7));
        let report = engine.ingest(McpEvent::inbound(7).with_latency(25));

        assert_eq!(report.method.as_deref(), Some("fs.read"));
        assert!(!report.topology_rebuilt);
        let stats = engine.tool_stats("fs.read").expect("fs.read stats");
        assert_eq!(stats.inbound, 1);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn topology_is_stable_when_tool_already_known() {
        let mut engine = TopologyEngine::default();
        engine.ingest(McpEvent::outbound("fs.read", 1));
        engine.ingest(McpEvent::outbound("github.search", 2));
        let before = engine.topology();

        let report = engine.ingest(
            McpEvent::inbound(2)
                .with_latency(80)
                .with_payload(json!({"error": {"code": -1}})),
        );
        let after = engine.topology();

        assert!(!report.topology_rebuilt);
        assert_eq!(before.fingerprint, after.fingerprint);
        assert_eq!(before.nodes.len(), after.nodes.len());
        for (old, new) in before.nodes.iter().zip(&after.nodes) {
            assert_eq!(old.id, new.id);
            assert_eq!(old.position.x.to_bits(), new.position.x.to_bits());
            assert_eq!(old.position.y.to_bits(), new.position.y.to_bits());
        }
        for (old, new) in before.edges.iter().zip(&after.edges) {
            assert_eq!(old.id, new.id);
            assert_eq!(old.anchors, new.anchors);
        }
        assert_eq!(tool_attributes(&after, "github.search").status, EventStatus::Error);
    }

    #[test]
    fn new_tool_triggers_exactly_one_rebuild() {
        let mut engine = TopologyEngine::default();
        assert!(engine.ingest(McpEvent::outbound("fs.read", 1)).topology_rebuilt);
        assert!(!engine.ingest(McpEvent::outbound("fs.read", 2)).topology_rebuilt);
        assert!(engine.ingest(McpEvent::outbound("slack.post", 3)).topology_rebuilt);
        assert!(!engine.ingest(McpEvent::inbound(404)).topology_rebuilt);
        assert_eq!(engine.topology_rebuilds(), 2);
        assert_eq!(engine.layout().tool_count(), 2);
    }

    #[test]
    fn error_then_success_flips_node_and_edge() {
        let mut engine = TopologyEngine::default();
        engine.ingest(McpEvent::outbound("fs.read", 1));
        engine.ingest(McpEvent::inbound(1).with_payload(json!({"error": {"code": -1}})));

        let view = engine.topology();
        let attributes = tool_attributes(&view, "fs.read");
        assert_eq!(attributes.status, EventStatus::Error);
        assert_eq!(attributes.errors, 1);
        let edge = &view.edges[0];
        assert_eq!(edge.attributes.class, "edge-error");

        engine.ingest(McpEvent::outbound("fs.read", 2));
        engine.ingest(McpEvent::inbound(2).with_payload(json!({"result": {"text": "ok"}})));
        let view = engine.topology();
        assert_eq!(tool_attributes(&view, "fs.read").status, EventStatus::Success);
        assert_eq!(view.edges[0].attributes.class, "edge-success");
    }

    #[test]
    fn unattributed_events_stay_in_log_and_filters() {
        let mut engine = TopologyEngine::default();
        let report = engine.ingest(McpEvent::inbound(55).with_latency(10));
        assert_eq!(report.method, None);
        assert!(engine.tools().is_empty());
        assert_eq!(engine.topology().nodes.len(), 1);

        let mut filter = EventFilter::default();
        filter.toggle_direction(Direction::Inbound);
        assert_eq!(engine.filter(&filter).count(), 1);
    }

    #[test]
    fn rebuild_views_matches_incremental_state() {
        let mut engine = TopologyEngine::default();
        engine.ingest(McpEvent::outbound("fs.read", 1));
        engine.ingest(McpEvent::outbound("redis.get", 2));
        engine.ingest(McpEvent::inbound(2).with_latency(9).with_payload(json!({"error": "x"})));
        engine.ingest(McpEvent::inbound(1).with_latency(4));

        let incremental = engine.topology();
        let table = engine.tools().clone();
        engine.rebuild_views();

        assert_eq!(engine.topology(), incremental);
        assert_eq!(engine.tools(), &table);
        assert_eq!(engine.topology_rebuilds(), 2);
    }

    #[test]
    fn replay_matches_live_ingestion() {
        let events = vec![
            McpEvent::outbound("fs.read", 1),
            McpEvent::outbound("redis.get", 2),
            McpEvent::inbound(2).with_latency(9).with_payload(json!({"error": "x"})),
            McpEvent::outbound("fs.read", 2),
            McpEvent::inbound(1).with_latency(4),
        ];
        let mut live = TopologyEngine::default();
        for event in events.clone() {
            live.ingest(event);
        }
        let replayed = TopologyEngine::replay(EngineConfig::default(), events);

        assert_eq!(replayed.topology(), live.topology());
        assert_eq!(replayed.tools(), live.tools());
        assert_eq!(replayed.correlation().collisions(), 1);
        assert_eq!(replayed.topology_rebuilds(), 1);
    }

    #[test]
    fn request_lookup_returns_first_match() {
        let mut engine = TopologyEngine::default();
        engine.ingest(McpEvent::outbound("fs.read", 9));
        engine.ingest(McpEvent::inbound(9).with_latency(3));

        let first = engine.event_for_request(9).expect("call");
        assert_eq!(first.seq, 1);
        assert_eq!(engine.events_for_request(9).count(), 2);
        assert!(engine.event_for_request(10).is_none());
    }

    #[test]
    fn metrics_follow_configured_window() {
        let mut engine = TopologyEngine::new(
            EngineConfig::default().with_metrics_window(Duration::from_secs(10)),
        );
        engine.ingest(McpEvent::outbound("fs.read", 1).at(95_000));
        engine.ingest(McpEvent::outbound("fs.read", 2).at(50_000));

        assert_eq!(engine.metrics(100_000).requests_per_second, 0.1);
        assert_eq!(
            engine
                .metrics_with_window(Duration::from_secs(60), 100_000)
                .requests_per_second,
            2.0 / 60.0
        );
    }
}
