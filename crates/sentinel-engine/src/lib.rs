//! # sentinel-engine: incremental aggregation over an MCP event stream
//!
//! Every view here is a function of a prefix of the [`EventLog`]:
//!
//! - [`correlation`]: request id → method, recovered from outbound calls
//! - [`aggregate`]: per-tool counters, updated per event
//! - [`topology`]: hub-and-spoke layout, rebuilt only when the tool set changes
//! - [`projector`]: per-tool display attributes, recomputed every cycle
//! - [`metrics`]: throughput, error rate, tail latency
//! - [`filter`]: list filtering for table consumers
//!
//! [`TopologyEngine`] ties them into one write path; [`driver`] feeds it from
//! a single queue.

pub mod aggregate;
pub mod correlation;
pub mod driver;
pub mod engine;
pub mod filter;
pub mod log;
pub mod metrics;
pub mod projector;
pub mod topology;

pub use aggregate::{AggregationTable, LastInbound, ToolStats};
pub use correlation::CorrelationIndex;
pub use driver::{FeedSummary, SharedEngine, forward, run_feed, shared};
pub use engine::{CycleReport, EngineConfig, TopologyEngine};
pub use log::{EventLog, LoggedEvent, Seq};
pub use metrics::MetricsCalculator;
pub use projector::{ProjectedAttributes, StatsProjector, ToolProjection};
pub use topology::{LayoutConfig, TopologyBuilder, TopologyLayout, ToolSlot};
