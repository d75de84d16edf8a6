//! # sentinel-protocol: shared contract types
//!
//! The records exchanged between the event feed, the aggregation engine and
//! the read API. Kept free of runtime dependencies (no tokio, no axum) so it
//! can be used as a pure contract crate.
//!
//! ## Module Overview
//!
//! - [`event`]: McpEvent, Direction, ResponseOutcome, EventStatus
//! - [`jsonrpc`]: JSON-RPC request/response shapes seen on the wire
//! - [`filter`]: EventFilter (five-dimension list filter configuration)
//! - [`topology`]: node/edge records handed to a renderer
//! - [`metrics`]: MetricsSnapshot, LatencySummary, TimelineBucket
//! - [`ids`]: typed node/edge identifiers
//! - [`error`]: SentinelError, SentinelResult

pub mod error;
pub mod event;
pub mod filter;
pub mod ids;
pub mod jsonrpc;
pub mod metrics;
pub mod topology;

pub use error::{SentinelError, SentinelResult};
pub use event::{Direction, EventStatus, McpEvent, RequestId, ResponseOutcome};
pub use filter::EventFilter;
pub use ids::{EdgeId, NodeId};
pub use jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
pub use metrics::{LatencySummary, MetricsSnapshot, TimelineBucket};
pub use topology::{
    Anchor, AnchorPair, EdgeAttributes, HubAttributes, NodeAttributes, NodeKind, Position,
    ToolAttributes, ToolFamily, TopologyEdge, TopologyNode, TopologyView, tool_icon, tool_label,
};
