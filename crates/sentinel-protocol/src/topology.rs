//! Topology records handed to a rendering collaborator.
//!
//! Structure (ids, positions, anchors) and attributes (status, counters) are
//! produced by separate passes and only merged into these records at the read
//! boundary.

use crate::event::{EventStatus, RequestId};
use crate::ids::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Connection point on a node's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Top,
    Right,
    Bottom,
    Left,
}

impl Anchor {
    pub fn opposite(self) -> Self {
        match self {
            Self::Top => Self::Bottom,
            Self::Right => Self::Left,
            Self::Bottom => Self::Top,
            Self::Left => Self::Right,
        }
    }
}

/// Where an edge leaves the hub and where it enters the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorPair {
    pub hub: Anchor,
    pub tool: Anchor,
}

impl AnchorPair {
    /// Exit the hub on `hub`, enter the tool from the opposite side.
    pub fn facing(hub: Anchor) -> Self {
        Self {
            hub,
            tool: hub.opposite(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Hub,
    Tool,
}

/// Tool cluster, derived from the method prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFamily {
    Databases,
    Github,
    Slack,
    Kubernetes,
    Llm,
    Filesystem,
    Browser,
    Billing,
    Monitoring,
    Other,
}

impl ToolFamily {
    pub fn from_method(method: &str) -> Self {
        let prefix = method.split('.').next().unwrap_or(method);
        match prefix {
            "postgres" | "redis" => Self::Databases,
            "github" => Self::Github,
            "slack" => Self::Slack,
            "kubernetes" => Self::Kubernetes,
            "llm" => Self::Llm,
            "fs" => Self::Filesystem,
            "browser" => Self::Browser,
            "billing" => Self::Billing,
            "monitoring" => Self::Monitoring,
            _ => Self::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Databases => "Databases",
            Self::Github => "GitHub",
            Self::Slack => "Slack",
            Self::Kubernetes => "Kubernetes",
            Self::Llm => "LLM Tools",
            Self::Filesystem => "Filesystem",
            Self::Browser => "Browser",
            Self::Billing => "Billing",
            Self::Monitoring => "Monitoring",
            Self::Other => "Other Tools",
        }
    }
}

/// Two-letter badge for a tool, keyed on the method prefix.
pub fn tool_icon(method: &str) -> &'static str {
    let prefix = method.split('.').next().unwrap_or(method);
    match prefix {
        "github" => "GH",
        "slack" => "SL",
        "postgres" => "PG",
        "redis" => "RD",
        "kubernetes" => "K8",
        "vector" => "VX",
        "llm" => "LM",
        "browser" => "WB",
        "fs" => "FS",
        "billing" => "BL",
        "monitoring" => "MN",
        _ => "TL",
    }
}

/// Short display label: the last dotted segment of the method.
pub fn tool_label(method: &str) -> &str {
    method
        .rsplit('.')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(method)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubAttributes {
    pub label: String,
}

impl Default for HubAttributes {
    fn default() -> Self {
        Self {
            label: "Agent".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolAttributes {
    pub method: String,
    pub label: String,
    pub cluster: ToolFamily,
    pub icon: String,
    pub status: EventStatus,
    pub calls: u64,
    pub outbound: u64,
    pub inbound: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_request_id: Option<RequestId>,
}

impl ToolAttributes {
    /// Attributes of a tool nothing has been projected onto yet.
    pub fn unstyled(method: &str) -> Self {
        Self {
            method: method.to_owned(),
            label: tool_label(method).to_owned(),
            cluster: ToolFamily::from_method(method),
            icon: tool_icon(method).to_owned(),
            status: EventStatus::Success,
            calls: 0,
            outbound: 0,
            inbound: 0,
            errors: 0,
            avg_latency_ms: 0.0,
            max_latency_ms: 0,
            last_request_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeAttributes {
    Hub(HubAttributes),
    Tool(ToolAttributes),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Position,
    pub attributes: NodeAttributes,
}

const SUCCESS_COLOR: &str = "#10b981";
const ERROR_COLOR: &str = "#ef4444";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeAttributes {
    pub status: EventStatus,
    pub class: String,
    pub color: String,
    pub stroke_width: f64,
}

impl EdgeAttributes {
    pub fn for_status(status: EventStatus) -> Self {
        match status {
            EventStatus::Success => Self {
                status,
                class: "edge-success".to_owned(),
                color: SUCCESS_COLOR.to_owned(),
                stroke_width: 2.5,
            },
            EventStatus::Error => Self {
                status,
                class: "edge-error".to_owned(),
                color: ERROR_COLOR.to_owned(),
                stroke_width: 3.0,
            },
        }
    }
}

impl Default for EdgeAttributes {
    fn default() -> Self {
        Self::for_status(EventStatus::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyEdge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub anchors: AnchorPair,
    pub attributes: EdgeAttributes,
}

/// Merged node/edge list for one read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyView {
    /// Content fingerprint of the tool set this structure was built for.
    pub fingerprint: String,
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
}

impl TopologyView {
    pub fn node(&self, id: &NodeId) -> Option<&TopologyNode> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&TopologyEdge> {
        self.edges.iter().find(|edge| &edge.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_follows_prefix() {
        assert_eq!(ToolFamily::from_method("redis.get"), ToolFamily::Databases);
        assert_eq!(ToolFamily::from_method("github.createIssue"), ToolFamily::Github);
        assert_eq!(ToolFamily::from_method("tools/call"), ToolFamily::Other);
        assert_eq!(ToolFamily::Llm.label(), "LLM Tools");
    }

    #[test]
    fn label_is_last_segment() {
        assert_eq!(tool_label("github.createIssue"), "createIssue");
        assert_eq!(tool_label("initialize"), "initialize");
        assert_eq!(tool_label("trailing."), "trailing.");
    }

    #[test]
    fn icon_defaults_to_generic_badge() {
        assert_eq!(tool_icon("kubernetes.scale"), "K8");
        assert_eq!(tool_icon("weather.today"), "TL");
    }

    #[test]
    fn error_edges_are_heavier() {
        let ok = EdgeAttributes::for_status(EventStatus::Success);
        let err = EdgeAttributes::for_status(EventStatus::Error);
        assert_eq!(ok.class, "edge-success");
        assert_eq!(err.class, "edge-error");
        assert!(err.stroke_width > ok.stroke_width);
        assert_eq!(EdgeAttributes::default(), ok);
    }

    #[test]
    fn anchor_pair_faces_opposite_side() {
        let pair = AnchorPair::facing(Anchor::Top);
        assert_eq!(pair.tool, Anchor::Bottom);
    }

    #[test]
    fn edge_record_uses_camel_case_endpoints() {
        let edge = TopologyEdge {
            id: EdgeId::for_tool("fs.read"),
            source_id: NodeId::hub(),
            target_id: NodeId::tool("fs.read"),
            anchors: AnchorPair::facing(Anchor::Top),
            attributes: EdgeAttributes::default(),
        };
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["sourceId"], "agent");
        assert_eq!(value["targetId"], "tool-fs.read");
        assert!(value.get("source_id").is_none());
        assert_eq!(value["attributes"]["stroke_width"], 2.5);
    }
}
