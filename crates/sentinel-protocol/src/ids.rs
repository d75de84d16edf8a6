//! Typed identifiers for topology nodes and edges.
//!
//! IDs are opaque String wrappers (serde-transparent). They are derived from
//! the tool's method name, so an unchanged tool keeps the same id across
//! every cycle.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Identifier of a node in the topology graph.
    NodeId
);
typed_id!(
    /// Identifier of a hub-to-tool edge.
    EdgeId
);

const HUB_ID: &str = "agent";
const TOOL_PREFIX: &str = "tool-";
const EDGE_PREFIX: &str = "edge-";

impl NodeId {
    /// The single hub node every tool edge starts from.
    pub fn hub() -> Self {
        Self(HUB_ID.to_owned())
    }

    pub fn tool(method: &str) -> Self {
        Self(format!("{TOOL_PREFIX}{method}"))
    }

    pub fn is_hub(&self) -> bool {
        self.0 == HUB_ID
    }

    /// The method name behind a tool node id, `None` for the hub.
    pub fn method(&self) -> Option<&str> {
        self.0.strip_prefix(TOOL_PREFIX)
    }
}

impl EdgeId {
    pub fn for_tool(method: &str) -> Self {
        Self(format!("{EDGE_PREFIX}{TOOL_PREFIX}{method}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_id_is_agent() {
        let id = NodeId::hub();
        assert_eq!(id.as_str(), "agent");
        assert!(id.is_hub());
        assert_eq!(id.method(), None);
    }

    #[test]
    fn tool_id_round_trips_method() {
        let id = NodeId::tool("github.createIssue");
        assert_eq!(id.as_str(), "tool-github.createIssue");
        assert_eq!(id.method(), Some("github.createIssue"));
        assert!(!id.is_hub());
    }

    #[test]
    fn edge_id_is_derived_from_tool_node() {
        let id = EdgeId::for_tool("fs.read");
        assert_eq!(id.to_string(), "edge-tool-fs.read");
    }

    #[test]
    fn typed_id_serializes_transparently() {
        let id = NodeId::from_string("tool-x");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"tool-x\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
