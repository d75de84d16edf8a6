//! Stable graph structure: one hub, one node and one edge per known tool.
//!
//! A layout is a pure function of the sorted tool set. It is rebuilt only when
//! the fingerprint of that set changes, so attribute updates never move a
//! node or re-anchor an edge.

use std::f64::consts::TAU;

use sentinel_protocol::{
    Anchor, AnchorPair, EdgeId, HubAttributes, NodeAttributes, NodeId, NodeKind, Position,
    ToolAttributes, TopologyEdge, TopologyNode, TopologyView,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::projector::ProjectedAttributes;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub center: Position,
    pub radius: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            center: Position::new(600.0, 400.0),
            radius: 320.0,
        }
    }
}

/// Content fingerprint of a tool set, independent of input order.
pub fn fingerprint<'a>(methods: impl IntoIterator<Item = &'a str>) -> String {
    let mut sorted: Vec<&str> = methods.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = Sha256::new();
    for method in sorted {
        hasher.update((method.len() as u64).to_le_bytes());
        hasher.update(method.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Anchor pair for tool `index` of `count`.
///
/// The ring angle `2π·i/n − π/2` is normalized into `[0, 2π)` and split into
/// four quarter bands starting at 0. Computed on integers so a node sitting
/// exactly on a band edge always lands in the upper band.
pub fn anchors_for(index: usize, count: usize) -> AnchorPair {
    if count == 0 {
        return AnchorPair::facing(Anchor::Top);
    }
    let band = ((4 * index + 3 * count) / count) % 4;
    let hub = match band {
        0 => Anchor::Right,
        1 => Anchor::Bottom,
        2 => Anchor::Left,
        _ => Anchor::Top,
    };
    AnchorPair::facing(hub)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSlot {
    pub method: String,
    pub node_id: NodeId,
    pub edge_id: EdgeId,
    pub position: Position,
    pub anchors: AnchorPair,
}

/// The authoritative structure store. Nothing but the builder writes it.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyLayout {
    fingerprint: String,
    hub: Position,
    slots: Vec<ToolSlot>,
}

impl TopologyLayout {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn hub_position(&self) -> Position {
        self.hub
    }

    pub fn slots(&self) -> &[ToolSlot] {
        &self.slots
    }

    pub fn slot(&self, method: &str) -> Option<&ToolSlot> {
        self.slots
            .binary_search_by(|slot| slot.method.as_str().cmp(method))
            .ok()
            .map(|index| &self.slots[index])
    }

    pub fn tool_count(&self) -> usize {
        self.slots.len()
    }

    /// Merge structure with projected attributes for one read.
    ///
    /// Tools the projector has not covered yet get unstyled attributes.
    pub fn view(&self, attributes: &ProjectedAttributes) -> TopologyView {
        let mut nodes = Vec::with_capacity(self.slots.len() + 1);
        let mut edges = Vec::with_capacity(self.slots.len());

        nodes.push(TopologyNode {
            id: NodeId::hub(),
            kind: NodeKind::Hub,
            position: self.hub,
            attributes: NodeAttributes::Hub(HubAttributes::default()),
        });

        for slot in &self.slots {
            let projection = attributes.get(&slot.method);
            let node_attributes = projection
                .map(|p| p.node.clone())
                .unwrap_or_else(|| ToolAttributes::unstyled(&slot.method));
            let edge_attributes = projection.map(|p| p.edge.clone()).unwrap_or_default();

            nodes.push(TopologyNode {
                id: slot.node_id.clone(),
                kind: NodeKind::Tool,
                position: slot.position,
                attributes: NodeAttributes::Tool(node_attributes),
            });
            edges.push(TopologyEdge {
                id: slot.edge_id.clone(),
                source_id: NodeId::hub(),
                target_id: slot.node_id.clone(),
                anchors: slot.anchors,
                attributes: edge_attributes,
            });
        }

        TopologyView {
            fingerprint: self.fingerprint.clone(),
            nodes,
            edges,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    config: LayoutConfig,
}

impl TopologyBuilder {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// True when `methods` would produce a different structure than `current`.
    pub fn is_stale<'a>(
        &self,
        current: &TopologyLayout,
        methods: impl IntoIterator<Item = &'a str>,
    ) -> bool {
        current.fingerprint != fingerprint(methods)
    }

    pub fn build<'a>(&self, methods: impl IntoIterator<Item = &'a str>) -> TopologyLayout {
        let mut sorted: Vec<&str> = methods.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let count = sorted.len();
        let LayoutConfig { center, radius } = self.config;
        let slots = sorted
            .iter()
            .enumerate()
            .map(|(index, method)| {
                let theta = TAU * index as f64 / count as f64 - TAU / 4.0;
                ToolSlot {
                    method: (*method).to_owned(),
                    node_id: NodeId::tool(method),
                    edge_id: EdgeId::for_tool(method),
                    position: Position::new(
                        center.x + radius * theta.cos(),
                        center.y + radius * theta.sin(),
                    ),
                    anchors: anchors_for(index, count),
                }
            })
            .collect();

        TopologyLayout {
            fingerprint: fingerprint(sorted.iter().copied()),
            hub: center,
            slots,
        }
    }
}
