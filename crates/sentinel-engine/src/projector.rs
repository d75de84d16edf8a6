//! Projects aggregated statistics onto the tool nodes and edges of a layout.
//!
//! The output is a plain attribute map keyed by method. It never carries ids,
//! positions or anchors; those stay in [`TopologyLayout`].

use std::collections::HashMap;

use sentinel_protocol::{EdgeAttributes, EventStatus, ToolAttributes};

use crate::aggregate::AggregationTable;
use crate::topology::TopologyLayout;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolProjection {
    pub node: ToolAttributes,
    pub edge: EdgeAttributes,
}

/// Display attributes for every tool, replaced wholesale per cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectedAttributes {
    tools: HashMap<String, ToolProjection>,
}

impl ProjectedAttributes {
    pub fn get(&self, method: &str) -> Option<&ToolProjection> {
        self.tools.get(method)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn insert(&mut self, method: &str, projection: ToolProjection) {
        self.tools.insert(method.to_owned(), projection);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsProjector;

impl StatsProjector {
    /// Attributes for one tool. `None` when the table has no stats for it.
    ///
    /// Status follows the most recent response attributed to the tool; a tool
    /// with no response yet is shown as succeeding.
    pub fn project_tool(&self, table: &AggregationTable, method: &str) -> Option<ToolProjection> {
        let stats = table.get(method)?;
        let status = table
            .last_inbound(method)
            .map(|last| last.status)
            .unwrap_or(EventStatus::Success);

        let node = ToolAttributes {
            status,
            calls: stats.total,
            outbound: stats.outbound,
            inbound: stats.inbound,
            errors: stats.errors,
            avg_latency_ms: stats.avg_latency(),
            max_latency_ms: stats.max_latency,
            last_request_id: stats.last_request_id,
            ..ToolAttributes::unstyled(method)
        };

        Some(ToolProjection {
            node,
            edge: EdgeAttributes::for_status(status),
        })
    }

    /// Project every tool node the layout holds.
    pub fn project_all(
        &self,
        layout: &TopologyLayout,
        table: &AggregationTable,
    ) -> ProjectedAttributes {
        let mut projected = ProjectedAttributes::default();
        for slot in layout.slots() {
            if let Some(projection) = self.project_tool(table, &slot.method) {
                projected.insert(&slot.method, projection);
            }
        }
        projected
    }

    /// Refresh a single tool in place; other tools keep their attributes.
    ///
    /// Methods without a slot in `layout` are ignored.
    pub fn refresh(
        &self,
        projected: &mut ProjectedAttributes,
        layout: &TopologyLayout,
        table: &AggregationTable,
        method: &str,
    ) {
        if layout.slot(method).is_none() {
            return;
        }
        if let Some(projection) = self.project_tool(table, method) {
            projected.insert(method, projection);
        }
    }
}
