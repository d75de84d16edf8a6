//! request id → method, recovered from outbound calls.
//!
//! Responses usually omit the method; the index lets them be attributed to the
//! tool that issued the call. Entries live as long as the log does.

use std::collections::HashMap;

use sentinel_protocol::{McpEvent, RequestId};
use tracing::warn;

#[derive(Debug, Default, Clone)]
pub struct CorrelationIndex {
    by_request: HashMap<RequestId, String>,
    collisions: u64,
}

impl CorrelationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an outbound call carrying both a method and a request id.
    ///
    /// A reused id overwrites the earlier mapping (last write wins) and is
    /// counted as a collision. Returns true when the event was indexed.
    pub fn record(&mut self, event: &McpEvent) -> bool {
        if !event.is_outbound() {
            return false;
        }
        let (Some(method), Some(request_id)) = (event.method(), event.request_id) else {
            return false;
        };

        if let Some(previous) = self.by_request.insert(request_id, method.to_owned())
            && previous != method
        {
            self.collisions += 1;
            warn!(
                request_id,
                previous = %previous,
                current = %method,
                "request id reused by a different method"
            );
        }
        true
    }

    /// The event's own method, else the method indexed for its request id.
    pub fn resolve<'a>(&'a self, event: &'a McpEvent) -> Option<&'a str> {
        event
            .method()
            .or_else(|| event.request_id.and_then(|id| self.method_for(id)))
    }

    /// Method of the latest outbound call indexed under `request_id`.
    pub fn method_for(&self, request_id: RequestId) -> Option<&str> {
        self.by_request.get(&request_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_request.is_empty()
    }

    /// How many outbound calls reused an id already mapped to another method.
    pub fn collisions(&self) -> u64 {
        self.collisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_without_method_resolves_through_index() {
        let mut index = CorrelationIndex::new();
        assert!(index.record(&McpEvent::outbound("fs.read", 7)));

        let response = McpEvent::inbound(7);
        assert_eq!(index.resolve(&response), Some("fs.read"));
    }

    #[test]
    fn own_method_wins_over_index() {
        let mut index = CorrelationIndex::new();
        index.record(&McpEvent::outbound("fs.read", 7));
        let response = McpEvent::inbound(7).with_method("fs.stat");
        assert_eq!(index.resolve(&response), Some("fs.stat"));
    }

    #[test]
    fn unknown_request_id_is_unresolved() {
        let index = CorrelationIndex::new();
        assert_eq!(index.resolve(&McpEvent::inbound(99)), None);

        let mut anonymous = McpEvent::inbound(1);
        anonymous.request_id = None;
        assert_eq!(index.resolve(&anonymous), None);
    }

    #[test]
    fn inbound_events_are_never_indexed() {
        let mut index = CorrelationIndex::new();
        assert!(!index.record(&McpEvent::inbound(3).with_method("fs.read")));
        assert!(index.is_empty());
    }

    #[test]
    fn reused_id_keeps_latest_mapping_and_counts_collision() {
        let mut index = CorrelationIndex::new();
        index.record(&McpEvent::outbound("fs.read", 5));
        index.record(&McpEvent::outbound("fs.write", 5));
        assert_eq!(index.method_for(5), Some("fs.write"));
        assert_eq!(index.collisions(), 1);

        index.record(&McpEvent::outbound("fs.write", 5));
        assert_eq!(index.collisions(), 1);
    }
}
