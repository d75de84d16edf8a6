//! The append-only event log, the single source of truth.

use sentinel_protocol::{EventStatus, McpEvent, ResponseOutcome};
use serde::Serialize;

/// Position of an entry in the log, starting at 1.
pub type Seq = u64;

/// An event as committed: its position plus the outcome classified once at
/// ingestion, so downstream passes never re-inspect the payload shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedEvent {
    pub seq: Seq,
    #[serde(flatten)]
    pub event: McpEvent,
    #[serde(skip)]
    pub outcome: ResponseOutcome,
}

impl LoggedEvent {
    pub fn status(&self) -> EventStatus {
        self.outcome.status()
    }

    /// Only responses count as failed calls.
    pub fn is_failed_response(&self) -> bool {
        self.event.is_inbound() && self.outcome.is_failure()
    }
}

#[derive(Debug, Default, Clone)]
pub struct EventLog {
    entries: Vec<LoggedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: McpEvent) -> &LoggedEvent {
        let seq = self.entries.len() as Seq + 1;
        let outcome = event.outcome();
        self.entries.push(LoggedEvent {
            seq,
            event,
            outcome,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, seq: Seq) -> Option<&LoggedEvent> {
        let index = usize::try_from(seq).ok()?.checked_sub(1)?;
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&LoggedEvent> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[LoggedEvent] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LoggedEvent> {
        self.entries.iter()
    }

    /// The first `len` entries, as a log of their own.
    pub fn prefix(&self, len: usize) -> &[LoggedEvent] {
        &self.entries[..len.min(self.entries.len())]
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a LoggedEvent;
    type IntoIter = std::slice::Iter<'a, LoggedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequence_numbers_start_at_one() {
        let mut log = EventLog::new();
        assert_eq!(log.append(McpEvent::outbound("fs.read", 1)).seq, 1);
        assert_eq!(log.append(McpEvent::inbound(1)).seq, 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(2).map(|e| e.seq), Some(2));
        assert!(log.get(0).is_none());
        assert!(log.get(3).is_none());
    }

    #[test]
    fn outcome_is_classified_on_append() {
        let mut log = EventLog::new();
        let entry = log.append(McpEvent::inbound(4).with_payload(json!({"error": {"code": -1}})));
        assert!(entry.is_failed_response());
        assert_eq!(entry.status(), EventStatus::Error);
    }

    #[test]
    fn outbound_with_error_member_is_not_a_failed_response() {
        let mut log = EventLog::new();
        let entry = log.append(McpEvent::outbound("x.y", 1).with_payload(json!({"error": 1})));
        assert!(!entry.is_failed_response());
        assert_eq!(entry.status(), EventStatus::Error);
    }

    #[test]
    fn prefix_is_clamped() {
        let mut log = EventLog::new();
        log.append(McpEvent::outbound("fs.read", 1));
        assert_eq!(log.prefix(10).len(), 1);
        assert!(log.prefix(0).is_empty());
    }
}
