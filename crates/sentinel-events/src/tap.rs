//! Turns raw JSON-RPC traffic into events.
//!
//! Requests record a start instant keyed by id; the matching response is
//! stamped with the elapsed milliseconds and clears the entry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sentinel_protocol::{Direction, JsonRpcMessage, McpEvent, RequestId, SentinelResult};
use tracing::debug;

/// Pending calls older than this are dropped by `expire_pending`.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: HashMap<RequestId, Instant>,
    buffers: HashMap<Direction, Vec<u8>>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls still waiting for a response.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Decode one complete line. Blank lines yield `Ok(None)`.
    pub fn decode_line(
        &mut self,
        direction: Direction,
        line: &str,
    ) -> SentinelResult<Option<McpEvent>> {
        self.decode_line_at(direction, line, Instant::now())
    }

    fn decode_line_at(
        &mut self,
        direction: Direction,
        line: &str,
        now: Instant,
    ) -> SentinelResult<Option<McpEvent>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let message = JsonRpcMessage::parse(line)?;
        let latency_ms = if message.is_request() {
            if let Some(id) = message.id() {
                self.pending.insert(id, now);
            }
            None
        } else {
            message
                .id()
                .and_then(|id| self.pending.remove(&id))
                .map(|started| now.saturating_duration_since(started).as_millis() as u64)
        };

        McpEvent::from_message(direction, &message, latency_ms).map(Some)
    }

    /// Feed a raw chunk; every completed line is decoded, the remainder is
    /// buffered until its newline arrives.
    pub fn push_bytes(
        &mut self,
        direction: Direction,
        bytes: &[u8],
    ) -> Vec<SentinelResult<McpEvent>> {
        let mut lines = Vec::new();
        {
            let buffer = self.buffers.entry(direction).or_default();
            buffer.extend_from_slice(bytes);
            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                lines.push(String::from_utf8_lossy(&line[..newline]).into_owned());
            }
        }

        lines
            .iter()
            .filter_map(|line| self.decode_line(direction, line).transpose())
            .collect()
    }

    /// Bytes held for `direction` while waiting for a newline.
    pub fn buffered(&self, direction: Direction) -> usize {
        self.buffers.get(&direction).map_or(0, Vec::len)
    }

    pub fn expire_pending(&mut self, max_age: Duration) -> usize {
        self.expire_pending_at(max_age, Instant::now())
    }

    fn expire_pending_at(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, started| now.saturating_duration_since(*started) <= max_age);
        let expired = before - self.pending.len();
        if expired > 0 {
            debug!(expired, remaining = self.pending.len(), "expired pending calls");
        }
        expired
    }
}
