//! The MCP event record and the outcome derived from it.
//!
//! One `McpEvent` is produced for every JSON-RPC frame crossing the proxy:
//! `Outbound` for calls issued by the agent, `Inbound` for what comes back.
//! The JSONL recorder format is this struct serialized one per line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric JSON-RPC correlation key shared by a call and its response.
pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Response or notification coming back from a tool server.
    Inbound,
    /// Call issued by the agent.
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "Inbound",
            Self::Outbound => "Outbound",
        }
    }

    /// Case-insensitive parse, also accepting `in`/`out`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "inbound" | "in" => Some(Self::Inbound),
            "outbound" | "out" => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// Per-event status used by list filtering and edge styling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Success,
    Error,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" | "ok" => Some(Self::Success),
            "error" | "err" => Some(Self::Error),
            _ => None,
        }
    }
}

/// What a payload says about the call, classified once at ingestion.
///
/// The upstream protocol reports failure with a top-level `error` member on
/// the payload (never nested under `result`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResponseOutcome {
    Success { result: Value },
    Failure { error: Value },
    /// No payload was captured.
    Absent,
}

impl ResponseOutcome {
    pub fn classify(payload: Option<&Value>) -> Self {
        let Some(payload) = payload.filter(|p| !p.is_null()) else {
            return Self::Absent;
        };

        match payload.get("error") {
            Some(error) if !error.is_null() => Self::Failure {
                error: error.clone(),
            },
            _ => Self::Success {
                result: payload
                    .get("result")
                    .cloned()
                    .unwrap_or_else(|| payload.clone()),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn status(&self) -> EventStatus {
        if self.is_failure() {
            EventStatus::Error
        } else {
            EventStatus::Success
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpEvent {
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub direction: Direction,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl McpEvent {
    /// Current time in milliseconds since UNIX epoch.
    pub fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    pub fn new(direction: Direction) -> Self {
        Self {
            timestamp: Self::now_millis(),
            direction,
            method: None,
            request_id: None,
            latency_ms: None,
            payload: None,
            span_id: None,
        }
    }

    /// A call issued by the agent.
    pub fn outbound(method: impl Into<String>, request_id: RequestId) -> Self {
        Self {
            method: Some(method.into()),
            request_id: Some(request_id),
            ..Self::new(Direction::Outbound)
        }
    }

    /// A response that carries only the correlation key.
    pub fn inbound(request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            ..Self::new(Direction::Inbound)
        }
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_span(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    /// The event's own method name; empty strings count as missing.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref().filter(|m| !m.is_empty())
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }

    pub fn is_outbound(&self) -> bool {
        self.direction == Direction::Outbound
    }

    pub fn outcome(&self) -> ResponseOutcome {
        ResponseOutcome::classify(self.payload.as_ref())
    }
}
