//! JSON-RPC 2.0 frames as they cross the proxy.

use crate::error::{SentinelError, SentinelResult};
use crate::event::{Direction, McpEvent, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Requests are tried first: anything carrying a `method` is a call or a
/// notification, everything else is a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    pub fn parse(line: &str) -> SentinelResult<Self> {
        serde_json::from_str(line).map_err(|error| SentinelError::MalformedFrame(error.to_string()))
    }

    pub fn id(&self) -> Option<RequestId> {
        match self {
            Self::Request(request) => request.id,
            Self::Response(response) => response.id,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(request) => Some(&request.method),
            Self::Response(_) => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

impl McpEvent {
    /// Build the event record for one decoded frame. The whole frame becomes
    /// the payload, so a response's `error` member lands at the payload's
    /// top level.
    pub fn from_message(
        direction: Direction,
        message: &JsonRpcMessage,
        latency_ms: Option<u64>,
    ) -> SentinelResult<Self> {
        let payload = serde_json::to_value(message)?;
        Ok(Self {
            method: message.method().map(str::to_owned),
            request_id: message.id(),
            latency_ms,
            payload: Some(payload),
            ..Self::new(direction)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventStatus;

    #[test]
    fn request_line_parses_as_request() {
        let message = JsonRpcMessage::parse(
            r#"{"jsonrpc":"2.0","id":3,"method":"github.createIssue","params":{"title":"x"}}"#,
        )
        .unwrap();
        assert!(message.is_request());
        assert_eq!(message.id(), Some(3));
        assert_eq!(message.method(), Some("github.createIssue"));
    }

    #[test]
    fn error_response_becomes_failed_event() {
        let message = JsonRpcMessage::parse(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"no such tool"}}"#,
        )
        .unwrap();
        assert!(!message.is_request());

        let event = McpEvent::from_message(Direction::Inbound, &message, Some(12)).unwrap();
        assert_eq!(event.method(), None);
        assert_eq!(event.request_id, Some(3));
        assert_eq!(event.latency_ms, Some(12));
        assert_eq!(event.outcome().status(), EventStatus::Error);
    }

    #[test]
    fn notification_has_no_id() {
        let message =
            JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert_eq!(message.id(), None);
        assert!(message.is_request());
    }

    #[test]
    fn garbage_is_malformed_frame() {
        let err = JsonRpcMessage::parse("not json").unwrap_err();
        assert!(matches!(err, SentinelError::MalformedFrame(_)));
    }
}
