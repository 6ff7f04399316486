//! Wire message types exchanged between the coordinator and clock nodes.
//!
//! Requests carry no correlation id: a node answers requests strictly in the
//! order it received them, so replies are matched positionally per connection.
use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Request kinds as they appear in the `kind` field on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    QueryTime,
    InjectCrash,
    InjectOffset,
    ResetFaults,
    Ping,
}

/// A request from the coordinator to a clock node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "WireRequest", into = "WireRequest")]
pub enum Request {
    QueryTime,
    InjectCrash,
    /// Injected clock offset in milliseconds
    InjectOffset(i64),
    ResetFaults,
    Ping,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
struct WireRequest {
    kind: RequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameter: Option<i64>,
}

impl Request {
    /// Build a request from a kind and an optional parameter.
    /// `INJECT_OFFSET` without a parameter means an offset of zero.
    pub fn new(kind: RequestKind, parameter: Option<i64>) -> Self {
        match kind {
            RequestKind::QueryTime => Request::QueryTime,
            RequestKind::InjectCrash => Request::InjectCrash,
            RequestKind::InjectOffset => Request::InjectOffset(parameter.unwrap_or(0)),
            RequestKind::ResetFaults => Request::ResetFaults,
            RequestKind::Ping => Request::Ping,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Request::QueryTime => RequestKind::QueryTime,
            Request::InjectCrash => RequestKind::InjectCrash,
            Request::InjectOffset(_) => RequestKind::InjectOffset,
            Request::ResetFaults => RequestKind::ResetFaults,
            Request::Ping => RequestKind::Ping,
        }
    }

    pub fn parameter(&self) -> Option<i64> {
        match self {
            Request::InjectOffset(ms) => Some(*ms),
            _ => None,
        }
    }
}

impl From<WireRequest> for Request {
    fn from(wire: WireRequest) -> Self {
        Request::new(wire.kind, wire.parameter)
    }
}

impl From<Request> for WireRequest {
    fn from(request: Request) -> Self {
        WireRequest {
            kind: request.kind(),
            parameter: request.parameter(),
        }
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::QueryTime => write!(f, "QUERY_TIME"),
            Request::InjectCrash => write!(f, "INJECT_CRASH"),
            Request::InjectOffset(ms) => write!(f, "INJECT_OFFSET({}ms)", ms),
            Request::ResetFaults => write!(f, "RESET_FAULTS"),
            Request::Ping => write!(f, "PING"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Ok,
    Error,
    Crashed,
}

/// A reply from a clock node; also used unsolicited as the registration announcement.
///
/// Two responses are considered equal when they come from the same node.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub node_id: NodeId,
    pub timestamp_millis: i64,
    pub status: ResponseStatus,
    #[serde(default)]
    pub message: String,
}

impl Response {
    pub fn new(
        node_id: NodeId,
        timestamp_millis: i64,
        status: ResponseStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            node_id,
            timestamp_millis,
            status,
            message: message.into(),
        }
    }

    pub fn ok(node_id: NodeId, timestamp_millis: i64, message: impl Into<String>) -> Self {
        Self::new(node_id, timestamp_millis, ResponseStatus::Ok, message)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

impl PartialEq for Response {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl Eq for Response {}

impl std::hash::Hash for Response {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.node_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_string(&Request::QueryTime).unwrap();
        assert_eq!(json, r#"{"kind":"QUERY_TIME"}"#);

        let json = serde_json::to_string(&Request::InjectOffset(-250)).unwrap();
        assert_eq!(json, r#"{"kind":"INJECT_OFFSET","parameter":-250}"#);
    }

    #[test]
    fn test_offset_without_parameter_is_zero() {
        let request: Request = serde_json::from_str(r#"{"kind":"INJECT_OFFSET"}"#).unwrap();
        assert_eq!(request, Request::InjectOffset(0));
    }

    #[test]
    fn test_parameter_ignored_for_other_kinds() {
        let request: Request =
            serde_json::from_str(r#"{"kind":"RESET_FAULTS","parameter":99}"#).unwrap();
        assert_eq!(request, Request::ResetFaults);
        assert_eq!(request.parameter(), None);
    }

    #[test]
    fn test_response_wire_shape() {
        let response = Response::ok(NodeId::new(4), 1_700_000_000_123, "time reported");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["nodeId"], 4);
        assert_eq!(json["timestampMillis"], 1_700_000_000_123i64);
        assert_eq!(json["status"], "OK");
        assert_eq!(json["message"], "time reported");
    }

    #[test]
    fn test_response_identity_is_node_id() {
        let a = Response::ok(NodeId::new(2), 1000, "a");
        let b = Response::new(NodeId::new(2), 2000, ResponseStatus::Crashed, "b");
        let c = Response::ok(NodeId::new(3), 1000, "a");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
