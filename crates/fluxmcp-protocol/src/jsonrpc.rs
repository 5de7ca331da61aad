//! JSON-RPC 2.0 frame model.
//!
//! A [`Frame`] is the tagged union the spec describes in §3: requests carry
//! an id and a method, responses carry an id and exactly one of
//! result/error, notifications carry a method and no id. We model the three
//! shapes as distinct structs and an enum over them so the router can match
//! exhaustively (§8: "the router classifies uniquely").

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RpcError;

/// JSON-RPC request/response/notification id. MCP ids are either strings or
/// integers on the wire; we keep both representations rather than coercing
/// to one, matching what servers actually send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id, as produced by this client's own request counter.
    Number(i64),
    /// String id, as some servers (and our own cancellation bookkeeping) use.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        Self::Number(n as i64)
    }
}

/// An outbound or inbound JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Correlates with the eventual response.
    pub id: RequestId,
    /// The method being invoked, e.g. `"tools/list"`.
    pub method: String,
    /// Method parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A JSON-RPC response: exactly one of `result`/`error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Matches the id of the originating request.
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl ResponseFrame {
    /// Build a success response.
    #[must_use]
    pub fn success(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn failure(id: RequestId, error: RpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            result: None,
            error: Some(error),
        }
    }

    /// The result payload, if this is a success response.
    #[must_use]
    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    /// The error payload, if this is an error response.
    #[must_use]
    pub fn error(&self) -> Option<&RpcError> {
        self.error.as_ref()
    }

    /// Validate the invariant that exactly one of result/error is present.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.result.is_some() ^ self.error.is_some()
    }
}

/// A JSON-RPC notification: method with no id, no response expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFrame {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// The notification method, e.g. `"notifications/tools/list_changed"`.
    pub method: String,
    /// Notification parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Zero-sized marker type that (de)serializes as the literal string `"2.0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "2.0" {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {s}"
            )))
        }
    }
}

/// The tagged union over the three frame shapes, used when classifying a
/// frame parsed off the wire before it is known to be a request, response,
/// or notification.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A request — has `id` and `method`.
    Request(RequestFrame),
    /// A response — has `id` and exactly one of `result`/`error`.
    Response(ResponseFrame),
    /// A notification — has `method`, no `id`.
    Notification(NotificationFrame),
}

/// Raw shape used only to classify an incoming frame before committing to
/// one of the three concrete types. Every field is optional because we
/// don't yet know which variant we're looking at.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<serde_json::Value>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

impl Frame {
    /// Parse and classify a single JSON-RPC frame from raw bytes.
    ///
    /// Classification follows §8's "pairwise exclusive, cover all frames"
    /// rule: `id` absent + `method` present ⇒ notification (even if `id` is
    /// present but JSON `null`, per the testable property that null ids
    /// never block on a response); `id` present + `method` present ⇒
    /// request; `id` present + `method` absent ⇒ response.
    pub fn parse(bytes: &[u8]) -> crate::Result<Self> {
        let raw: RawFrame = serde_json::from_slice(bytes)
            .map_err(|e| crate::Error::invalid_format(format!("not valid JSON-RPC: {e}")))?;

        match (raw.id, raw.method) {
            (Some(id), Some(method)) => Ok(Self::Request(RequestFrame {
                jsonrpc: JsonRpcVersion,
                id,
                method,
                params: raw.params,
            })),
            (None, Some(method)) => Ok(Self::Notification(NotificationFrame {
                jsonrpc: JsonRpcVersion,
                method,
                params: raw.params,
            })),
            (Some(id), None) => {
                if raw.result.is_none() && raw.error.is_none() {
                    return Err(crate::Error::invalid_format(
                        "response frame missing both result and error",
                    ));
                }
                Ok(Self::Response(ResponseFrame {
                    jsonrpc: JsonRpcVersion,
                    id,
                    result: raw.result,
                    error: raw.error,
                }))
            }
            (None, None) => Err(crate::Error::invalid_format(
                "frame has neither id nor method",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request() {
        let bytes = br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        assert!(matches!(Frame::parse(bytes).unwrap(), Frame::Request(_)));
    }

    #[test]
    fn classifies_response() {
        let bytes = br#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        assert!(matches!(Frame::parse(bytes).unwrap(), Frame::Response(_)));
    }

    #[test]
    fn classifies_notification() {
        let bytes = br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        assert!(matches!(
            Frame::parse(bytes).unwrap(),
            Frame::Notification(_)
        ));
    }

    #[test]
    fn null_id_with_method_is_notification_not_request() {
        let bytes = br#"{"jsonrpc":"2.0","id":null,"method":"notifications/progress"}"#;
        assert!(matches!(
            Frame::parse(bytes).unwrap(),
            Frame::Notification(_)
        ));
    }

    #[test]
    fn response_requires_result_or_error() {
        let bytes = br#"{"jsonrpc":"2.0","id":1}"#;
        assert!(Frame::parse(bytes).is_err());
    }

    #[test]
    fn response_well_formed_invariant() {
        let ok = ResponseFrame::success(RequestId::Number(1), serde_json::json!({}));
        assert!(ok.is_well_formed());
        let err = ResponseFrame::failure(RequestId::Number(1), RpcError::method_not_found("x"));
        assert!(err.is_well_formed());
    }
}
