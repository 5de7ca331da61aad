//! Unified error taxonomy for the FluxMCP client.
//!
//! A single [`Error`] enum covers every failure mode the protocol engine can
//! surface to a caller, per the kinds enumerated in the client
//! specification: transport loss, session expiry, timeouts, cancellation,
//! server-reported JSON-RPC errors, tool execution errors, protocol
//! violations, host misconfiguration, and capability gaps.

use std::fmt;

/// Result type alias used throughout the FluxMCP crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the protocol engine can return to a caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The transport connection could not be established or was lost.
    /// Fatal to the current session; call `restart` to recover.
    #[error("transport failed: {0}")]
    TransportFailed(String),

    /// A streamable-HTTP server reported the session is gone (404). The
    /// coordinator re-initializes transparently and retries the request once.
    #[error("session expired")]
    SessionExpired,

    /// A request's deadline elapsed before a response arrived.
    #[error("request {request_id} timed out")]
    TimeoutError {
        /// The id of the request that timed out.
        request_id: String,
    },

    /// The request was cancelled, either by the host or by the peer.
    #[error("request cancelled")]
    Cancelled,

    /// The server returned a JSON-RPC error object, surfaced verbatim.
    #[error("server error {code}: {message}")]
    ResponseError {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// A tool call completed with `isError: true`.
    #[error("tool execution error: {0}")]
    ExecutionError(String),

    /// A frame did not conform to the JSON-RPC 2.0 / MCP wire shape.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),

    /// An inbound request named a method the client has no handler for.
    #[error("unknown request method: {0}")]
    UnknownRequest(String),

    /// No mutually acceptable protocol version could be negotiated.
    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(String),

    /// The host misused the API (bad transport config, missing url, etc).
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The host asked for an operation the server did not advertise.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),
}

impl Error {
    /// Shorthand for [`Error::TransportFailed`].
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailed(message.into())
    }

    /// Shorthand for [`Error::InvalidFormat`].
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat(message.into())
    }

    /// Shorthand for [`Error::ConfigurationError`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    /// Shorthand for [`Error::CapabilityUnavailable`].
    pub fn capability_unavailable(capability: impl Into<String>) -> Self {
        Self::CapabilityUnavailable(capability.into())
    }

    /// Shorthand for [`Error::UnknownRequest`].
    pub fn unknown_request(method: impl Into<String>) -> Self {
        Self::UnknownRequest(method.into())
    }

    /// The JSON-RPC error code that best represents this error, for replies
    /// the client sends back to the server (e.g. a failed inbound handler).
    #[must_use]
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            Self::InvalidFormat(_) => -32700,
            Self::UnknownRequest(_) => -32601,
            Self::ConfigurationError(_) => -32602,
            Self::ResponseError { code, .. } => *code,
            Self::CapabilityUnavailable(_) => -32000,
            Self::UnsupportedProtocolVersion(_) => -32000,
            Self::Cancelled => -32800,
            Self::TimeoutError { .. } => -32801,
            Self::TransportFailed(_) | Self::SessionExpired => -32603,
            Self::ExecutionError(_) => -32602,
        }
    }

    /// True if retrying the originating call is plausible without host
    /// intervention (distinct from `SessionExpired`, which the coordinator
    /// retries automatically exactly once).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailed(_) | Self::TimeoutError { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::TransportFailed(err.to_string())
    }
}

/// A JSON-RPC error object as it appears on the wire (`{code, message, data}`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured error payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Build a `-32601 Method not found` error for the given method name.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    /// Build a server-defined error (`-32000`..`-32099` range) with a
    /// caller-supplied message.
    #[must_use]
    pub fn server_error(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl From<RpcError> for Error {
    fn from(err: RpcError) -> Self {
        Self::ResponseError {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonrpc_code_mapping() {
        assert_eq!(Error::UnknownRequest("x".into()).jsonrpc_code(), -32601);
        assert_eq!(
            Error::ResponseError {
                code: -32001,
                message: "nope".into(),
                data: None
            }
            .jsonrpc_code(),
            -32001
        );
    }

    #[test]
    fn retryable_kinds() {
        assert!(Error::transport("boom").is_retryable());
        assert!(
            Error::TimeoutError {
                request_id: "1".into()
            }
            .is_retryable()
        );
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn method_not_found_shape() {
        let err = RpcError::method_not_found("frobnicate");
        assert_eq!(err.code, -32601);
        assert!(err.message.contains("frobnicate"));
    }
}
