//! Adapter-level error types.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors from the RPC adapter.
///
/// The pipeline maps these onto its own policy: connection and query errors
/// are fatal, a lookup error for one pending hash is skipped.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Dial failed (refused, DNS, TLS handshake, ...).
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// Dial did not complete within the configured deadline.
    #[error("connect timed out after {ms}ms")]
    DialTimeout { ms: u64 },

    /// WebSocket send/receive error, or the connection closed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Protocol-level error returned by the node.
    #[error("{0}")]
    Rpc(JsonRpcError),

    /// Response shape did not match what the method contract promises.
    #[error("invalid response for {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    /// The background connection task is gone; no further calls can be made.
    #[error("connection task closed")]
    ChannelClosed,
}

impl RpcError {
    pub(crate) fn invalid(method: &str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}
