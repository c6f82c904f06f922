//! Error types for the harvesting pipeline.

use thiserror::Error;

/// A hex string that failed to parse into a fixed-width byte value.
#[derive(Debug, Clone, Error)]
#[error("invalid {expected}-byte hex value: '{input}'")]
pub struct HexParseError {
    pub expected: usize,
    pub input: String,
}

/// Errors that terminate a harvesting component.
///
/// Everything here is fatal by policy: the scan aborts, the subscription
/// loop stops and the process exits non-zero. Per-item failures in the
/// mempool watcher use [`DecodeError`] and are never surfaced as a
/// `HarvestError`.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("connection failed: {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("filter query failed for blocks {from}..={to}: {reason}")]
    Query { from: u64, to: u64, reason: String },

    #[error("subscription terminated: {0}")]
    Subscription(String),

    #[error("invalid block range: from {from} > to {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("handler error: {0}")]
    Handler(String),
}

/// Errors extracting a [`Message`](crate::types::Message) from a transaction.
///
/// Recoverable at the call site: the mempool watcher logs and skips the item.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("transaction has no sender field")]
    MissingSender,

    #[error("typed transaction (type {tx_type}) declares no chain id")]
    MissingChainId { tx_type: u8 },

    #[error("chain id mismatch: expected {expected}, transaction declares {declared}")]
    ChainIdMismatch { expected: u64, declared: u64 },

    #[error("replay protection mismatch: v = {v} does not encode chain id {chain_id}")]
    ReplayProtection { v: u64, chain_id: u64 },

    #[error("invalid value field '{0}'")]
    InvalidValue(String),
}
