//! chainharvest-rpc — WebSocket JSON-RPC adapter.
//!
//! Owns the live node connection and exposes the [`EthRpc`] surface the
//! engine components consume: historical filtered-log queries, push
//! subscriptions to logs and pending-transaction hashes, and
//! transaction-by-hash lookup.
//!
//! Deliberate non-features, inherited from the harvesting policy: no
//! reconnect, no per-call timeout beyond the initial dial, no retry. A dead
//! connection surfaces as a terminal error on every open call and
//! subscription.

pub mod api;
pub mod client;
pub mod error;
pub mod request;
pub mod subscriptions;
pub mod wire;

pub use api::EthRpc;
pub use client::{WsClientConfig, WsEthClient};
pub use error::RpcError;
pub use subscriptions::{Subscription, SubscriptionId};
