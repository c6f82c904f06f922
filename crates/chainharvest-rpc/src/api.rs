//! The adapter surface consumed by the harvesting engine.

use async_trait::async_trait;

use chainharvest_core::types::{FilterQuery, LogEvent, Transaction, TxHash};

use crate::error::RpcError;
use crate::subscriptions::Subscription;

/// Node RPC operations the engine depends on.
///
/// The concrete implementation is [`WsEthClient`](crate::client::WsEthClient);
/// tests substitute their own. Implementations must be safe for concurrent
/// read-only use — the scanner shares one handle across all spawned
/// per-event tasks.
#[async_trait]
pub trait EthRpc: Send + Sync {
    /// Current chain head block number. Used to resolve an unspecified scan
    /// end block.
    async fn head_number(&self) -> Result<u64, RpcError>;

    /// One blocking filtered-log query (`eth_getLogs`). Blocks until the
    /// page's results return; no timeout beyond the initial dial.
    async fn filter_logs(&self, query: &FilterQuery) -> Result<Vec<LogEvent>, RpcError>;

    /// Push subscription to new logs matching `query`.
    async fn subscribe_logs(&self, query: &FilterQuery)
        -> Result<Subscription<LogEvent>, RpcError>;

    /// Push subscription to pending-transaction hashes from the mempool.
    async fn subscribe_pending_txs(&self) -> Result<Subscription<TxHash>, RpcError>;

    /// Look up a transaction by hash. `None` if the node does not know it;
    /// the `bool` is `true` while the transaction is still pending.
    async fn transaction_by_hash(
        &self,
        hash: TxHash,
    ) -> Result<Option<(Transaction, bool)>, RpcError>;
}
