//! Mempool filter & decoder.
//!
//! Subscribes to pending-transaction hashes, resolves and decodes each one,
//! and forwards only calls touching the watched contract. The asymmetry is
//! deliberate and load-bearing: the hash feed itself is a precondition (any
//! subscription error is fatal), while individual hashes are opportunistic —
//! a failed lookup or decode is logged and skipped without interrupting the
//! stream.

use std::sync::Arc;

use chainharvest_core::error::HarvestError;
use chainharvest_core::handler::PendingTxHandler;
use chainharvest_core::types::{Address, PendingCall, TxHash};
use chainharvest_evm::MessageDecoder;
use chainharvest_rpc::EthRpc;

/// Which side of a decoded message must equal the watched address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchDirection {
    /// Match transactions sent **to** the contract (the usual DEX-router case).
    #[default]
    Recipient,
    /// Match transactions sent **by** the watched address.
    Sender,
}

/// Watches the mempool for transactions touching one contract.
pub struct MempoolWatcher<R> {
    rpc: Arc<R>,
    target: Address,
    decoder: MessageDecoder,
    handler: Arc<dyn PendingTxHandler>,
    direction: MatchDirection,
}

impl<R: EthRpc> MempoolWatcher<R> {
    pub fn new(
        rpc: Arc<R>,
        target: Address,
        decoder: MessageDecoder,
        handler: Arc<dyn PendingTxHandler>,
    ) -> Self {
        Self {
            rpc,
            target,
            decoder,
            handler,
            direction: MatchDirection::default(),
        }
    }

    /// Match on the sender side instead of the recipient side.
    pub fn with_direction(mut self, direction: MatchDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Subscribe and process hashes until the subscription errors.
    /// Always returns `Err`: the only exit is a terminal subscription error.
    pub async fn run(&self) -> Result<(), HarvestError> {
        let mut sub = self
            .rpc
            .subscribe_pending_txs()
            .await
            .map_err(|e| HarvestError::Subscription(e.to_string()))?;

        tracing::info!(target = %self.target, "mempool watch streaming");

        let terminal: HarvestError = loop {
            tokio::select! {
                err = sub.errors.recv() => {
                    let reason = match err {
                        Some(e) => e.to_string(),
                        None => "subscription error channel closed".into(),
                    };
                    break HarvestError::Subscription(reason);
                }
                item = sub.items.recv() => match item {
                    None => break HarvestError::Subscription("hash stream closed".into()),
                    Some(hash) => self.process_hash(hash).await,
                }
            }
        };

        sub.unsubscribe();
        tracing::error!(error = %terminal, "mempool watch terminated");
        Err(terminal)
    }

    /// Resolve → decode → filter one pending hash. Every failure in here is
    /// per-item: log and move on.
    async fn process_hash(&self, hash: TxHash) {
        let (tx, pending) = match self.rpc.transaction_by_hash(hash).await {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                tracing::warn!(%hash, "transaction not found");
                return;
            }
            Err(e) => {
                tracing::warn!(%hash, error = %e, "transaction lookup failed");
                return;
            }
        };

        let message = match self.decoder.decode(&tx) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(%hash, error = %e, "message decode failed");
                return;
            }
        };

        let matched = match self.direction {
            MatchDirection::Recipient => message.to == Some(self.target),
            MatchDirection::Sender => message.from == self.target,
        };
        if !matched {
            return;
        }

        let call = PendingCall {
            pending,
            tx_type: tx.tx_type,
            from: message.from,
            to: message.to,
            value: message.value,
            data: message.data,
        };
        if let Err(e) = self.handler.on_pending_call(call).await {
            tracing::warn!(%hash, error = %e, "pending-call handler failed");
        }
    }
}
