//! Live log subscriber.
//!
//! One push subscription, events handled synchronously in delivery order.
//! Any error on the subscription's error channel (or the channel closing,
//! which means the connection task died) terminates the component: the
//! subscription is released and the error propagates as fatal. No
//! reconnect, no backoff.

use std::sync::Arc;

use chainharvest_core::error::HarvestError;
use chainharvest_core::handler::EventHandler;
use chainharvest_core::types::FilterQuery;
use chainharvest_rpc::EthRpc;

/// Streams matching logs to a handler until the subscription dies.
pub struct LiveSubscriber<R> {
    rpc: Arc<R>,
    filter: FilterQuery,
    handler: Arc<dyn EventHandler>,
}

impl<R: EthRpc> LiveSubscriber<R> {
    pub fn new(rpc: Arc<R>, filter: FilterQuery, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            rpc,
            filter,
            handler,
        }
    }

    /// Subscribe and process events until the subscription errors.
    /// Always returns `Err`: the only exit is a terminal subscription error.
    pub async fn run(&self) -> Result<(), HarvestError> {
        let mut sub = self
            .rpc
            .subscribe_logs(&self.filter)
            .await
            .map_err(|e| HarvestError::Subscription(e.to_string()))?;

        tracing::info!("log subscription streaming");

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
                    None => break HarvestError::Subscription("event stream closed".into()),
                    Some(log) => {
                        if log.removed {
                            tracing::debug!(block = log.block_number, "skipping reorged log");
                            continue;
                        }
                        // Synchronous handling preserves delivery order.
                        if let Err(e) = self.handler.on_event(log).await {
                            tracing::warn!(error = %e, "event handler failed");
                        }
                    }
                }
            }
        };

        sub.unsubscribe();
        tracing::error!(error = %terminal, "log subscription terminated");
        Err(terminal)
    }
}
