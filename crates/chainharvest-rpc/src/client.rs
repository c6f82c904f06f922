//! WebSocket JSON-RPC client.
//!
//! One background task owns the socket: it correlates request/response pairs
//! by id, routes `eth_subscription` notifications, and answers server pings.
//! When the socket dies, all pending calls and open subscriptions receive a
//! terminal error and the task exits — there is no reconnect. A dropped
//! connection ends every component built on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use chainharvest_core::types::{FilterQuery, LogEvent, Transaction, TxHash};

use crate::api::EthRpc;
use crate::error::RpcError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::subscriptions::{Subscription, SubscriptionId, SubscriptionRouter};
use crate::wire;

/// Configuration for the WebSocket client.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Deadline for the initial dial. Calls made after a successful dial
    /// have no timeout — an unresponsive node blocks the caller.
    pub dial_timeout: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
        }
    }
}

enum WsCommand {
    Call {
        req: JsonRpcRequest,
        tx: oneshot::Sender<Result<Value, RpcError>>,
    },
}

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>;

/// WebSocket Ethereum JSON-RPC client.
pub struct WsEthClient {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    router: SubscriptionRouter,
    req_id: Arc<AtomicU64>,
}

impl WsEthClient {
    /// Connect to `url` within the configured deadline and start the
    /// connection task. Dial failure is fatal to the caller.
    pub async fn dial(url: impl Into<String>, config: WsClientConfig) -> Result<Self, RpcError> {
        let url = url.into();

        let connect = tokio_tungstenite::connect_async(&url);
        let (ws_stream, _) = tokio::time::timeout(config.dial_timeout, connect)
            .await
            .map_err(|_| RpcError::DialTimeout {
                ms: config.dial_timeout.as_millis() as u64,
            })?
            .map_err(|e| RpcError::Connect {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(url = %url, "connected");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let router = SubscriptionRouter::new();
        let router_clone = router.clone();

        tokio::spawn(async move {
            conn_task(ws_stream, cmd_rx, router_clone).await;
        });

        Ok(Self {
            url,
            cmd_tx,
            router,
            req_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.req_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn raw_call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let req = JsonRpcRequest::new(self.next_id(), method, params);
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Call { req, tx })
            .map_err(|_| RpcError::ChannelClosed)?;
        rx.await.map_err(|_| RpcError::ChannelClosed)?
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let value = self.raw_call(method, params).await?;
        serde_json::from_value(value).map_err(|e| RpcError::invalid(method, e.to_string()))
    }

    /// Issue `eth_subscribe` and register the returned id with the router.
    async fn subscribe_raw(
        &self,
        params: Vec<Value>,
    ) -> Result<
        (
            SubscriptionId,
            mpsc::UnboundedReceiver<Value>,
            mpsc::UnboundedReceiver<RpcError>,
        ),
        RpcError,
    > {
        let id: String = self.call("eth_subscribe", params).await?;
        let sub_id = SubscriptionId(id);
        let (items, errors) = self.router.register(sub_id.clone());
        Ok((sub_id, items, errors))
    }

    /// Build the unsubscribe hook for `sub_id`: drop the routing entry and
    /// fire `eth_unsubscribe` without waiting for the reply.
    fn unsubscribe_hook(&self, sub_id: SubscriptionId) -> impl FnOnce() + Send + 'static {
        let cmd_tx = self.cmd_tx.clone();
        let router = self.router.clone();
        let req_id = Arc::clone(&self.req_id);
        move || {
            router.remove(&sub_id);
            let req = JsonRpcRequest::new(
                req_id.fetch_add(1, Ordering::Relaxed),
                "eth_unsubscribe",
                vec![Value::String(sub_id.0.clone())],
            );
            let (tx, _rx) = oneshot::channel();
            let _ = cmd_tx.send(WsCommand::Call { req, tx });
        }
    }
}

#[async_trait]
impl EthRpc for WsEthClient {
    async fn head_number(&self) -> Result<u64, RpcError> {
        let hex: String = self.call("eth_blockNumber", vec![]).await?;
        wire::parse_hex_u64(&hex)
            .ok_or_else(|| RpcError::invalid("eth_blockNumber", format!("bad quantity '{hex}'")))
    }

    async fn filter_logs(&self, query: &FilterQuery) -> Result<Vec<LogEvent>, RpcError> {
        let result = self
            .raw_call("eth_getLogs", vec![wire::filter_params(query)])
            .await?;
        let items = result
            .as_array()
            .ok_or_else(|| RpcError::invalid("eth_getLogs", "result is not an array"))?;
        items.iter().map(wire::parse_log).collect()
    }

    async fn subscribe_logs(
        &self,
        query: &FilterQuery,
    ) -> Result<Subscription<LogEvent>, RpcError> {
        let params = vec![Value::String("logs".into()), wire::filter_params(query)];
        let (sub_id, mut raw_items, errors) = self.subscribe_raw(params).await?;
        tracing::debug!(subscription = %sub_id, "log subscription established");

        // Decode pushed payloads off the connection task. A payload that does
        // not parse as a log is skipped, not fatal.
        let (typed_tx, typed_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(payload) = raw_items.recv().await {
                match wire::parse_log(&payload) {
                    Ok(log) => {
                        if typed_tx.send(log).is_err() {
                            break; // subscriber dropped
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping malformed pushed log"),
                }
            }
        });

        Ok(Subscription::new(
            typed_rx,
            errors,
            self.unsubscribe_hook(sub_id),
        ))
    }

    async fn subscribe_pending_txs(&self) -> Result<Subscription<TxHash>, RpcError> {
        let params = vec![Value::String("newPendingTransactions".into())];
        let (sub_id, mut raw_items, errors) = self.subscribe_raw(params).await?;
        tracing::debug!(subscription = %sub_id, "pending-tx subscription established");

        let (typed_tx, typed_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(payload) = raw_items.recv().await {
                let hash = payload.as_str().and_then(|s| TxHash::parse(s).ok());
                match hash {
                    Some(h) => {
                        if typed_tx.send(h).is_err() {
                            break;
                        }
                    }
                    None => tracing::warn!("skipping malformed pending-tx notification"),
                }
            }
        });

        Ok(Subscription::new(
            typed_rx,
            errors,
            self.unsubscribe_hook(sub_id),
        ))
    }

    async fn transaction_by_hash(
        &self,
        hash: TxHash,
    ) -> Result<Option<(Transaction, bool)>, RpcError> {
        let result = self
            .raw_call(
                "eth_getTransactionByHash",
                vec![Value::String(hash.to_string())],
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        wire::parse_transaction(&result).map(Some)
    }
}

// ─── Connection task ──────────────────────────────────────────────────────────

async fn conn_task(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    router: SubscriptionRouter,
) {
    let (mut sink, mut stream) = ws_stream.split();
    let mut pending: PendingMap = HashMap::new();

    let close_reason: String = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                // Client handle dropped; close politely.
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break "client closed".into();
                }
                Some(WsCommand::Call { req, tx }) => {
                    let text = match serde_json::to_string(&req) {
                        Ok(t) => t,
                        Err(e) => {
                            let _ = tx.send(Err(RpcError::WebSocket(e.to_string())));
                            continue;
                        }
                    };
                    pending.insert(req.id, tx);
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break format!("send failed: {e}");
                    }
                }
            },
            msg = stream.next() => match msg {
                None => break "stream ended".into(),
                Some(Err(e)) => break format!("receive failed: {e}"),
                Some(Ok(Message::Text(text))) => {
                    route_message(&text, &mut pending, &router);
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => break "closed by server".into(),
                Some(Ok(_)) => {} // binary / pong — ignore
            },
        }
    };

    tracing::warn!(reason = %close_reason, "connection task exiting");
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(RpcError::WebSocket(close_reason.clone())));
    }
    router.fail_all(&close_reason);
}

/// Route one incoming text frame: subscription notification or call response.
fn route_message(text: &str, pending: &mut PendingMap, router: &SubscriptionRouter) {
    let Ok(v) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("ignoring non-JSON frame");
        return;
    };

    if v.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        if let Some(params) = v.get("params") {
            if let Some(id) = params.get("subscription").and_then(Value::as_str) {
                let payload = params.get("result").cloned().unwrap_or(Value::Null);
                router.dispatch(&SubscriptionId(id.to_string()), payload);
            }
        }
        return;
    }

    if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(text) {
        if let Some(tx) = pending.remove(&resp.id) {
            let _ = tx.send(resp.into_result().map_err(RpcError::Rpc));
        }
    }
}
