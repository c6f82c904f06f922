//! Subscription handles and notification routing.
//!
//! The connection task owns the socket; notifications tagged
//! `eth_subscription` are routed here by subscription id. When the socket
//! dies, every open subscription receives a terminal error on its error
//! channel — there is no resubscribe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RpcError;

/// The subscription id returned by `eth_subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entry {
    item_tx: mpsc::UnboundedSender<Value>,
    err_tx: mpsc::UnboundedSender<RpcError>,
}

/// Routes incoming notifications to registered subscriptions.
#[derive(Clone, Default)]
pub struct SubscriptionRouter {
    entries: Arc<Mutex<HashMap<SubscriptionId, Entry>>>,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription, returning its raw item and error receivers.
    pub fn register(
        &self,
        id: SubscriptionId,
    ) -> (
        mpsc::UnboundedReceiver<Value>,
        mpsc::UnboundedReceiver<RpcError>,
    ) {
        let (item_tx, item_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        self.entries
            .lock()
            .unwrap()
            .insert(id, Entry { item_tx, err_tx });
        (item_rx, err_rx)
    }

    /// Forward a notification payload to the matching subscription.
    /// Unknown ids are dropped (the node may push before registration lands).
    pub fn dispatch(&self, id: &SubscriptionId, payload: Value) {
        if let Some(entry) = self.entries.lock().unwrap().get(id) {
            let _ = entry.item_tx.send(payload);
        }
    }

    /// Remove a subscription after `eth_unsubscribe`.
    pub fn remove(&self, id: &SubscriptionId) {
        self.entries.lock().unwrap().remove(id);
    }

    /// Push a terminal error to every open subscription and drop them all.
    /// Called once when the connection dies.
    pub fn fail_all(&self, reason: &str) {
        let mut entries = self.entries.lock().unwrap();
        for (id, entry) in entries.drain() {
            tracing::debug!(subscription = %id, "failing subscription: {reason}");
            let _ = entry
                .err_tx
                .send(RpcError::WebSocket(reason.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A push subscription: an item channel, an error channel, and an
/// unsubscribe hook.
///
/// Consumers drive both channels from one `select!` loop; any error received
/// on `errors` means the subscription is dead. `unsubscribe()` is also fired
/// on drop, so abandoning the handle releases the server-side filter.
pub struct Subscription<T> {
    pub items: mpsc::UnboundedReceiver<T>,
    pub errors: mpsc::UnboundedReceiver<RpcError>,
    on_unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    pub fn new(
        items: mpsc::UnboundedReceiver<T>,
        errors: mpsc::UnboundedReceiver<RpcError>,
        on_unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            items,
            errors,
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    /// Release the subscription. Idempotent with drop.
    pub fn unsubscribe(mut self) {
        if let Some(hook) = self.on_unsubscribe.take() {
            hook();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(hook) = self.on_unsubscribe.take() {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn register_and_dispatch() {
        let router = SubscriptionRouter::new();
        let id = SubscriptionId("0xdeadbeef".into());
        let (mut items, _errors) = router.register(id.clone());

        router.dispatch(&id, serde_json::json!({"logIndex": "0x1"}));

        let payload = items.try_recv().unwrap();
        assert_eq!(payload["logIndex"], "0x1");
    }

    #[test]
    fn dispatch_unknown_id_is_dropped() {
        let router = SubscriptionRouter::new();
        // No panic, no effect
        router.dispatch(&SubscriptionId("0x404".into()), Value::Null);
    }

    #[test]
    fn fail_all_pushes_errors() {
        let router = SubscriptionRouter::new();
        let (_i1, mut e1) = router.register(SubscriptionId("0xa".into()));
        let (_i2, mut e2) = router.register(SubscriptionId("0xb".into()));

        router.fail_all("connection closed");

        assert!(matches!(e1.try_recv().unwrap(), RpcError::WebSocket(_)));
        assert!(matches!(e2.try_recv().unwrap(), RpcError::WebSocket(_)));
        assert!(router.is_empty());
    }

    #[test]
    fn unsubscribe_fires_once() {
        let count = Arc::new(AtomicU32::new(0));
        let (_tx, items) = mpsc::unbounded_channel::<Value>();
        let (_etx, errors) = mpsc::unbounded_channel();
        let c = Arc::clone(&count);
        let sub = Subscription::new(items, errors, move || {
            c.fetch_add(1, Ordering::Relaxed);
        });

        sub.unsubscribe(); // also drops
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn drop_fires_unsubscribe() {
        let count = Arc::new(AtomicU32::new(0));
        let (_tx, items) = mpsc::unbounded_channel::<Value>();
        let (_etx, errors) = mpsc::unbounded_channel();
        let c = Arc::clone(&count);
        drop(Subscription::new(items, errors, move || {
            c.fetch_add(1, Ordering::Relaxed);
        }));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
