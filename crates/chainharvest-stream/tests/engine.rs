//! End-to-end tests for the three engine components against a scripted
//! [`EthRpc`] double.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use chainharvest_core::error::HarvestError;
use chainharvest_core::handler::{
    EventHandler, PendingTxHandler, ProgressSink, ScanProgress,
};
use chainharvest_core::types::{
    Address, FilterQuery, LogEvent, PendingCall, Transaction, TxHash,
};
use chainharvest_evm::MessageDecoder;
use chainharvest_rpc::{EthRpc, RpcError, Subscription};
use chainharvest_stream::{
    LiveSubscriber, MatchDirection, MempoolWatcher, RangeScanner, ScanConfig,
};

const CHAIN_ID: u64 = 43114;

// ─── Scripted RPC double ──────────────────────────────────────────────────────

enum TxLookup {
    Found(Transaction, bool),
    Missing,
    Fail,
}

#[derive(Default)]
struct MockRpc {
    head: u64,
    /// Canned `filter_logs` results keyed by the window's first block.
    window_logs: HashMap<u64, Vec<LogEvent>>,
    /// Window start at which `filter_logs` returns an error.
    fail_from: Option<u64>,
    /// Recorded `filter_logs` windows, in call order.
    queries: Mutex<Vec<(u64, u64)>>,
    /// Items pushed on a log subscription before its item channel closes.
    live_logs: Vec<LogEvent>,
    /// Error pushed on a log subscription instead of items.
    live_error: Option<String>,
    /// Hashes pushed on a pending-tx subscription before it closes.
    pending_hashes: Vec<TxHash>,
    lookups: HashMap<TxHash, TxLookup>,
    unsubscribes: Arc<AtomicU32>,
    /// Senders parked here stay open for the test's lifetime, so the
    /// corresponding channel never reports closure.
    keep_alive: Mutex<Vec<Box<dyn std::any::Any + Send>>>,
}

impl MockRpc {
    fn subscription<T: Send + 'static>(
        &self,
        items: Vec<T>,
        error: Option<String>,
    ) -> Subscription<T> {
        let (item_tx, item_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();

        match error {
            Some(reason) => {
                // Keep the item channel open so the error is the only
                // observable outcome.
                let _ = err_tx.send(RpcError::WebSocket(reason));
                self.keep_alive.lock().unwrap().push(Box::new(item_tx));
            }
            None => {
                for item in items {
                    let _ = item_tx.send(item);
                }
                // Items drain, then the closed item channel terminates the
                // consumer; the error channel stays open and silent.
                self.keep_alive.lock().unwrap().push(Box::new(err_tx));
            }
        }

        let unsubs = Arc::clone(&self.unsubscribes);
        Subscription::new(item_rx, err_rx, move || {
            unsubs.fetch_add(1, Ordering::SeqCst);
        })
    }
}

#[async_trait]
impl EthRpc for MockRpc {
    async fn head_number(&self) -> Result<u64, RpcError> {
        Ok(self.head)
    }

    async fn filter_logs(&self, query: &FilterQuery) -> Result<Vec<LogEvent>, RpcError> {
        let range = query.range.expect("scanner always sets a window range");
        self.queries
            .lock()
            .unwrap()
            .push((range.from(), range.to()));
        if self.fail_from == Some(range.from()) {
            return Err(RpcError::WebSocket("query refused".into()));
        }
        Ok(self
            .window_logs
            .get(&range.from())
            .cloned()
            .unwrap_or_default())
    }

    async fn subscribe_logs(
        &self,
        _query: &FilterQuery,
    ) -> Result<Subscription<LogEvent>, RpcError> {
        Ok(self.subscription(self.live_logs.clone(), self.live_error.clone()))
    }

    async fn subscribe_pending_txs(&self) -> Result<Subscription<TxHash>, RpcError> {
        Ok(self.subscription(self.pending_hashes.clone(), None))
    }

    async fn transaction_by_hash(
        &self,
        hash: TxHash,
    ) -> Result<Option<(Transaction, bool)>, RpcError> {
        match self.lookups.get(&hash) {
            Some(TxLookup::Found(tx, pending)) => Ok(Some((tx.clone(), *pending))),
            Some(TxLookup::Missing) | None => Ok(None),
            Some(TxLookup::Fail) => Err(RpcError::WebSocket("lookup refused".into())),
        }
    }
}

// ─── Recording sinks ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Collector {
    events: Mutex<Vec<LogEvent>>,
    fail_on_block: Option<u64>,
}

#[async_trait]
impl EventHandler for Collector {
    async fn on_event(&self, event: LogEvent) -> Result<(), HarvestError> {
        if self.fail_on_block == Some(event.block_number) {
            return Err(HarvestError::Handler("rejected".into()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[derive(Default)]
struct PendingCollector {
    calls: Mutex<Vec<PendingCall>>,
}

#[async_trait]
impl PendingTxHandler for PendingCollector {
    async fn on_pending_call(&self, call: PendingCall) -> Result<(), HarvestError> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[derive(Default)]
struct ProgressLog(Mutex<Vec<ScanProgress>>);

impl ProgressSink for ProgressLog {
    fn on_progress(&self, progress: ScanProgress) {
        self.0.lock().unwrap().push(progress);
    }
}

fn log_at(block: u64, index: u32) -> LogEvent {
    LogEvent {
        address: Address([0x11; 20]),
        topics: vec![],
        data: vec![],
        block_number: block,
        tx_hash: TxHash([0xcc; 32]),
        log_index: index,
        removed: false,
    }
}

fn legacy_tx(hash: TxHash, to: Option<Address>, v: u64) -> Transaction {
    Transaction {
        hash,
        chain_id: None,
        tx_type: 0,
        from: Some(Address([0x01; 20])),
        to,
        value: "0x2386f26fc10000".into(), // 0.01 ether
        input: vec![0xa9, 0x05, 0x9c, 0xbb],
        v,
    }
}

// ─── Range scanner ────────────────────────────────────────────────────────────

#[tokio::test]
async fn scanner_paginates_and_reports_progress() {
    let mut rpc = MockRpc::default();
    rpc.window_logs.insert(0, vec![log_at(10, 0), log_at(11, 1)]);
    rpc.window_logs.insert(8192, vec![log_at(9999, 0)]);
    let rpc = Arc::new(rpc);

    let handler = Arc::new(Collector::default());
    let progress = Arc::new(ProgressLog::default());
    let scanner = RangeScanner::new(
        Arc::clone(&rpc),
        FilterQuery::default(),
        ScanConfig::default(),
        Arc::clone(&handler) as _,
        Arc::clone(&progress) as _,
    );

    let report = scanner.scan(0, Some(10_000)).await.unwrap();
    assert_eq!(report.blocks, 10_001);
    assert_eq!(report.events, 3);
    assert_eq!(report.handler_failures, 0);

    // Fixed-width windows, in order, last one clipped to the end block
    assert_eq!(
        *rpc.queries.lock().unwrap(),
        vec![
            (0, 2047),
            (2048, 4095),
            (4096, 6143),
            (6144, 8191),
            (8192, 10_000),
        ]
    );

    // One progress update per window, percent non-decreasing, 100 only last
    let updates = progress.0.lock().unwrap();
    let percents: Vec<u64> = updates.iter().map(|p| p.percent).collect();
    assert_eq!(percents, vec![20, 40, 61, 81, 100]);
    assert_eq!(updates.last().unwrap().window_end, 10_000);

    // Every event was dispatched exactly once
    assert_eq!(handler.events.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn scanner_defaults_end_to_chain_head() {
    let rpc = Arc::new(MockRpc {
        head: 5_000,
        ..MockRpc::default()
    });
    let scanner = RangeScanner::new(
        Arc::clone(&rpc),
        FilterQuery::default(),
        ScanConfig::default(),
        Arc::new(Collector::default()),
        Arc::new(ProgressLog::default()),
    );

    let report = scanner.scan(1_000, None).await.unwrap();
    assert_eq!(report.blocks, 4_001);
    assert_eq!(rpc.queries.lock().unwrap().last().unwrap().1, 5_000);
}

#[tokio::test]
async fn scanner_aborts_on_query_error() {
    let rpc = Arc::new(MockRpc {
        fail_from: Some(2048),
        ..MockRpc::default()
    });
    let scanner = RangeScanner::new(
        Arc::clone(&rpc),
        FilterQuery::default(),
        ScanConfig::default(),
        Arc::new(Collector::default()),
        Arc::new(ProgressLog::default()),
    );

    let err = scanner.scan(0, Some(10_000)).await.unwrap_err();
    assert!(matches!(
        err,
        HarvestError::Query {
            from: 2048,
            to: 4095,
            ..
        }
    ));
    // No further windows were attempted after the failure
    assert_eq!(rpc.queries.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn scanner_counts_handler_failures_without_aborting() {
    let mut rpc = MockRpc::default();
    rpc.window_logs
        .insert(0, vec![log_at(1, 0), log_at(2, 0), log_at(3, 0)]);
    let handler = Arc::new(Collector {
        fail_on_block: Some(2),
        ..Collector::default()
    });
    let scanner = RangeScanner::new(
        Arc::new(rpc),
        FilterQuery::default(),
        ScanConfig::default(),
        Arc::clone(&handler) as _,
        Arc::new(ProgressLog::default()),
    );

    let report = scanner.scan(0, Some(100)).await.unwrap();
    assert_eq!(report.events, 3);
    assert_eq!(report.handler_failures, 1);
    assert_eq!(handler.events.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn scanner_rejects_inverted_range() {
    let scanner = RangeScanner::new(
        Arc::new(MockRpc::default()),
        FilterQuery::default(),
        ScanConfig::default(),
        Arc::new(Collector::default()),
        Arc::new(ProgressLog::default()),
    );
    assert!(matches!(
        scanner.scan(10, Some(5)).await.unwrap_err(),
        HarvestError::InvalidRange { from: 10, to: 5 }
    ));
}

// ─── Live subscriber ──────────────────────────────────────────────────────────

#[tokio::test]
async fn live_handles_events_until_stream_closes() {
    let mut reorged = log_at(51, 0);
    reorged.removed = true;
    let rpc = Arc::new(MockRpc {
        live_logs: vec![log_at(50, 0), reorged, log_at(52, 0)],
        ..MockRpc::default()
    });

    let handler = Arc::new(Collector::default());
    let live = LiveSubscriber::new(
        Arc::clone(&rpc),
        FilterQuery::default(),
        Arc::clone(&handler) as _,
    );

    let err = live.run().await.unwrap_err();
    assert!(matches!(err, HarvestError::Subscription(_)));

    // Reorged log skipped, everything else delivered in order
    let events = handler.events.lock().unwrap();
    let blocks: Vec<u64> = events.iter().map(|e| e.block_number).collect();
    assert_eq!(blocks, vec![50, 52]);

    // Termination released the subscription
    assert_eq!(rpc.unsubscribes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn live_terminates_on_subscription_error() {
    let rpc = Arc::new(MockRpc {
        live_error: Some("filter expired".into()),
        ..MockRpc::default()
    });
    let handler = Arc::new(Collector::default());
    let live = LiveSubscriber::new(
        Arc::clone(&rpc),
        FilterQuery::default(),
        Arc::clone(&handler) as _,
    );

    let err = live.run().await.unwrap_err();
    match err {
        HarvestError::Subscription(reason) => assert!(reason.contains("filter expired")),
        other => panic!("expected subscription error, got {other}"),
    }
    assert!(handler.events.lock().unwrap().is_empty());
    assert_eq!(rpc.unsubscribes.load(Ordering::SeqCst), 1);
}

// ─── Mempool watcher ──────────────────────────────────────────────────────────

#[tokio::test]
async fn mempool_emits_only_matching_decodable_transactions() {
    let target = Address([0x77; 20]);
    let h_fail = TxHash([1; 32]);
    let h_missing = TxHash([2; 32]);
    let h_undecodable = TxHash([3; 32]);
    let h_other = TxHash([4; 32]);
    let h_match = TxHash([5; 32]);

    let mut rpc = MockRpc {
        pending_hashes: vec![h_fail, h_missing, h_undecodable, h_other, h_match],
        ..MockRpc::default()
    };
    rpc.lookups.insert(h_fail, TxLookup::Fail);
    rpc.lookups.insert(h_missing, TxLookup::Missing);
    // v = 37 encodes chain id 1, rejected by a chain-43114 decoder
    rpc.lookups.insert(
        h_undecodable,
        TxLookup::Found(legacy_tx(h_undecodable, Some(target), 37), true),
    );
    rpc.lookups.insert(
        h_other,
        TxLookup::Found(
            legacy_tx(h_other, Some(Address([0x99; 20])), CHAIN_ID * 2 + 35),
            true,
        ),
    );
    rpc.lookups.insert(
        h_match,
        TxLookup::Found(legacy_tx(h_match, Some(target), CHAIN_ID * 2 + 36), true),
    );

    let handler = Arc::new(PendingCollector::default());
    let watcher = MempoolWatcher::new(
        Arc::new(rpc),
        target,
        MessageDecoder::new(CHAIN_ID),
        Arc::clone(&handler) as _,
    );

    // Per-item failures are skipped; only stream closure is terminal
    let err = watcher.run().await.unwrap_err();
    assert!(matches!(err, HarvestError::Subscription(_)));

    let calls = handler.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert!(call.pending);
    assert_eq!(call.tx_type, 0);
    assert_eq!(call.from, Address([0x01; 20]));
    assert_eq!(call.to, Some(target));
    assert_eq!(call.value, 10_000_000_000_000_000); // 0.01 ether
    assert_eq!(call.data, vec![0xa9, 0x05, 0x9c, 0xbb]);
}

#[tokio::test]
async fn mempool_matches_sender_side_including_contract_creation() {
    let sender = Address([0x01; 20]);
    let h_create = TxHash([6; 32]);
    let h_other_sender = TxHash([7; 32]);

    let mut rpc = MockRpc {
        pending_hashes: vec![h_create, h_other_sender],
        ..MockRpc::default()
    };
    rpc.lookups.insert(
        h_create,
        TxLookup::Found(legacy_tx(h_create, None, 27), false),
    );
    let mut foreign = legacy_tx(h_other_sender, None, 27);
    foreign.from = Some(Address([0x42; 20]));
    rpc.lookups
        .insert(h_other_sender, TxLookup::Found(foreign, true));

    let handler = Arc::new(PendingCollector::default());
    let watcher = MempoolWatcher::new(
        Arc::new(rpc),
        sender,
        MessageDecoder::new(CHAIN_ID),
        Arc::clone(&handler) as _,
    )
    .with_direction(MatchDirection::Sender);

    let _ = watcher.run().await.unwrap_err();

    let calls = handler.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].from, sender);
    assert_eq!(calls[0].to, None);
    assert!(!calls[0].pending);
}
