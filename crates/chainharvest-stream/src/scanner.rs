//! Historical range scanner.
//!
//! Partitions `[start, end]` into fixed-width windows, issues one blocking
//! filtered-log query per window, and dispatches every returned event to its
//! own task. Dispatch is admission-gated by a counting semaphore so a dense
//! range cannot spawn an unbounded number of handlers. Any query error aborts
//! the whole scan: there is no checkpoint, a restart re-specifies `start`.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use chainharvest_core::error::HarvestError;
use chainharvest_core::handler::{EventHandler, ProgressSink, ScanProgress};
use chainharvest_core::types::{BlockRange, FilterQuery};
use chainharvest_rpc::EthRpc;

use crate::config::ScanConfig;

/// Summary returned once every spawned handler has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Blocks covered (inclusive).
    pub blocks: u64,
    /// Events dispatched to handlers.
    pub events: u64,
    /// Handlers that returned an error or panicked.
    pub handler_failures: u64,
}

/// Progress percentage after the window ending at `window_end` completes.
///
/// Monotonically non-decreasing across a scan; exactly 100 only once
/// `window_end == end`. A single-block range reports 100 immediately.
pub fn progress_percent(start: u64, end: u64, window_end: u64) -> u64 {
    if end == start {
        return 100;
    }
    ((window_end - start) as u128 * 100 / (end - start) as u128) as u64
}

/// Scans a historical block range for matching events.
pub struct RangeScanner<R> {
    rpc: Arc<R>,
    filter: FilterQuery,
    config: ScanConfig,
    handler: Arc<dyn EventHandler>,
    progress: Arc<dyn ProgressSink>,
}

impl<R: EthRpc + 'static> RangeScanner<R> {
    /// `filter` carries the address/topic selection; its block range is set
    /// per window by the scanner.
    pub fn new(
        rpc: Arc<R>,
        filter: FilterQuery,
        config: ScanConfig,
        handler: Arc<dyn EventHandler>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            rpc,
            filter,
            config,
            handler,
            progress,
        }
    }

    /// Run the scan over `[start, end]`, `end` defaulting to the current
    /// chain head. Blocks until every window is queried **and** every spawned
    /// handler has finished; the report is emitted exactly once, after that
    /// single join barrier.
    pub async fn scan(&self, start: u64, end: Option<u64>) -> Result<ScanReport, HarvestError> {
        let end = match end {
            Some(e) => e,
            None => self
                .rpc
                .head_number()
                .await
                .map_err(|e| HarvestError::Rpc(e.to_string()))?,
        };
        let range = BlockRange::new(start, end)?;

        tracing::info!(start, end, window = self.config.window, "scan starting");

        let gate = Arc::new(Semaphore::new(self.config.max_inflight));
        let mut tasks: JoinSet<Result<(), HarvestError>> = JoinSet::new();
        let mut events: u64 = 0;

        for window in range.windows(self.config.window) {
            let query = self.filter.clone().range(window);
            let logs = self
                .rpc
                .filter_logs(&query)
                .await
                .map_err(|e| HarvestError::Query {
                    from: window.from(),
                    to: window.to(),
                    reason: e.to_string(),
                })?;

            tracing::debug!(
                from = window.from(),
                to = window.to(),
                logs = logs.len(),
                "window queried"
            );

            for log in logs {
                events += 1;
                // Admission gate: wait for a slot before spawning. The
                // semaphore is never closed, so acquire cannot fail.
                let permit = Arc::clone(&gate)
                    .acquire_owned()
                    .await
                    .expect("admission gate closed");
                let handler = Arc::clone(&self.handler);
                tasks.spawn(async move {
                    let _permit = permit;
                    handler.on_event(log).await
                });
            }

            self.progress.on_progress(ScanProgress {
                window_end: window.to(),
                percent: progress_percent(start, end, window.to()),
            });
        }

        // Single join barrier spanning the entire scan. Handlers from an
        // early window may still be running while later windows dispatch;
        // completion is observed only here.
        let mut handler_failures: u64 = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    handler_failures += 1;
                    tracing::warn!(error = %e, "event handler failed");
                }
                Err(e) => {
                    handler_failures += 1;
                    tracing::warn!(error = %e, "event handler panicked");
                }
            }
        }

        let report = ScanReport {
            blocks: range.len(),
            events,
            handler_failures,
        };
        tracing::info!(
            blocks = report.blocks,
            events = report.events,
            failures = report.handler_failures,
            "scan complete"
        );
        Ok(report)
    }
}
