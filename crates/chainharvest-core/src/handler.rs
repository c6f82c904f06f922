//! Handler and sink traits — the seams between the retrieval engine and
//! whatever consumes its output.
//!
//! Components receive these as explicit constructor dependencies rather than
//! writing to a process-global sink, so a test (or an embedding application)
//! can capture everything the engine emits.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::HarvestError;
use crate::types::{LogEvent, PendingCall};

// ─── Event handling ───────────────────────────────────────────────────────────

/// Consumes one [`LogEvent`]. The event is owned — it is ephemeral and not
/// retained by the engine after dispatch.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: LogEvent) -> Result<(), HarvestError>;
}

/// Consumes one [`PendingCall`] emitted by the mempool watcher.
#[async_trait]
pub trait PendingTxHandler: Send + Sync {
    async fn on_pending_call(&self, call: PendingCall) -> Result<(), HarvestError>;
}

// ─── Progress reporting ───────────────────────────────────────────────────────

/// Progress of a historical scan, reported once per completed window query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    /// Last block of the window whose query just completed.
    pub window_end: u64,
    /// Integer percentage of the requested range covered so far.
    /// Monotonically non-decreasing; reaches 100 only on the final window.
    pub percent: u64,
}

/// Receives scan progress updates.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: ScanProgress);
}

/// Default [`ProgressSink`] that emits a `tracing` info line per window.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_progress(&self, progress: ScanProgress) {
        tracing::info!(
            window_end = progress.window_end,
            percent = progress.percent,
            "scan progress"
        );
    }
}

/// [`EventHandler`] that logs each event and drops it.
///
/// Mirrors what a harvesting run looks like before a real consumer is wired
/// in: one info line per event.
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_event(&self, event: LogEvent) -> Result<(), HarvestError> {
        tracing::info!(
            address = %event.address,
            block = event.block_number,
            tx = %event.tx_hash,
            log_index = event.log_index,
            topics = event.topics.len(),
            data_len = event.data.len(),
            "log event"
        );
        Ok(())
    }
}

/// [`PendingTxHandler`] that logs each matching pending call.
#[derive(Debug, Default)]
pub struct LoggingPendingHandler;

#[async_trait]
impl PendingTxHandler for LoggingPendingHandler {
    async fn on_pending_call(&self, call: PendingCall) -> Result<(), HarvestError> {
        tracing::info!(
            pending = call.pending,
            tx_type = call.tx_type,
            from = %call.from,
            to = ?call.to,
            value = call.value,
            data_len = call.data.len(),
            "pending call to watched contract"
        );
        Ok(())
    }
}

/// Convenience alias for the shared handler references held by the engine.
pub type SharedEventHandler = Arc<dyn EventHandler>;
pub type SharedPendingHandler = Arc<dyn PendingTxHandler>;
pub type SharedProgressSink = Arc<dyn ProgressSink>;
