//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the historical range scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Window width in blocks for each filtered-log query.
    #[serde(default = "default_window")]
    pub window: u64,
    /// Maximum number of event handlers running at once. Dispatch of further
    /// events waits for a slot; query pagination itself is never concurrent.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
}

fn default_window() -> u64 {
    2048
}

fn default_max_inflight() -> usize {
    64
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            max_inflight: default_max_inflight(),
        }
    }
}
