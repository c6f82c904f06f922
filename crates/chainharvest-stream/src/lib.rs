//! Retrieval engine: the three long-running components of a harvesting
//! deployment.
//!
//! - [`RangeScanner`] — paginated historical scan over a closed block range
//! - [`LiveSubscriber`] — push subscription streaming new logs as they land
//! - [`MempoolWatcher`] — pending-transaction filter for one watched contract
//!
//! All three take their node access as an [`EthRpc`](chainharvest_rpc::EthRpc)
//! handle and their output sinks as handler trait objects, so they run the
//! same against a live websocket endpoint or a test double.

pub mod config;
pub mod live;
pub mod mempool;
pub mod scanner;

pub use config::ScanConfig;
pub use live::LiveSubscriber;
pub use mempool::{MatchDirection, MempoolWatcher};
pub use scanner::{progress_percent, RangeScanner, ScanReport};
