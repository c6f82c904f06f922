//! chainharvest-core — shared foundation for the on-chain activity harvester.
//!
//! # Architecture
//!
//! ```text
//! RangeScanner / LiveSubscriber / MempoolWatcher   (chainharvest-stream)
//!        │ depend on
//!        ▼
//! EthRpc adapter (chainharvest-rpc)  +  MessageDecoder (chainharvest-evm)
//!        │ built on
//!        ▼
//! this crate: types, topic hashing, errors, handler traits
//! ```

pub mod error;
pub mod handler;
pub mod topic;
pub mod types;

pub use error::{DecodeError, HarvestError};
pub use handler::{EventHandler, PendingTxHandler, ProgressSink, ScanProgress};
pub use topic::topic_hash;
pub use types::{
    Address, BlockRange, FilterQuery, LogEvent, Message, PendingCall, TopicHash, Transaction,
    TxHash,
};
