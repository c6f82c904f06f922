//! chainharvest-evm — EVM-specific decoding.
//!
//! Currently one concern: turning a wire [`Transaction`] into a
//! [`Message`] under the replay-protection rules of a specific chain.
//!
//! [`Transaction`]: chainharvest_core::types::Transaction
//! [`Message`]: chainharvest_core::types::Message

pub mod decode;

pub use decode::MessageDecoder;
