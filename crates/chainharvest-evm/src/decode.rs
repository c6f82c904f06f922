//! Chain-aware transaction → message extraction.
//!
//! Sender recovery on EVM chains is replay-protection-scheme dependent:
//! EIP-155 folds the chain id into the legacy signature's `v` value, while
//! typed envelopes (EIP-2930/1559) declare the chain id outright. The decoder
//! is therefore parameterized by the chain id it expects — supplied by the
//! caller, never inferred from the transaction itself — and rejects
//! transactions whose protection scheme does not match.

use chainharvest_core::error::DecodeError;
use chainharvest_core::types::{Message, Transaction};

/// Decodes wire transactions into [`Message`]s for one specific chain.
#[derive(Debug, Clone, Copy)]
pub struct MessageDecoder {
    chain_id: u64,
}

impl MessageDecoder {
    /// A decoder for the chain identified by `chain_id`
    /// (e.g. 1 for Ethereum mainnet, 43114 for the Avalanche C-Chain).
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Extract the sender/recipient/value/payload view of `tx`.
    ///
    /// Failures are recoverable by policy: callers log and skip the item.
    pub fn decode(&self, tx: &Transaction) -> Result<Message, DecodeError> {
        self.check_replay_protection(tx)?;

        let from = tx.from.ok_or(DecodeError::MissingSender)?;
        let value = parse_wei(&tx.value)?;

        Ok(Message {
            from,
            to: tx.to,
            value,
            data: tx.input.clone(),
        })
    }

    fn check_replay_protection(&self, tx: &Transaction) -> Result<(), DecodeError> {
        if tx.tx_type >= 1 {
            // Typed envelope: the chain id is an explicit field.
            let declared = tx.chain_id.ok_or(DecodeError::MissingChainId {
                tx_type: tx.tx_type,
            })?;
            if declared != self.chain_id {
                return Err(DecodeError::ChainIdMismatch {
                    expected: self.chain_id,
                    declared,
                });
            }
            return Ok(());
        }

        // Legacy envelope: v = 27/28 is unprotected pre-EIP-155 and accepted
        // on any chain; otherwise v must encode chain_id * 2 + 35/36.
        match tx.v {
            27 | 28 => Ok(()),
            v if v >= 35 && (v - 35) / 2 == self.chain_id => Ok(()),
            v => Err(DecodeError::ReplayProtection {
                v,
                chain_id: self.chain_id,
            }),
        }
    }
}

/// Parse a hex wei quantity. Values above `u128::MAX` are rejected rather
/// than truncated.
fn parse_wei(hex: &str) -> Result<u128, DecodeError> {
    let stripped = hex.strip_prefix("0x").unwrap_or(hex);
    u128::from_str_radix(stripped, 16).map_err(|_| DecodeError::InvalidValue(hex.to_string()))
}
