//! Shared types for the harvesting pipeline.

use serde::{Deserialize, Serialize};

use crate::error::HexParseError;

fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], HexParseError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|_| HexParseError {
        expected: N,
        input: s.to_string(),
    })?;
    bytes.try_into().map_err(|_| HexParseError {
        expected: N,
        input: s.to_string(),
    })
}

// ─── Address ──────────────────────────────────────────────────────────────────

/// A 20-byte EVM account or contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Parse from a hex string (`0x` prefix optional, case-insensitive).
    pub fn parse(s: &str) -> Result<Self, HexParseError> {
        parse_fixed_hex(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::str::FromStr for Address {
    type Err = HexParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ─── TopicHash / TxHash ───────────────────────────────────────────────────────

/// A 32-byte log topic. By convention topic 0 is the Keccak-256 hash of the
/// event's canonical signature string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicHash(pub [u8; 32]);

impl TopicHash {
    pub fn parse(s: &str) -> Result<Self, HexParseError> {
        parse_fixed_hex(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for TopicHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A 32-byte transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn parse(s: &str) -> Result<Self, HexParseError> {
        parse_fixed_hex(s).map(Self)
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// An inclusive block-height interval. `from <= to` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    from: u64,
    to: u64,
}

impl BlockRange {
    /// Create a range, rejecting `from > to`.
    pub fn new(from: u64, to: u64) -> Result<Self, crate::error::HarvestError> {
        if from > to {
            return Err(crate::error::HarvestError::InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> u64 {
        self.from
    }

    pub fn to(&self) -> u64 {
        self.to
    }

    /// Number of blocks covered (inclusive on both ends).
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    pub fn is_empty(&self) -> bool {
        false // from <= to, so at least one block
    }

    /// Split into consecutive non-overlapping windows of `width` blocks,
    /// the final window clipped to `to`.
    pub fn windows(&self, width: u64) -> Windows {
        Windows {
            next: self.from,
            to: self.to,
            width: width.max(1),
            done: false,
        }
    }
}

/// Iterator over the fixed-size windows of a [`BlockRange`].
pub struct Windows {
    next: u64,
    to: u64,
    width: u64,
    done: bool,
}

impl Iterator for Windows {
    type Item = BlockRange;

    fn next(&mut self) -> Option<BlockRange> {
        if self.done {
            return None;
        }
        let from = self.next;
        let to = from.saturating_add(self.width - 1).min(self.to);
        if to == self.to {
            self.done = true;
        } else {
            self.next = to + 1;
        }
        Some(BlockRange { from, to })
    }
}

// ─── FilterQuery ──────────────────────────────────────────────────────────────

/// A log selection query: contract address set, per-position topic OR-sets,
/// and an optional block range.
///
/// Position `i` of `topics` is an OR-set: a log matches position `i` if its
/// `i`-th topic is a member. An empty (or absent) position is a wildcard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterQuery {
    pub addresses: Vec<Address>,
    pub topics: Vec<Vec<TopicHash>>,
    pub range: Option<BlockRange>,
}

impl FilterQuery {
    /// Query for a single contract address.
    pub fn address(addr: Address) -> Self {
        Self {
            addresses: vec![addr],
            ..Default::default()
        }
    }

    /// Append a topic OR-set at the next position.
    pub fn topics(mut self, or_set: Vec<TopicHash>) -> Self {
        self.topics.push(or_set);
        self
    }

    /// Bound the query to a block range.
    pub fn range(mut self, range: BlockRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Returns `true` if `log` matches the address set and every topic
    /// position of this query. The block range is not checked here; it is
    /// enforced server-side by the node.
    pub fn matches(&self, log: &LogEvent) -> bool {
        if !self.addresses.is_empty() && !self.addresses.contains(&log.address) {
            return false;
        }
        for (i, or_set) in self.topics.iter().enumerate() {
            if or_set.is_empty() {
                continue; // wildcard
            }
            match log.topics.get(i) {
                Some(t) if or_set.contains(t) => {}
                _ => return false,
            }
        }
        true
    }
}

// ─── LogEvent ─────────────────────────────────────────────────────────────────

/// An event log emitted during contract execution.
///
/// Produced by a query or subscription, consumed by a handler, not retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Contract address that emitted the log.
    pub address: Address,
    /// Ordered topic hashes; topic 0 is the event signature hash.
    pub topics: Vec<TopicHash>,
    /// ABI-encoded non-indexed parameters.
    pub data: Vec<u8>,
    /// Block the log was included in.
    pub block_number: u64,
    /// Transaction that produced the log.
    pub tx_hash: TxHash,
    /// Log index within the block.
    pub log_index: u32,
    /// `true` if the log was dropped by a chain reorganization.
    pub removed: bool,
}

impl LogEvent {
    /// Topic 0 (the event signature hash), if present.
    pub fn signature_topic(&self) -> Option<&TopicHash> {
        self.topics.first()
    }
}

// ─── Transaction / Message ────────────────────────────────────────────────────

/// Wire-level view of a transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: TxHash,
    /// Declared chain id. Absent on pre-EIP-155 legacy transactions.
    pub chain_id: Option<u64>,
    /// Transaction envelope type (0 = legacy, 1 = EIP-2930, 2 = EIP-1559, ...).
    pub tx_type: u8,
    /// Sender as reported by the node.
    pub from: Option<Address>,
    /// Recipient; `None` for contract creation.
    pub to: Option<Address>,
    /// Value in wei, hex-encoded as on the wire.
    pub value: String,
    /// Call data.
    pub input: Vec<u8>,
    /// Signature recovery value; encodes the replay-protection scheme for
    /// legacy transactions.
    pub v: u64,
}

/// The resolved sender/recipient/value/payload view of a transaction.
/// Derivation is chain-id dependent (replay-protection signing rules).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    /// Value in wei.
    pub value: u128,
    pub data: Vec<u8>,
}

// ─── PendingCall ──────────────────────────────────────────────────────────────

/// The structured record emitted when a mempool transaction matches the
/// watched contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    /// `true` if the transaction was still pending at resolution time.
    pub pending: bool,
    /// Transaction envelope type.
    pub tx_type: u8,
    pub from: Address,
    /// `None` when the matched transaction is a contract creation (possible
    /// only when matching on the sender side).
    pub to: Option<Address>,
    /// Value in wei.
    pub value: u128,
    /// Call data.
    pub data: Vec<u8>,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
