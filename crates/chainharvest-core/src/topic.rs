//! Event signature → topic hash derivation.
//!
//! Topic 0 of a log is the Keccak-256 hash of the event's canonical signature
//! string, e.g. `Transfer(address,address,uint256)`. This is the legacy
//! Ethereum Keccak variant, not standardized SHA3-256 — the two differ in
//! padding, and using the wrong one produces topic hashes that never match
//! real events.

use tiny_keccak::{Hasher, Keccak};

use crate::types::TopicHash;

/// Compute the topic hash of a canonical event signature.
///
/// Pure and deterministic; recomputed on demand, never cached.
pub fn topic_hash(signature: &str) -> TopicHash {
    let mut hasher = Keccak::v256();
    hasher.update(signature.as_bytes());
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    TopicHash(out)
}
