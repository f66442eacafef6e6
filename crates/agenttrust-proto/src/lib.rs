//! Shared record types and hash-chain primitives for agenttrust.
//!
//! Every persisted record — execution, claim, or witness observation — shares
//! the same envelope: a time-sortable id, a schema version, a timestamp, the
//! previous record's hash, and this record's own hash. [`canonical_json`] and
//! [`hash_of`] define the exact byte string that goes into that hash.

#![forbid(unsafe_code)]

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

pub mod canon;
pub mod types;

pub use canon::{canonical_json, hash_of, sha256_hex, verify_self};
pub use types::*;

/// Current schema version for all persisted record kinds.
pub const SCHEMA_VERSION: u32 = 1;

// ─── ULID generation ──────────────────────────────────────────────────────────

static ULID_GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Generate a fresh, monotonically increasing ULID for the current process.
///
/// Strictly increasing for same-millisecond calls within one process, per
/// the `id` invariant in the data model (I3).
pub fn new_ulid() -> Ulid {
    let mut gen = ULID_GENERATOR.lock();
    loop {
        match gen.generate() {
            Ok(id) => return id,
            // Exhausted the random tail for this millisecond; retry on the next tick.
            Err(_) => std::thread::yield_now(),
        }
    }
}

// ─── Hash-chained envelope ────────────────────────────────────────────────────

/// The shared envelope wrapping every persisted record kind.
///
/// `payload` is flattened into the serialized JSON so envelope fields and
/// payload fields sit side by side in one object on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashChainRecord<T> {
    pub id: Ulid,
    pub v: u32,
    pub ts: DateTime<Utc>,
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
    #[serde(flatten)]
    pub payload: T,
    pub hash: String,
}

impl<T: Serialize> HashChainRecord<T> {
    /// Build a new record: assign id, version, timestamp, chain it onto
    /// `prev_hash`, then compute the self-hash over everything but `hash`.
    pub fn new(payload: T, prev_hash: String) -> Self {
        let id = new_ulid();
        let ts = Utc::now();
        let mut record = Self {
            id,
            v: SCHEMA_VERSION,
            ts,
            prev_hash,
            payload,
            hash: String::new(),
        };
        record.hash = hash_of(&record).unwrap_or_default();
        record
    }

    /// Recompute the hash over the current fields and compare to `hash`.
    pub fn verify_self(&self) -> bool {
        verify_self(self)
    }
}

/// Execution record.
pub type ExecutionRecord = HashChainRecord<ExecutionPayload>;
/// Claim record.
pub type ClaimRecord = HashChainRecord<ClaimPayload>;
/// Witness record.
pub type WitnessRecord = HashChainRecord<WitnessPayload>;

// ─── Chain verification ──────────────────────────────────────────────────────

/// Result of walking a sequence of records for chain linkage (I1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerdict {
    Valid,
    /// Index of the first record whose `prevHash` doesn't match.
    BrokenAt(usize),
}

/// Verify `records[0].prevHash == ""` and `records[i].prevHash ==
/// records[i-1].hash` for all `i > 0`.
pub fn verify_chain<T>(records: &[HashChainRecord<T>]) -> ChainVerdict {
    if let Some(first) = records.first() {
        if !first.prev_hash.is_empty() {
            return ChainVerdict::BrokenAt(0);
        }
    }
    for i in 1..records.len() {
        if records[i].prev_hash != records[i - 1].hash {
            return ChainVerdict::BrokenAt(i);
        }
    }
    ChainVerdict::Valid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ulid_monotonic_same_process() {
        let a = new_ulid();
        let b = new_ulid();
        assert!(b > a, "ulids generated in sequence must be strictly increasing");
    }

    #[test]
    fn test_record_self_hash_verifies() {
        let payload = ExecutionPayload::test_fixture();
        let record = ExecutionRecord::new(payload, String::new());
        assert!(record.verify_self());
    }

    #[test]
    fn test_record_tamper_breaks_self_hash() {
        let payload = ExecutionPayload::test_fixture();
        let mut record = ExecutionRecord::new(payload, String::new());
        record.payload.agent = "tampered".to_string();
        assert!(!record.verify_self());
    }

    #[test]
    fn test_verify_chain_valid() {
        let r1 = ExecutionRecord::new(ExecutionPayload::test_fixture(), String::new());
        let r2 = ExecutionRecord::new(ExecutionPayload::test_fixture(), r1.hash.clone());
        let r3 = ExecutionRecord::new(ExecutionPayload::test_fixture(), r2.hash.clone());
        assert_eq!(verify_chain(&[r1, r2, r3]), ChainVerdict::Valid);
    }

    #[test]
    fn test_verify_chain_broken_first_record() {
        let mut r1 = ExecutionRecord::new(ExecutionPayload::test_fixture(), String::new());
        r1.prev_hash = "bogus".to_string();
        assert_eq!(verify_chain(&[r1]), ChainVerdict::BrokenAt(0));
    }

    #[test]
    fn test_verify_chain_broken_link() {
        let r1 = ExecutionRecord::new(ExecutionPayload::test_fixture(), String::new());
        let r2 = ExecutionRecord::new(ExecutionPayload::test_fixture(), "wrong".to_string());
        assert_eq!(verify_chain(&[r1, r2]), ChainVerdict::BrokenAt(1));
    }
}
