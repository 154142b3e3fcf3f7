//! Common types for transfer-sync

use alloy_primitives::{b256, Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::{EventFilter, FieldSelection};

/// `keccak256("Transfer(address,address,uint256)")`
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// Blocks re-scanned behind the chain height in incremental mode
pub const DEFAULT_LOOKBACK_WINDOW: u64 = 1000;

/// A log exactly as the indexing service returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_index: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub block_hash: Option<B256>,
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn key(&self) -> LogKey {
        LogKey {
            block_number: self.block_number,
            log_index: self.log_index,
            transaction_hash: self.transaction_hash.unwrap_or_default(),
        }
    }
}

/// Composite identity of a log row: block number, log index, transaction hash.
///
/// Rows fetched twice (overlapping lookback windows) share a key, which is what
/// storage backends dedupe on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogKey {
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
}

impl LogKey {
    pub const ENCODED_LEN: usize = 48;

    /// Big-endian so that byte order matches numeric order
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..8].copy_from_slice(&self.block_number.to_be_bytes());
        out[8..16].copy_from_slice(&self.log_index.to_be_bytes());
        out[16..].copy_from_slice(self.transaction_hash.as_slice());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let block_number = u64::from_be_bytes(bytes[..8].try_into().ok()?);
        let log_index = u64::from_be_bytes(bytes[8..16].try_into().ok()?);
        Some(Self {
            block_number,
            log_index,
            transaction_hash: B256::from_slice(&bytes[16..]),
        })
    }
}

/// Transaction row. Key columns are typed, the rest of the selected columns are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub block_number: u64,
    pub transaction_index: u64,
    pub hash: B256,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Block row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: Option<B256>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// One round's response from the indexing service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFetchResult {
    pub logs: Vec<RawLog>,
    pub transactions: Vec<Transaction>,
    pub blocks: Vec<Block>,
    /// The service's current view of the chain height
    pub archive_height: u64,
    /// Where the next page starts
    pub next_block: u64,
}

/// A log paired with the outcome of decoding it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedLog {
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Option<B256>,
    pub address: Address,
    pub outcome: DecodeOutcome,
}

impl DecodedLog {
    pub fn new(log: &RawLog, outcome: DecodeOutcome) -> Self {
        Self {
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
            address: log.address,
            outcome,
        }
    }

    pub fn key(&self) -> LogKey {
        LogKey {
            block_number: self.block_number,
            log_index: self.log_index,
            transaction_hash: self.transaction_hash.unwrap_or_default(),
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self.outcome, DecodeOutcome::Decoded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecodeOutcome {
    Decoded {
        event: String,
        indexed: Vec<Value>,
        body: Vec<Value>,
    },
    Failed {
        reason: String,
    },
}

/// Highest log block number observed in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checkpoint {
    pub block_number: u64,
}

impl Checkpoint {
    pub fn from_logs<'a>(logs: impl IntoIterator<Item = &'a RawLog>) -> Option<Self> {
        logs.into_iter()
            .map(|log| log.block_number)
            .max()
            .map(|block_number| Self { block_number })
    }

    /// Keep whichever of the two is higher
    pub fn merge(current: Option<Self>, other: Option<Self>) -> Option<Self> {
        match (current, other) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Suggested `from_block` for the next incremental run
    pub fn resume_from(&self, lookback_window: u64) -> u64 {
        self.block_number.saturating_sub(lookback_window)
    }
}

/// Sync mode, chosen once at run start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Walk `[0, height_at_start)`
    Full,
    /// Walk `[height_at_start - lookback_window, tip]`
    Incremental { lookback_window: u64 },
    /// Walk `[from_block, tip]`
    Resume { from_block: u64 },
}

impl SyncMode {
    pub fn from_options(sync_all: bool, lookback_window: u64, start_block: Option<u64>) -> Self {
        if sync_all {
            SyncMode::Full
        } else if let Some(from_block) = start_block {
            SyncMode::Resume { from_block }
        } else {
            SyncMode::Incremental { lookback_window }
        }
    }
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::Incremental {
            lookback_window: DEFAULT_LOOKBACK_WINDOW,
        }
    }
}

/// Configuration for the sync process
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub mode: SyncMode,
    pub event_filter: EventFilter,
    pub field_selection: FieldSelection,
    /// Upper bound on blocks scanned per round, sent to the service as `max_num_blocks`
    pub block_chunk: Option<u64>,
    /// Same-range retries for transport failures before the run is aborted
    pub max_round_retries: u32,
    pub retry_base_delay: Duration,
    /// Deadline for one fetch-decode round
    pub round_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            event_filter: EventFilter::erc20_transfer(),
            field_selection: FieldSelection::complete(),
            block_chunk: None,
            max_round_retries: 0,
            retry_base_delay: Duration::from_millis(500),
            round_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The service reported `archive_height < next_block`
    CaughtUp,
    /// Full mode reached the height captured at start
    ReachedTarget,
    /// Abandoned by the caller at a round boundary
    Cancelled,
}

/// Outcome of a completed (or cancelled) run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub start_block: u64,
    pub to_block: Option<u64>,
    /// `from_block` the next round would have used
    pub next_block: u64,
    pub archive_height: u64,
    pub rounds: u32,
    pub logs: usize,
    pub transactions: usize,
    pub blocks: usize,
    pub checkpoint: Option<Checkpoint>,
    pub stop_reason: StopReason,
}

/// Sync engine status
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub is_running: bool,
    pub cursor: u64,
    pub rounds_completed: u32,
    pub logs_seen: u64,
    pub archive_height: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_at(block_number: u64, log_index: u64) -> RawLog {
        RawLog {
            block_number,
            log_index,
            transaction_index: Some(0),
            transaction_hash: Some(B256::repeat_byte(0xab)),
            block_hash: None,
            address: Address::repeat_byte(0x11),
            topics: vec![TRANSFER_TOPIC],
            data: Bytes::new(),
            removed: None,
        }
    }

    #[test]
    fn test_checkpoint_is_max_block_number() {
        let logs = vec![log_at(12, 0), log_at(40, 3), log_at(7, 1)];
        assert_eq!(
            Checkpoint::from_logs(&logs),
            Some(Checkpoint { block_number: 40 })
        );
        assert_eq!(Checkpoint::from_logs(&Vec::<RawLog>::new()), None);
    }

    #[test]
    fn test_checkpoint_merge_and_resume() {
        let a = Some(Checkpoint { block_number: 10 });
        let b = Some(Checkpoint { block_number: 25 });
        assert_eq!(Checkpoint::merge(a, b), b);
        assert_eq!(Checkpoint::merge(None, a), a);
        assert_eq!(Checkpoint::merge(a, None), a);

        let cp = Checkpoint { block_number: 2500 };
        assert_eq!(cp.resume_from(1000), 1500);
        assert_eq!(cp.resume_from(5000), 0);
    }

    #[test]
    fn test_log_key_orders_by_block_then_index() {
        let low = log_at(5, 9).key().to_bytes();
        let high = log_at(6, 0).key().to_bytes();
        assert!(low < high);

        let key = log_at(300, 2).key();
        assert_eq!(LogKey::from_bytes(&key.to_bytes()), Some(key));
        assert_eq!(LogKey::from_bytes(&[0u8; 3]), None);
    }

    #[test]
    fn test_mode_from_options() {
        assert_eq!(SyncMode::from_options(true, 500, Some(10)), SyncMode::Full);
        assert_eq!(
            SyncMode::from_options(false, 500, Some(10)),
            SyncMode::Resume { from_block: 10 }
        );
        assert_eq!(
            SyncMode::from_options(false, 500, None),
            SyncMode::Incremental { lookback_window: 500 }
        );
    }

    #[test]
    fn test_transaction_keeps_extra_columns() {
        let json = serde_json::json!({
            "block_number": 10,
            "transaction_index": 2,
            "hash": format!("0x{}", "11".repeat(32)),
            "gas_used": "0x5208",
            "from": "0x0000000000000000000000000000000000000001"
        });
        let tx: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(tx.block_number, 10);
        assert_eq!(tx.fields.get("gas_used"), Some(&Value::from("0x5208")));
        assert!(!tx.fields.contains_key("hash"));
    }
}
