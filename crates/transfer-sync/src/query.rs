//! # Range Query Builder
//!
//! Builds the immutable descriptor sent to the indexing service for one round:
//! a block range, the topic filter and the selected columns. Pure and stateless,
//! so boundary handling (zero, equal bounds, open upper bound) is testable without
//! a network.
//!
//! The descriptor serialises to the service's JSON query form. `to_block` is an
//! exclusive upper bound.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::{SyncError, SyncResult, TRANSFER_TOPIC};

pub const LOG_FIELDS: &[&str] = &[
    "removed",
    "log_index",
    "transaction_index",
    "transaction_hash",
    "block_hash",
    "block_number",
    "address",
    "data",
    "topic0",
    "topic1",
    "topic2",
    "topic3",
];

pub const TRANSACTION_FIELDS: &[&str] = &[
    "block_hash",
    "block_number",
    "from",
    "gas",
    "gas_price",
    "hash",
    "input",
    "nonce",
    "to",
    "transaction_index",
    "value",
    "v",
    "r",
    "s",
    "max_priority_fee_per_gas",
    "max_fee_per_gas",
    "chain_id",
    "cumulative_gas_used",
    "effective_gas_price",
    "gas_used",
    "contract_address",
    "logs_bloom",
    "kind",
    "root",
    "status",
    "sighash",
];

pub const BLOCK_FIELDS: &[&str] = &[
    "number",
    "hash",
    "parent_hash",
    "nonce",
    "sha3_uncles",
    "logs_bloom",
    "transactions_root",
    "state_root",
    "receipts_root",
    "miner",
    "difficulty",
    "total_difficulty",
    "extra_data",
    "size",
    "gas_limit",
    "gas_used",
    "timestamp",
    "uncles",
    "base_fee_per_gas",
];

const REQUIRED_LOG_FIELDS: &[&str] = &["block_number", "log_index", "transaction_hash", "address", "data", "topic0"];
const REQUIRED_TRANSACTION_FIELDS: &[&str] = &["block_number", "transaction_index", "hash"];
const REQUIRED_BLOCK_FIELDS: &[&str] = &["number"];

/// Event topic filter. Fixed for the engine's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    topics: Vec<B256>,
}

impl EventFilter {
    pub fn new(topics: Vec<B256>) -> SyncResult<Self> {
        if topics.is_empty() {
            return Err(SyncError::Config(
                "event filter needs at least one topic".to_string(),
            ));
        }
        Ok(Self { topics })
    }

    pub fn erc20_transfer() -> Self {
        Self {
            topics: vec![TRANSFER_TOPIC],
        }
    }

    pub fn topics(&self) -> &[B256] {
        &self.topics
    }
}

/// Which log/transaction/block columns to retrieve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub log: Vec<String>,
    pub transaction: Vec<String>,
    pub block: Vec<String>,
}

impl FieldSelection {
    pub fn complete() -> Self {
        Self {
            log: LOG_FIELDS.iter().map(|f| f.to_string()).collect(),
            transaction: TRANSACTION_FIELDS.iter().map(|f| f.to_string()).collect(),
            block: BLOCK_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Rejects selections that drop the columns rows are keyed on
    pub fn validate(&self) -> SyncResult<()> {
        fn check(kind: &str, selected: &[String], required: &[&str]) -> SyncResult<()> {
            for field in required {
                if !selected.iter().any(|s| s == field) {
                    return Err(SyncError::Config(format!(
                        "{} field selection is missing required column '{}'",
                        kind, field
                    )));
                }
            }
            Ok(())
        }
        check("log", &self.log, REQUIRED_LOG_FIELDS)?;
        check("transaction", &self.transaction, REQUIRED_TRANSACTION_FIELDS)?;
        check("block", &self.block, REQUIRED_BLOCK_FIELDS)
    }
}

impl Default for FieldSelection {
    fn default() -> Self {
        Self::complete()
    }
}

/// `[from_block, to_block)`, or open-ended when `to_block` is `None`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    from_block: u64,
    to_block: Option<u64>,
}

impl BlockRange {
    pub fn new(from_block: u64, to_block: Option<u64>) -> SyncResult<Self> {
        if let Some(to_block) = to_block {
            if from_block > to_block {
                return Err(SyncError::InvalidRange {
                    from_block,
                    to_block,
                });
            }
        }
        Ok(Self {
            from_block,
            to_block,
        })
    }

    pub fn from_block(&self) -> u64 {
        self.from_block
    }

    pub fn to_block(&self) -> Option<u64> {
        self.to_block
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSelection {
    pub address: Vec<Address>,
    pub topics: Vec<Vec<B256>>,
}

/// Query descriptor for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeQuery {
    from_block: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_block: Option<u64>,
    logs: Vec<LogSelection>,
    field_selection: FieldSelection,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_num_blocks: Option<u64>,
}

impl RangeQuery {
    pub fn build(
        from_block: u64,
        to_block: Option<u64>,
        filter: &EventFilter,
        fields: &FieldSelection,
    ) -> SyncResult<Self> {
        let range = BlockRange::new(from_block, to_block)?;
        Ok(Self {
            from_block: range.from_block(),
            to_block: range.to_block(),
            logs: vec![LogSelection {
                address: Vec::new(),
                // Topic position 0 only: any emitter, any from/to
                topics: vec![filter.topics().to_vec()],
            }],
            field_selection: fields.clone(),
            max_num_blocks: None,
        })
    }

    pub fn with_max_num_blocks(mut self, max_num_blocks: Option<u64>) -> Self {
        self.max_num_blocks = max_num_blocks;
        self
    }

    /// Descriptor for the next page, starting at the service's reported cursor
    pub fn advance(&self, next_block: u64) -> SyncResult<Self> {
        if next_block < self.from_block {
            return Err(SyncError::Transport(format!(
                "service cursor moved backwards: {} -> {}",
                self.from_block, next_block
            )));
        }
        let range = BlockRange::new(next_block, self.to_block)?;
        Ok(Self {
            from_block: range.from_block(),
            ..self.clone()
        })
    }

    pub fn from_block(&self) -> u64 {
        self.from_block
    }

    pub fn to_block(&self) -> Option<u64> {
        self.to_block
    }

    pub fn max_num_blocks(&self) -> Option<u64> {
        self.max_num_blocks
    }

    pub fn topics(&self) -> impl Iterator<Item = &B256> {
        self.logs.iter().flat_map(|sel| sel.topics.iter().flatten())
    }

    pub fn field_selection(&self) -> &FieldSelection {
        &self.field_selection
    }
}
