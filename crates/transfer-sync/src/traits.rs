//! # Adapter Traits
//!
//! The sync engine only talks to the outside world through these traits:
//!
//! - [`IndexingService`]: the remote chain-indexing service. Reports its height and
//!   answers range queries with raw logs, transactions and blocks plus a cursor.
//! - [`LogDecoder`]: turns raw logs into decoded values given an address-to-ABI map.
//! - [`StorageAdapter`]: persisted row storage owned by the caller. The engine never
//!   requires one; [`crate::StorageSink`] plugs one in for per-round commits.
//! - [`RoundSink`]: receives each fully completed round.
//!
//! All traits use `async_trait` so adapters can do network or blocking work without
//! stalling the caller's executor. Mock implementations live in [`crate::mock`]
//! behind the `test-utils` feature.

use alloy_primitives::Address;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{Checkpoint, DecodedLog, RangeQuery, RawFetchResult, RawLog, RoundBatch, SyncResult};

/// Log-emitting address to the ABI text used to decode its logs
pub type AbiMap = HashMap<Address, Arc<str>>;

/// Trait for the remote indexing service.
///
/// # Errors
/// Both methods return [`crate::SyncError::Transport`] when the service is
/// unreachable or answers with something that cannot be parsed. Implementations
/// should not retry internally; the coordinator owns retry policy.
#[async_trait]
pub trait IndexingService: Send + Sync {
    /// Current chain height as seen by the service
    async fn get_height(&self) -> SyncResult<u64>;

    /// Execute one range query.
    ///
    /// `next_block` in the result must not be lower than the query's `from_block`.
    async fn send_query(&self, query: &RangeQuery) -> SyncResult<RawFetchResult>;
}

/// Trait for the log decode capability.
///
/// Must return exactly one [`DecodedLog`] per input log, in input order. A log that
/// cannot be decoded yields a `DecodeOutcome::Failed` entry, never an error; `Err`
/// is reserved for failures of the whole batch.
#[async_trait]
pub trait LogDecoder: Send + Sync {
    async fn decode_logs(&self, abis: &AbiMap, logs: &[RawLog]) -> SyncResult<Vec<DecodedLog>>;
}

/// Receives every fully completed round, in range order
#[async_trait]
pub trait RoundSink: Send {
    async fn accept(&mut self, batch: RoundBatch) -> SyncResult<()>;
}

/// Trait for persisted row storage
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Append one round's rows. Either all of them land or none do.
    async fn append_round(&mut self, batch: &RoundBatch) -> SyncResult<()>;

    /// Highest stored log `block_number`
    async fn max_block_number(&self) -> SyncResult<Option<u64>>;

    /// Stored log block numbers, descending, at most `limit` rows
    async fn top_block_numbers(&self, limit: usize) -> SyncResult<Vec<u64>>;

    /// Check if storage is available and writable
    async fn is_available(&self) -> bool;

    async fn get_stats(&self) -> SyncResult<StorageStats>;

    /// Resume checkpoint recovered from stored rows
    async fn checkpoint(&self) -> SyncResult<Option<Checkpoint>> {
        Ok(self
            .max_block_number()
            .await?
            .map(|block_number| Checkpoint { block_number }))
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageStats {
    pub logs: usize,
    pub decoded_logs: usize,
    pub transactions: usize,
    pub blocks: usize,
    pub max_block_number: Option<u64>,
}
