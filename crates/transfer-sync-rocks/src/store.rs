//! RocksDB implementation of the `StorageAdapter` trait.
//!
//! One column family per table. Log and decoded-log rows are keyed by
//! [`LogKey::to_bytes`], so a row fetched twice by overlapping runs overwrites
//! itself and the last key in the `logs` family always carries the highest
//! block number.

use async_trait::async_trait;
use log::{debug, info};
use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use transfer_sync::{
    DecodedLog, LogKey, RawLog, RoundBatch, StorageAdapter, StorageStats, SyncError, SyncResult,
};

use crate::options::{create_column_family_options, create_log_store_options};

pub const LOGS_CF: &str = "logs";
pub const DECODED_LOGS_CF: &str = "decoded_logs";
pub const TRANSACTIONS_CF: &str = "transactions";
pub const BLOCKS_CF: &str = "blocks";

pub const COLUMN_FAMILIES: [&str; 4] = [LOGS_CF, DECODED_LOGS_CF, TRANSACTIONS_CF, BLOCKS_CF];

fn storage_error(context: &str, e: impl std::fmt::Display) -> SyncError {
    SyncError::Storage(format!("{}: {}", context, e))
}

/// Persistent log store
#[derive(Clone)]
pub struct RocksDBLogStore {
    db: Arc<DB>,
    path: PathBuf,
}

impl RocksDBLogStore {
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        Self::open_with_options(path, create_log_store_options())
    }

    pub fn open_with_options(path: impl AsRef<Path>, opts: Options) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();
        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, create_column_family_options()));
        let db = DB::open_cf_descriptors(&opts, &path, descriptors)
            .map_err(|e| storage_error(&format!("failed to open {}", path.display()), e))?;
        info!("Opened log store at {}", path.display());
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf(&self, name: &str) -> SyncResult<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| SyncError::Storage(format!("missing column family {}", name)))
    }

    fn transaction_key(block_number: u64, transaction_index: u64, hash: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(16 + hash.len());
        key.extend_from_slice(&block_number.to_be_bytes());
        key.extend_from_slice(&transaction_index.to_be_bytes());
        key.extend_from_slice(hash);
        key
    }

    fn count(&self, name: &str) -> SyncResult<usize> {
        let cf = self.cf(name)?;
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item.map_err(|e| storage_error("failed to iterate", e))?;
            count += 1;
        }
        Ok(count)
    }

    /// All stored raw logs in key order
    pub fn read_logs(&self) -> SyncResult<Vec<RawLog>> {
        self.read_rows(LOGS_CF)
    }

    /// All stored decoded logs in key order
    pub fn read_decoded_logs(&self) -> SyncResult<Vec<DecodedLog>> {
        self.read_rows(DECODED_LOGS_CF)
    }

    fn read_rows<T: serde::de::DeserializeOwned>(&self, name: &str) -> SyncResult<Vec<T>> {
        let cf = self.cf(name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| storage_error("failed to iterate", e))?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Dump RocksDB's own statistics at info level
    pub fn log_db_stats(&self) {
        if let Ok(Some(stats)) = self.db.property_value("rocksdb.stats") {
            info!("RocksDB stats:\n{}", stats);
        }
    }
}

#[async_trait]
impl StorageAdapter for RocksDBLogStore {
    async fn append_round(&mut self, batch: &RoundBatch) -> SyncResult<()> {
        let logs_cf = self.cf(LOGS_CF)?;
        let decoded_cf = self.cf(DECODED_LOGS_CF)?;
        let transactions_cf = self.cf(TRANSACTIONS_CF)?;
        let blocks_cf = self.cf(BLOCKS_CF)?;

        let mut write = WriteBatch::default();
        for log in &batch.logs {
            write.put_cf(&logs_cf, log.key().to_bytes(), serde_json::to_vec(log)?);
        }
        for decoded in &batch.decoded_logs {
            write.put_cf(&decoded_cf, decoded.key().to_bytes(), serde_json::to_vec(decoded)?);
        }
        for tx in &batch.transactions {
            let key = Self::transaction_key(tx.block_number, tx.transaction_index, tx.hash.as_slice());
            write.put_cf(&transactions_cf, key, serde_json::to_vec(tx)?);
        }
        for block in &batch.blocks {
            write.put_cf(&blocks_cf, block.number.to_be_bytes(), serde_json::to_vec(block)?);
        }

        let rows = write.len();
        self.db
            .write(write)
            .map_err(|e| storage_error("failed to write round", e))?;
        debug!("Wrote {} rows to {}", rows, self.path.display());
        Ok(())
    }

    async fn max_block_number(&self) -> SyncResult<Option<u64>> {
        Ok(self.top_block_numbers(1).await?.into_iter().next())
    }

    async fn top_block_numbers(&self, limit: usize) -> SyncResult<Vec<u64>> {
        let cf = self.cf(LOGS_CF)?;
        let mut numbers = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(&cf, IteratorMode::End).take(limit) {
            let (key, _) = item.map_err(|e| storage_error("failed to iterate", e))?;
            let key = LogKey::from_bytes(&key)
                .ok_or_else(|| SyncError::Storage(format!("malformed log key of {} bytes", key.len())))?;
            numbers.push(key.block_number);
        }
        Ok(numbers)
    }

    async fn is_available(&self) -> bool {
        match self.cf(LOGS_CF) {
            Ok(cf) => self.db.get_cf(&cf, b"__probe").is_ok(),
            Err(_) => false,
        }
    }

    async fn get_stats(&self) -> SyncResult<StorageStats> {
        Ok(StorageStats {
            logs: self.count(LOGS_CF)?,
            decoded_logs: self.count(DECODED_LOGS_CF)?,
            transactions: self.count(TRANSACTIONS_CF)?,
            blocks: self.count(BLOCKS_CF)?,
            max_block_number: self.max_block_number().await?,
        })
    }
}
