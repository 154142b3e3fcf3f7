//! # Accumulator
//!
//! Run-scoped collections of everything fetched, appended in arrival order. No
//! sorting and no deduplication: if a range is fetched twice the rows appear twice,
//! and collapsing them is the storage layer's job (see [`crate::LogKey`]).

use async_trait::async_trait;
use log::debug;

use crate::{
    Block, Checkpoint, DecodedLog, RawLog, RoundBatch, RoundSink, StorageAdapter, SyncError,
    SyncResult, Transaction,
};

/// The four ordered sequences returned to the caller when a run finishes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncAccumulation {
    pub transactions: Vec<Transaction>,
    pub decoded_log_data: Vec<DecodedLog>,
    pub log_data: Vec<RawLog>,
    pub blocks: Vec<Block>,
}

impl SyncAccumulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, batch: RoundBatch) {
        self.transactions.extend(batch.transactions);
        self.decoded_log_data.extend(batch.decoded_logs);
        self.log_data.extend(batch.logs);
        self.blocks.extend(batch.blocks);
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        Checkpoint::from_logs(&self.log_data)
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.log_data.is_empty() && self.blocks.is_empty()
    }
}

#[async_trait]
impl RoundSink for SyncAccumulation {
    async fn accept(&mut self, batch: RoundBatch) -> SyncResult<()> {
        self.merge(batch);
        Ok(())
    }
}

/// Commits each completed round straight to a [`StorageAdapter`] instead of holding
/// the run in memory. Storage only ever sees whole rounds.
pub struct StorageSink<'a, S: StorageAdapter> {
    storage: &'a mut S,
    rounds_committed: u32,
    checkpoint: Option<Checkpoint>,
}

impl<'a, S: StorageAdapter> StorageSink<'a, S> {
    pub fn new(storage: &'a mut S) -> Self {
        Self {
            storage,
            rounds_committed: 0,
            checkpoint: None,
        }
    }

    /// Refuse to start a run against storage that cannot take writes
    pub async fn ensure_available(&self) -> SyncResult<()> {
        if !self.storage.is_available().await {
            return Err(SyncError::Storage("Storage is not available".to_string()));
        }
        Ok(())
    }

    pub fn rounds_committed(&self) -> u32 {
        self.rounds_committed
    }

    /// Highest log block number committed through this sink
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoint
    }
}

#[async_trait]
impl<'a, S: StorageAdapter> RoundSink for StorageSink<'a, S> {
    async fn accept(&mut self, batch: RoundBatch) -> SyncResult<()> {
        self.storage.append_round(&batch).await?;
        self.rounds_committed += 1;
        self.checkpoint = Checkpoint::merge(self.checkpoint, batch.checkpoint());
        debug!(
            "Committed round {} ({} logs)",
            self.rounds_committed,
            batch.logs.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{transfer_log, MockStorage};
    use crate::DecodeOutcome;
    use alloy_primitives::Address;

    fn batch(blocks: &[u64]) -> RoundBatch {
        let token = Address::repeat_byte(5);
        let logs: Vec<RawLog> = blocks
            .iter()
            .map(|b| transfer_log(token, *b, 0, 1))
            .collect();
        let decoded_logs = logs
            .iter()
            .map(|l| {
                DecodedLog::new(
                    l,
                    DecodeOutcome::Failed {
                        reason: "not decoded in this test".to_string(),
                    },
                )
            })
            .collect();
        RoundBatch {
            transactions: Vec::new(),
            decoded_logs,
            logs,
            blocks: Vec::new(),
        }
    }

    #[test]
    fn test_merge_preserves_arrival_order() {
        let mut acc = SyncAccumulation::new();
        acc.merge(batch(&[9, 3]));
        acc.merge(batch(&[1, 7]));
        let order: Vec<u64> = acc.log_data.iter().map(|l| l.block_number).collect();
        assert_eq!(order, vec![9, 3, 1, 7]);
        let decoded_order: Vec<u64> = acc.decoded_log_data.iter().map(|l| l.block_number).collect();
        assert_eq!(decoded_order, order);
        assert_eq!(acc.checkpoint(), Some(Checkpoint { block_number: 9 }));
    }

    #[test]
    fn test_merge_does_not_dedupe() {
        let mut acc = SyncAccumulation::new();
        acc.merge(batch(&[4]));
        acc.merge(batch(&[4]));
        assert_eq!(acc.log_data.len(), 2);
        assert_eq!(acc.log_data[0].key(), acc.log_data[1].key());
    }

    #[tokio::test]
    async fn test_storage_sink_commits_whole_rounds() {
        let mut storage = MockStorage::new();
        {
            let mut sink = StorageSink::new(&mut storage);
            sink.accept(batch(&[10, 11])).await.unwrap();
            sink.accept(batch(&[11, 12])).await.unwrap();
            assert_eq!(sink.rounds_committed(), 2);
            assert_eq!(sink.checkpoint(), Some(Checkpoint { block_number: 12 }));
        }
        // block 11 with log index 0 in the same tx is the same row
        assert_eq!(storage.log_count(), 3);
        assert_eq!(storage.max_block_number().await.unwrap(), Some(12));
    }

    #[tokio::test]
    async fn test_storage_sink_surfaces_storage_errors() {
        let mut storage = MockStorage::new();
        storage.set_available(false);
        let mut sink = StorageSink::new(&mut storage);
        assert!(sink.accept(batch(&[1])).await.is_err());
        assert_eq!(sink.rounds_committed(), 0);
    }

    #[tokio::test]
    async fn test_storage_sink_checks_availability() {
        let mut storage = MockStorage::new();
        assert!(StorageSink::new(&mut storage).ensure_available().await.is_ok());
        storage.set_available(false);
        let sink = StorageSink::new(&mut storage);
        assert!(matches!(
            sink.ensure_available().await,
            Err(SyncError::Storage(_))
        ));
    }
}
