//! Incremental and resume walks up to the live tip

use async_trait::async_trait;
use transfer_sync::mock::MockStorage;
use transfer_sync::{
    RoundBatch, RoundSink, StopReason, StorageAdapter, StorageSink, SyncMode, SyncResult,
};

use super::{TestConfig, TestUtils};

/// Records `(logs, blocks)` per round
#[derive(Default)]
struct RecordingSink {
    rounds: Vec<(usize, usize)>,
}

#[async_trait]
impl RoundSink for RecordingSink {
    async fn accept(&mut self, batch: RoundBatch) -> SyncResult<()> {
        self.rounds.push((batch.logs.len(), batch.blocks.len()));
        Ok(())
    }
}

#[tokio::test]
async fn test_incremental_stops_on_first_caught_up_round() {
    TestUtils::init_logging();
    let service = TestUtils::chain(1000, 100, 25);
    let sync = TestConfig::new(SyncMode::Incremental { lookback_window: 450 })
        .engine(&service)
        .unwrap();
    let mut sink = RecordingSink::default();
    let summary = sync.run_with(&mut sink).await.unwrap();

    // [550,650) [650,750) [750,850) [850,950) [950,1001)
    let froms: Vec<u64> = service.queries().iter().map(|q| q.from_block()).collect();
    assert_eq!(froms, vec![550, 650, 750, 850, 950]);
    assert_eq!(summary.rounds, 5);
    assert_eq!(sink.rounds.len(), 5);
    assert_eq!(summary.stop_reason, StopReason::CaughtUp);
    assert_eq!(summary.next_block, 1001);
    assert_eq!(summary.checkpoint.map(|c| c.block_number), Some(1000));
    assert_eq!(sink.rounds.last(), Some(&(3, 3)));
}

#[tokio::test]
async fn test_rerun_from_checkpoint_overlaps_and_storage_dedupes() {
    let lookback_window = 200;
    let service = TestUtils::chain(1000, 100, 20);
    let mut storage = MockStorage::new();

    let first = TestConfig::new(SyncMode::Incremental { lookback_window })
        .engine(&service)
        .unwrap();
    let report = first.run().await.unwrap();
    let checkpoint = report.summary.checkpoint.unwrap();
    assert_eq!(checkpoint.block_number, 1000);
    // 800, 820, ..., 1000
    assert_eq!(report.accumulation.log_data.len(), 11);
    StorageSink::new(&mut storage)
        .accept(RoundBatch {
            logs: report.accumulation.log_data.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(storage.log_count(), 11);

    // the chain grows, the next run starts a window behind the checkpoint
    service.set_height(1300);
    service.add_transfers(TestUtils::token(), (1020..=1300).step_by(20));
    let second = TestConfig::new(SyncMode::Resume {
        from_block: checkpoint.resume_from(lookback_window),
    })
    .engine(&service)
    .unwrap();
    let rerun = second.run().await.unwrap();

    // overlap 800..=1000 is fetched again
    assert_eq!(rerun.accumulation.log_data.len(), 26);
    assert_eq!(rerun.summary.checkpoint.map(|c| c.block_number), Some(1300));

    let mut sink = StorageSink::new(&mut storage);
    sink.accept(RoundBatch {
        logs: rerun.accumulation.log_data,
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(storage.log_count(), 26);
    assert_eq!(storage.max_block_number().await.unwrap(), Some(1300));
}

#[tokio::test]
async fn test_resume_past_tip_finishes_immediately() {
    let service = TestUtils::chain(500, 100, 10);
    let sync = TestConfig::new(SyncMode::Resume { from_block: 900 })
        .engine(&service)
        .unwrap();
    let report = sync.run().await.unwrap();
    assert_eq!(report.summary.rounds, 1);
    assert_eq!(report.summary.stop_reason, StopReason::CaughtUp);
    assert!(report.accumulation.is_empty());
}

#[tokio::test]
async fn test_retry_covers_flaky_service() {
    let service = TestUtils::chain(400, 100, 10);
    service.fail_next(1);
    let sync = TestConfig::new(SyncMode::Incremental { lookback_window: 400 })
        .with_retries(3)
        .engine(&service)
        .unwrap();
    let report = sync.run().await.unwrap();
    assert_eq!(report.accumulation.log_data.len(), 41);
    assert_eq!(report.summary.rounds, 5);
}
