//! Interrupted runs committing into RocksDB, then resumed

use tempfile::TempDir;
use transfer_sync::{
    DecodeOutcome, StopReason, StorageAdapter, StorageSink, SyncError, SyncMode,
};

use super::{TestConfig, TestUtils};

#[tokio::test]
async fn test_interrupted_full_sync_resumes_from_cursor() {
    TestUtils::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let mut store = TestUtils::open_store(temp_dir.path()).unwrap();
    let service = TestUtils::chain(1000, 100, 10);
    service.fail_from_block(Some(500));

    let sync = TestConfig::new(SyncMode::Full).engine(&service).unwrap();
    let err = {
        let mut sink = StorageSink::new(&mut store);
        sync.run_with(&mut sink).await.unwrap_err()
    };
    let cursor = match &err {
        SyncError::Interrupted { cursor, rounds, .. } => {
            assert_eq!(*rounds, 5);
            *cursor
        }
        other => panic!("expected Interrupted, got {:?}", other),
    };
    assert_eq!(cursor, 500);
    assert!(err.to_string().contains("resume from block 500"));

    // only whole rounds were committed
    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.logs, 50);
    assert_eq!(stats.max_block_number, Some(490));

    // the service recovers, pick up where the failed round started
    service.fail_from_block(None);
    let resumed = TestConfig::new(SyncMode::Resume { from_block: cursor })
        .engine(&service)
        .unwrap();
    let summary = {
        let mut sink = StorageSink::new(&mut store);
        resumed.run_with(&mut sink).await.unwrap()
    };
    assert_eq!(summary.stop_reason, StopReason::CaughtUp);
    assert_eq!(summary.start_block, 500);

    let stats = store.get_stats().await.unwrap();
    // 0, 10, ..., 1000: the resumed walk is unbounded so the tip block is included
    assert_eq!(stats.logs, 101);
    assert_eq!(stats.decoded_logs, 101);
    assert_eq!(stats.max_block_number, Some(1000));
    assert_eq!(
        store.top_block_numbers(3).await.unwrap(),
        vec![1000, 990, 980]
    );
}

#[tokio::test]
async fn test_resume_from_store_checkpoint_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let service = TestUtils::chain(300, 64, 7);

    {
        let mut store = TestUtils::open_store(temp_dir.path()).unwrap();
        let sync = TestConfig::new(SyncMode::Incremental { lookback_window: 300 })
            .engine(&service)
            .unwrap();
        let mut sink = StorageSink::new(&mut store);
        sync.run_with(&mut sink).await.unwrap();
        assert!(sink.rounds_committed() > 1);
    }

    let mut store = TestUtils::open_store(temp_dir.path()).unwrap();
    let before = store.get_stats().await.unwrap();
    let checkpoint = store.checkpoint().await.unwrap().unwrap();
    assert_eq!(checkpoint.block_number, 294);

    let sync = TestConfig::new(SyncMode::Resume {
        from_block: checkpoint.block_number,
    })
    .engine(&service)
    .unwrap();
    let summary = {
        let mut sink = StorageSink::new(&mut store);
        sync.run_with(&mut sink).await.unwrap()
    };
    // the checkpoint block is fetched again and overwrites itself
    assert_eq!(summary.logs, 1);
    assert_eq!(store.get_stats().await.unwrap(), before);
}

#[tokio::test]
async fn test_decode_failures_are_stored_inline() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = TestUtils::open_store(temp_dir.path()).unwrap();
    let service = TestUtils::chain(100, 100, 50);
    let mut nft = transfer_sync::mock::transfer_log(TestUtils::token(), 70, 1, 0);
    nft.topics.push(alloy_primitives::B256::with_last_byte(9));
    nft.data = alloy_primitives::Bytes::new();
    service.add_log(nft);

    let sync = TestConfig::new(SyncMode::Full).engine(&service).unwrap();
    {
        let mut sink = StorageSink::new(&mut store);
        sync.run_with(&mut sink).await.unwrap();
    }

    let decoded = store.read_decoded_logs().unwrap();
    assert_eq!(decoded.len(), 3);
    let failed: Vec<_> = decoded
        .iter()
        .filter(|d| matches!(d.outcome, DecodeOutcome::Failed { .. }))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].block_number, 70);
    assert_eq!(store.read_logs().unwrap().len(), 3);
}
