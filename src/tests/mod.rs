//! Scenario tests and the helpers they share

use alloy_primitives::Address;
use std::path::Path;
use std::time::Duration;
use transfer_sync::mock::MockIndexingService;
use transfer_sync::{
    AbiText, DynAbiDecoder, SyncConfig, SyncMode, SyncResult, TransferSync,
};
use transfer_sync_rocks::{create_log_store_options_with_cache, RocksDBLogStore};

pub mod incremental_sync_test;
pub mod rocks_resume_test;

/// Sync configuration for a test run
pub struct TestConfig {
    pub config: SyncConfig,
}

impl TestConfig {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            config: SyncConfig {
                mode,
                retry_base_delay: Duration::from_millis(1),
                ..Default::default()
            },
        }
    }

    pub fn with_block_chunk(mut self, block_chunk: u64) -> Self {
        self.config.block_chunk = Some(block_chunk);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.config.max_round_retries = retries;
        self
    }

    /// Engine over a clone of `service`, so the caller keeps its handle for inspection
    pub fn engine(
        self,
        service: &MockIndexingService,
    ) -> SyncResult<TransferSync<MockIndexingService, DynAbiDecoder>> {
        TransferSync::new(
            service.clone(),
            DynAbiDecoder::new(),
            AbiText::erc20(),
            self.config,
        )
    }
}

/// General-purpose test utilities
pub struct TestUtils;

impl TestUtils {
    pub fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    pub fn token() -> Address {
        Address::repeat_byte(0x42)
    }

    /// Mock chain with one transfer every `spacing` blocks in `[0, height]`
    pub fn chain(height: u64, page_size: u64, spacing: u64) -> MockIndexingService {
        let service = MockIndexingService::new(height, page_size);
        service.add_transfers(Self::token(), (0..=height).step_by(spacing as usize));
        service
    }

    pub fn open_store(path: &Path) -> SyncResult<RocksDBLogStore> {
        RocksDBLogStore::open_with_options(path, create_log_store_options_with_cache(8 * 1024 * 1024))
    }
}
