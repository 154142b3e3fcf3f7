//! Mock implementations for testing

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde_json::Map;
use std::cmp::{max, min};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::{
    Block, DecodedLog, IndexingService, LogKey, RangeQuery, RawFetchResult, RawLog, RoundBatch,
    StorageAdapter, StorageStats, SyncError, SyncResult, Transaction, TRANSFER_TOPIC,
};

/// Transaction hash derived from position so the same log always gets the same key
pub fn synthetic_tx_hash(block_number: u64, log_index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[16..24].copy_from_slice(&block_number.to_be_bytes());
    bytes[24..].copy_from_slice(&log_index.to_be_bytes());
    B256::from(bytes)
}

/// An ERC-20 `Transfer` log from `0xaa..aa` to `0xbb..bb` emitted by `token`
pub fn transfer_log(token: Address, block_number: u64, log_index: u64, amount: u64) -> RawLog {
    RawLog {
        block_number,
        log_index,
        transaction_index: Some(log_index),
        transaction_hash: Some(synthetic_tx_hash(block_number, log_index)),
        block_hash: Some(B256::left_padding_from(&block_number.to_be_bytes())),
        address: token,
        topics: vec![
            TRANSFER_TOPIC,
            Address::repeat_byte(0xaa).into_word(),
            Address::repeat_byte(0xbb).into_word(),
        ],
        data: Bytes::from(U256::from(amount).to_be_bytes::<32>().to_vec()),
        removed: None,
    }
}

/// Mock indexing service over a synthetic chain.
///
/// Pages are at most `page_size` blocks, further capped by the query's `to_block`
/// and `max_num_blocks`, and never past `height`. `next_block` is the end of the
/// page, so a tail page reports `height + 1` and the run catches up.
#[derive(Debug, Clone)]
pub struct MockIndexingService {
    height: Arc<RwLock<u64>>,
    page_size: u64,
    logs: Arc<RwLock<BTreeMap<u64, Vec<RawLog>>>>,
    queries: Arc<Mutex<Vec<RangeQuery>>>,
    fail_next: Arc<RwLock<u32>>,
    fail_from_block: Arc<RwLock<Option<u64>>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl MockIndexingService {
    pub fn new(height: u64, page_size: u64) -> Self {
        Self {
            height: Arc::new(RwLock::new(height)),
            page_size: max(page_size, 1),
            logs: Arc::new(RwLock::new(BTreeMap::new())),
            queries: Arc::new(Mutex::new(Vec::new())),
            fail_next: Arc::new(RwLock::new(0)),
            fail_from_block: Arc::new(RwLock::new(None)),
            latency: Arc::new(RwLock::new(None)),
        }
    }

    pub fn add_log(&self, log: RawLog) {
        let mut logs = self.logs.write().unwrap();
        logs.entry(log.block_number).or_default().push(log);
    }

    /// One transfer from `token` in each of `blocks`
    pub fn add_transfers(&self, token: Address, blocks: impl IntoIterator<Item = u64>) {
        for block in blocks {
            self.add_log(transfer_log(token, block, 0, block));
        }
    }

    pub fn set_height(&self, height: u64) {
        *self.height.write().unwrap() = height;
    }

    /// Fail the next `count` queries with a transport error
    pub fn fail_next(&self, count: u32) {
        *self.fail_next.write().unwrap() = count;
    }

    /// Fail every query whose `from_block` is at or past `block`
    pub fn fail_from_block(&self, block: Option<u64>) {
        *self.fail_from_block.write().unwrap() = block;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write().unwrap() = Some(latency);
    }

    pub fn queries(&self) -> Vec<RangeQuery> {
        self.queries.lock().unwrap().clone()
    }

    fn page(&self, query: &RangeQuery) -> RawFetchResult {
        let height = *self.height.read().unwrap();
        let from = query.from_block();
        let mut end = min(from.saturating_add(self.page_size), height.saturating_add(1));
        if let Some(to_block) = query.to_block() {
            end = min(end, to_block);
        }
        if let Some(limit) = query.max_num_blocks() {
            end = min(end, from.saturating_add(limit));
        }
        let end = max(end, from);

        let topics: Vec<B256> = query.topics().copied().collect();
        let fields = query.field_selection();
        let chain = self.logs.read().unwrap();
        let logs: Vec<RawLog> = chain
            .range(from..end)
            .flat_map(|(_, logs)| logs.iter())
            .filter(|log| log.topics.first().is_some_and(|t| topics.contains(t)))
            .cloned()
            .collect();

        let transactions = if fields.transaction.is_empty() {
            Vec::new()
        } else {
            logs.iter()
                .map(|log| Transaction {
                    block_number: log.block_number,
                    transaction_index: log.transaction_index.unwrap_or_default(),
                    hash: log.transaction_hash.unwrap_or_default(),
                    fields: Map::new(),
                })
                .collect()
        };

        let mut blocks: Vec<Block> = Vec::new();
        if !fields.block.is_empty() {
            for log in &logs {
                if blocks.last().map(|b| b.number) != Some(log.block_number) {
                    blocks.push(Block {
                        number: log.block_number,
                        hash: log.block_hash,
                        fields: Map::new(),
                    });
                }
            }
        }

        RawFetchResult {
            logs,
            transactions,
            blocks,
            archive_height: height,
            next_block: end,
        }
    }
}

#[async_trait]
impl IndexingService for MockIndexingService {
    async fn get_height(&self) -> SyncResult<u64> {
        Ok(*self.height.read().unwrap())
    }

    async fn send_query(&self, query: &RangeQuery) -> SyncResult<RawFetchResult> {
        self.queries.lock().unwrap().push(query.clone());

        let latency = *self.latency.read().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        {
            let mut fail_next = self.fail_next.write().unwrap();
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(SyncError::Transport("injected failure".to_string()));
            }
        }
        let fail_from_block = *self.fail_from_block.read().unwrap();
        if let Some(block) = fail_from_block {
            if query.from_block() >= block {
                return Err(SyncError::Transport(format!(
                    "service unavailable from block {}",
                    block
                )));
            }
        }

        Ok(self.page(query))
    }
}

/// Indexing service that replays canned responses in order
#[derive(Debug, Clone)]
pub struct ScriptedIndexingService {
    height: u64,
    responses: Arc<Mutex<VecDeque<RawFetchResult>>>,
    queries: Arc<Mutex<Vec<RangeQuery>>>,
}

impl ScriptedIndexingService {
    pub fn new(height: u64, responses: Vec<RawFetchResult>) -> Self {
        Self {
            height,
            responses: Arc::new(Mutex::new(responses.into())),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn queries(&self) -> Vec<RangeQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexingService for ScriptedIndexingService {
    async fn get_height(&self) -> SyncResult<u64> {
        Ok(self.height)
    }

    async fn send_query(&self, query: &RangeQuery) -> SyncResult<RawFetchResult> {
        self.queries.lock().unwrap().push(query.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SyncError::Transport("no scripted response left".to_string()))
    }
}

/// In-memory storage keyed like the persistent store, so re-fetched rows collapse
#[derive(Debug, Default)]
pub struct MockStorage {
    logs: BTreeMap<LogKey, RawLog>,
    decoded_logs: BTreeMap<LogKey, DecodedLog>,
    transactions: BTreeMap<(u64, u64, B256), Transaction>,
    blocks: BTreeMap<u64, Block>,
    unavailable: bool,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&mut self, available: bool) {
        self.unavailable = !available;
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }
}

#[async_trait]
impl StorageAdapter for MockStorage {
    async fn append_round(&mut self, batch: &RoundBatch) -> SyncResult<()> {
        if self.unavailable {
            return Err(SyncError::Storage("Storage not available".to_string()));
        }
        for log in &batch.logs {
            self.logs.insert(log.key(), log.clone());
        }
        for decoded in &batch.decoded_logs {
            self.decoded_logs.insert(decoded.key(), decoded.clone());
        }
        for tx in &batch.transactions {
            self.transactions.insert(
                (tx.block_number, tx.transaction_index, tx.hash),
                tx.clone(),
            );
        }
        for block in &batch.blocks {
            self.blocks.insert(block.number, block.clone());
        }
        Ok(())
    }

    async fn max_block_number(&self) -> SyncResult<Option<u64>> {
        Ok(self.logs.keys().next_back().map(|key| key.block_number))
    }

    async fn top_block_numbers(&self, limit: usize) -> SyncResult<Vec<u64>> {
        Ok(self
            .logs
            .keys()
            .rev()
            .take(limit)
            .map(|key| key.block_number)
            .collect())
    }

    async fn is_available(&self) -> bool {
        !self.unavailable
    }

    async fn get_stats(&self) -> SyncResult<StorageStats> {
        Ok(StorageStats {
            logs: self.logs.len(),
            decoded_logs: self.decoded_logs.len(),
            transactions: self.transactions.len(),
            blocks: self.blocks.len(),
            max_block_number: self.max_block_number().await?,
        })
    }
}
