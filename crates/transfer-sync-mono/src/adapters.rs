//! HTTP adapter for the indexing service's JSON API

use alloy_primitives::{Address, Bytes, B256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use transfer_sync::{
    Block, IndexingService, RangeQuery, RawFetchResult, RawLog, SyncError, SyncResult,
    Transaction,
};

/// Block numbers and indexes arrive either as JSON numbers or as hex/decimal strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireNumber {
    Int(u64),
    Text(String),
}

impl WireNumber {
    pub fn to_u64(&self) -> SyncResult<u64> {
        match self {
            WireNumber::Int(n) => Ok(*n),
            WireNumber::Text(s) => {
                let parsed = match s.strip_prefix("0x") {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => s.parse(),
                };
                parsed.map_err(|e| SyncError::Transport(format!("bad number {:?}: {}", s, e)))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HeightResponse {
    pub height: WireNumber,
}

#[derive(Debug, Deserialize)]
pub struct WireLog {
    #[serde(default)]
    pub removed: Option<bool>,
    pub log_index: WireNumber,
    #[serde(default)]
    pub transaction_index: Option<WireNumber>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    pub block_number: WireNumber,
    pub address: Address,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub topic0: Option<B256>,
    #[serde(default)]
    pub topic1: Option<B256>,
    #[serde(default)]
    pub topic2: Option<B256>,
    #[serde(default)]
    pub topic3: Option<B256>,
}

impl WireLog {
    pub fn into_raw(self) -> SyncResult<RawLog> {
        let topics = [self.topic0, self.topic1, self.topic2, self.topic3]
            .into_iter()
            .map_while(|topic| topic)
            .collect();
        Ok(RawLog {
            block_number: self.block_number.to_u64()?,
            log_index: self.log_index.to_u64()?,
            transaction_index: self
                .transaction_index
                .as_ref()
                .map(WireNumber::to_u64)
                .transpose()?,
            transaction_hash: self.transaction_hash,
            block_hash: self.block_hash,
            address: self.address,
            topics,
            data: self.data,
            removed: self.removed,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseData {
    #[serde(default)]
    pub logs: Vec<WireLog>,
    #[serde(default)]
    pub transactions: Vec<Map<String, Value>>,
    #[serde(default)]
    pub blocks: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Vec<ResponseData>,
    #[serde(default)]
    pub archive_height: Option<WireNumber>,
    pub next_block: WireNumber,
}

fn take_u64(row: &mut Map<String, Value>, key: &str) -> SyncResult<u64> {
    let value = row
        .remove(key)
        .ok_or_else(|| SyncError::Transport(format!("row is missing {}", key)))?;
    serde_json::from_value::<WireNumber>(value)
        .map_err(|e| SyncError::Transport(format!("bad {}: {}", key, e)))?
        .to_u64()
}

fn take_hash(row: &mut Map<String, Value>, key: &str) -> SyncResult<Option<B256>> {
    match row.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SyncError::Transport(format!("bad {}: {}", key, e))),
    }
}

impl QueryResponse {
    /// Flatten the response batches into one round's rows
    pub fn into_fetch_result(self) -> SyncResult<RawFetchResult> {
        let mut result = RawFetchResult {
            // A service with no data yet reports no archive height
            archive_height: match &self.archive_height {
                Some(height) => height.to_u64()?,
                None => 0,
            },
            next_block: self.next_block.to_u64()?,
            ..Default::default()
        };
        for batch in self.data {
            for log in batch.logs {
                result.logs.push(log.into_raw()?);
            }
            for mut row in batch.transactions {
                let block_number = take_u64(&mut row, "block_number")?;
                let transaction_index = take_u64(&mut row, "transaction_index")?;
                let hash = take_hash(&mut row, "hash")?
                    .ok_or_else(|| SyncError::Transport("transaction is missing hash".to_string()))?;
                result.transactions.push(Transaction {
                    block_number,
                    transaction_index,
                    hash,
                    fields: row,
                });
            }
            for mut row in batch.blocks {
                let number = take_u64(&mut row, "number")?;
                let hash = take_hash(&mut row, "hash")?;
                result.blocks.push(Block {
                    number,
                    hash,
                    fields: row,
                });
            }
        }
        Ok(result)
    }
}

/// Indexing service client over HTTP. `GET {url}/height` and `POST {url}/query`.
#[derive(Clone)]
pub struct HypersyncHttpAdapter {
    client: reqwest::Client,
    url: String,
    bearer_token: Option<String>,
}

impl HypersyncHttpAdapter {
    pub fn new(url: &str, bearer_token: Option<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            bearer_token,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> SyncResult<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("{} request failed: {}", endpoint, e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Transport(format!(
                "{} returned {}: {}",
                endpoint, status, body
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::Transport(format!("malformed {} response: {}", endpoint, e)))
    }
}

#[async_trait]
impl IndexingService for HypersyncHttpAdapter {
    async fn get_height(&self) -> SyncResult<u64> {
        let response: HeightResponse = self
            .send(self.client.get(format!("{}/height", self.url)), "height")
            .await?;
        response.height.to_u64()
    }

    async fn send_query(&self, query: &RangeQuery) -> SyncResult<RawFetchResult> {
        debug!(
            "POST {}/query from_block={} to_block={:?}",
            self.url,
            query.from_block(),
            query.to_block()
        );
        let response: QueryResponse = self
            .send(
                self.client.post(format!("{}/query", self.url)).json(query),
                "query",
            )
            .await?;
        response.into_fetch_result()
    }
}
