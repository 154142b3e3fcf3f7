//! # Fetch-Decode Step
//!
//! One round trip: send the descriptor to the indexing service, map every address
//! seen in the response to the run's ABI, decode all returned logs in one call.
//!
//! The address map is rebuilt from scratch every round since each page sees a
//! different set of token contracts. Every emitter of a matching `Transfer` topic is
//! assumed to be ERC-20, so all addresses share one ABI text.

use log::debug;

use crate::{
    AbiMap, AbiText, Block, Checkpoint, DecodedLog, IndexingService, LogDecoder, RangeQuery,
    RawLog, SyncError, SyncResult, Transaction,
};

/// Rows produced by one completed round, in service response order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundBatch {
    pub transactions: Vec<Transaction>,
    pub decoded_logs: Vec<DecodedLog>,
    pub logs: Vec<RawLog>,
    pub blocks: Vec<Block>,
}

impl RoundBatch {
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        Checkpoint::from_logs(&self.logs)
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.logs.is_empty() && self.blocks.is_empty()
    }
}

/// A round's rows plus the service's cursor report
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRound {
    pub batch: RoundBatch,
    pub archive_height: u64,
    pub next_block: u64,
}

pub fn build_abi_map<'a>(logs: impl IntoIterator<Item = &'a RawLog>, abi: &AbiText) -> AbiMap {
    let text = abi.shared();
    logs.into_iter()
        .map(|log| (log.address, text.clone()))
        .collect()
}

/// Run one fetch then one decode for `query`.
///
/// Transport failures propagate unchanged. Per-log decode failures are carried in
/// the returned [`DecodedLog`]s.
pub async fn fetch_and_decode<S, D>(
    service: &S,
    decoder: &D,
    abi: &AbiText,
    query: &RangeQuery,
) -> SyncResult<FetchedRound>
where
    S: IndexingService + ?Sized,
    D: LogDecoder + ?Sized,
{
    let raw = service.send_query(query).await?;
    debug!(
        "Query from {} returned {} logs, {} transactions, {} blocks (next_block={}, archive_height={})",
        query.from_block(),
        raw.logs.len(),
        raw.transactions.len(),
        raw.blocks.len(),
        raw.next_block,
        raw.archive_height
    );

    let abis = build_abi_map(&raw.logs, abi);
    let decoded_logs = decoder.decode_logs(&abis, &raw.logs).await?;
    if decoded_logs.len() != raw.logs.len() {
        return Err(SyncError::Decode(format!(
            "decoder returned {} entries for {} logs",
            decoded_logs.len(),
            raw.logs.len()
        )));
    }

    Ok(FetchedRound {
        batch: RoundBatch {
            transactions: raw.transactions,
            decoded_logs,
            logs: raw.logs,
            blocks: raw.blocks,
        },
        archive_height: raw.archive_height,
        next_block: raw.next_block,
    })
}
