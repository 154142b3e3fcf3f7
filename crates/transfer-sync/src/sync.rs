//! # Sync Coordinator
//!
//! [`TransferSync`] walks a block range in pages against an [`IndexingService`],
//! decodes each page with a [`LogDecoder`] and hands completed rounds to a
//! [`RoundSink`]. One instance is one explicitly constructed session: the service
//! client, decoder and ABI are owned by it and nothing is shared across runs.
//!
//! ## State machine
//!
//! ```text
//! INIT ──> RUNNING ──(archive_height < next_block)──> DONE (CaughtUp)
//!            │  ^   ──(next_block >= to_block)─────> DONE (ReachedTarget)
//!            │  │   ──(stopped at round boundary)──> DONE (Cancelled)
//!            └──┘ from_block = next_block
//! ```
//!
//! INIT reads the chain height once and builds the first descriptor from the mode:
//!
//! - **Full**: `[0, height)`
//! - **Incremental**: `[height - lookback_window, ..)`
//! - **Resume**: `[from_block, ..)`
//!
//! Rounds run strictly in range order. Round N+1 is not issued before round N is
//! decoded and handed to the sink, since its `from_block` comes from round N's
//! response. The comparison is strict: `archive_height == next_block` continues.
//!
//! ## Failures
//!
//! A round that fails (after any configured same-range retries) aborts the run with
//! [`SyncError::Interrupted`], carrying the `from_block` of that round. Nothing from
//! the failed round reaches the sink, so a store fed by [`crate::StorageSink`] holds
//! only complete rounds and the run can be restarted from the reported cursor.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let sync = TransferSync::new(service, DynAbiDecoder::new(), AbiText::erc20(), config)?;
//! let report = sync.run().await?;
//! println!("{} logs, checkpoint {:?}", report.accumulation.log_data.len(), report.summary.checkpoint);
//! ```

use log::{debug, error, info, warn};
use rand::Rng;
use std::cmp::min;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::{
    fetch_and_decode, AbiText, Checkpoint, FetchedRound, IndexingService, LogDecoder, RangeQuery,
    RoundSink, RunSummary, StopReason, SyncAccumulation, SyncConfig, SyncError, SyncMode,
    SyncResult, SyncStatus,
};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(16);

/// What the coordinator does after a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundDecision {
    Continue(u64),
    Done(StopReason),
}

/// Transition rule applied after every round
pub fn decide(query: &RangeQuery, archive_height: u64, next_block: u64) -> RoundDecision {
    if archive_height < next_block {
        return RoundDecision::Done(StopReason::CaughtUp);
    }
    if let Some(to_block) = query.to_block() {
        if next_block >= to_block {
            return RoundDecision::Done(StopReason::ReachedTarget);
        }
    }
    RoundDecision::Continue(next_block)
}

fn first_retry_delay(base: Duration) -> Duration {
    min(MAX_RETRY_DELAY, base)
}

/// Doubled delay plus jitter, never above [`MAX_RETRY_DELAY`]
fn next_retry_delay(delay: Duration, jitter: Duration) -> Duration {
    min(
        MAX_RETRY_DELAY,
        delay.saturating_mul(2).saturating_add(jitter),
    )
}

/// Wrap a round failure with the position the run can be restarted from
fn interrupted(cursor: u64, rounds: u32) -> impl Fn(SyncError) -> SyncError {
    move |source| SyncError::Interrupted {
        cursor,
        rounds,
        source: Box::new(source),
    }
}

/// Result of [`TransferSync::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub accumulation: SyncAccumulation,
    pub summary: RunSummary,
}

/// Lets another task abandon a run at the next round boundary.
///
/// A stop requested before the run starts is kept and ends that run at its first
/// boundary. The request is cleared once the run it applied to has returned.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    stop_requested: Arc<AtomicBool>,
}

impl SyncHandle {
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }
}

/// Incremental ERC-20 transfer log synchronization engine
pub struct TransferSync<S, D>
where
    S: IndexingService,
    D: LogDecoder,
{
    service: Arc<S>,
    decoder: Arc<D>,
    abi: AbiText,
    pub config: SyncConfig,
    is_running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    cursor: Arc<AtomicU64>,
    rounds_completed: Arc<AtomicU32>,
    logs_seen: Arc<AtomicU64>,
    archive_height: Arc<AtomicU64>,
}

impl<S, D> TransferSync<S, D>
where
    S: IndexingService + 'static,
    D: LogDecoder + 'static,
{
    /// Create a sync session. Fails if the ABI cannot decode the filtered event or the
    /// field selection drops key columns.
    pub fn new(service: S, decoder: D, abi: AbiText, config: SyncConfig) -> SyncResult<Self> {
        config.field_selection.validate()?;
        abi.require_events(config.event_filter.topics())?;
        if config.block_chunk == Some(0) {
            return Err(SyncError::Config("block_chunk must be positive".to_string()));
        }
        Ok(Self {
            service: Arc::new(service),
            decoder: Arc::new(decoder),
            abi,
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            cursor: Arc::new(AtomicU64::new(0)),
            rounds_completed: Arc::new(AtomicU32::new(0)),
            logs_seen: Arc::new(AtomicU64::new(0)),
            archive_height: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            stop_requested: self.stop_requested.clone(),
        }
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_running: self.is_running.load(Ordering::SeqCst),
            cursor: self.cursor.load(Ordering::SeqCst),
            rounds_completed: self.rounds_completed.load(Ordering::SeqCst),
            logs_seen: self.logs_seen.load(Ordering::SeqCst),
            archive_height: self.archive_height.load(Ordering::SeqCst),
        }
    }

    /// INIT: read the chain height once and build the first round's descriptor
    pub async fn plan(&self) -> SyncResult<RangeQuery> {
        let height = self.service.get_height().await?;
        let (from_block, to_block) = match self.config.mode {
            SyncMode::Full => (0, Some(height)),
            SyncMode::Incremental { lookback_window } => {
                (height.saturating_sub(lookback_window), None)
            }
            SyncMode::Resume { from_block } => (from_block, None),
        };
        info!(
            "Planned {:?} sync at height {}: from_block={} to_block={:?}",
            self.config.mode, height, from_block, to_block
        );
        Ok(RangeQuery::build(
            from_block,
            to_block,
            &self.config.event_filter,
            &self.config.field_selection,
        )?
        .with_max_num_blocks(self.config.block_chunk))
    }

    /// Run to completion and return everything fetched
    pub async fn run(&self) -> SyncResult<SyncReport> {
        let mut accumulation = SyncAccumulation::new();
        let summary = self.run_with(&mut accumulation).await?;
        Ok(SyncReport {
            accumulation,
            summary,
        })
    }

    /// Run to completion, handing every completed round to `sink`
    pub async fn run_with<K>(&self, sink: &mut K) -> SyncResult<RunSummary>
    where
        K: RoundSink + ?Sized,
    {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::Config("Sync is already running".to_string()));
        }
        self.rounds_completed.store(0, Ordering::SeqCst);
        self.logs_seen.store(0, Ordering::SeqCst);

        let result = self.walk(sink).await;
        self.stop_requested.store(false, Ordering::SeqCst);
        self.is_running.store(false, Ordering::SeqCst);
        if let Err(e) = &result {
            error!("Sync run failed: {}", e);
        }
        result
    }

    async fn walk<K>(&self, sink: &mut K) -> SyncResult<RunSummary>
    where
        K: RoundSink + ?Sized,
    {
        let mut query = self.plan().await?;
        let start_block = query.from_block();
        let mut rounds = 0u32;
        let mut logs = 0usize;
        let mut transactions = 0usize;
        let mut blocks = 0usize;
        let mut checkpoint: Option<Checkpoint> = None;
        let mut archive_height = 0u64;

        let stop_reason = loop {
            self.cursor.store(query.from_block(), Ordering::SeqCst);
            if self.stop_requested.load(Ordering::SeqCst) {
                info!("Sync stopped at block {}", query.from_block());
                break StopReason::Cancelled;
            }

            let fetched = self
                .run_round(&query)
                .await
                .map_err(interrupted(query.from_block(), rounds))?;
            if fetched.next_block < query.from_block() {
                return Err(interrupted(query.from_block(), rounds)(SyncError::Transport(format!(
                    "service cursor moved backwards: {} -> {}",
                    query.from_block(),
                    fetched.next_block
                ))));
            }

            let decision = decide(&query, fetched.archive_height, fetched.next_block);
            archive_height = fetched.archive_height;
            let batch = fetched.batch;
            let round_logs = batch.logs.len();
            let round_checkpoint = batch.checkpoint();
            logs += round_logs;
            transactions += batch.transactions.len();
            blocks += batch.blocks.len();

            sink.accept(batch)
                .await
                .map_err(interrupted(query.from_block(), rounds))?;

            rounds += 1;
            checkpoint = Checkpoint::merge(checkpoint, round_checkpoint);
            self.rounds_completed.store(rounds, Ordering::SeqCst);
            self.logs_seen.fetch_add(round_logs as u64, Ordering::SeqCst);
            self.archive_height.store(archive_height, Ordering::SeqCst);
            info!(
                "Scanned up to block {} (round {}, {} logs, {} blocks so far)",
                fetched.next_block, rounds, logs, blocks
            );

            match decision {
                RoundDecision::Done(reason) => {
                    self.cursor.store(fetched.next_block, Ordering::SeqCst);
                    break reason;
                }
                RoundDecision::Continue(next_block) => {
                    if next_block == query.from_block() {
                        warn!("Service cursor did not advance past block {}", next_block);
                    }
                    query = query
                        .advance(next_block)
                        .map_err(interrupted(next_block, rounds))?;
                }
            }
        };

        let summary = RunSummary {
            start_block,
            to_block: query.to_block(),
            next_block: self.cursor.load(Ordering::SeqCst),
            archive_height,
            rounds,
            logs,
            transactions,
            blocks,
            checkpoint,
            stop_reason,
        };
        info!(
            "Sync finished ({:?}) after {} rounds: {} logs, {} transactions, {} blocks, checkpoint {:?}",
            summary.stop_reason,
            summary.rounds,
            summary.logs,
            summary.transactions,
            summary.blocks,
            summary.checkpoint.map(|c| c.block_number)
        );
        Ok(summary)
    }

    /// One fetch-decode step under the configured deadline, retrying transport
    /// failures with the same descriptor.
    async fn run_round(&self, query: &RangeQuery) -> SyncResult<FetchedRound> {
        let mut attempt = 0u32;
        let mut retry_delay = first_retry_delay(self.config.retry_base_delay);
        loop {
            debug!(
                "Round from_block={} to_block={:?} attempt {}",
                query.from_block(),
                query.to_block(),
                attempt + 1
            );
            let step = fetch_and_decode(&*self.service, &*self.decoder, &self.abi, query);
            let result = match self.config.round_timeout {
                Some(limit) => match tokio::time::timeout(limit, step).await {
                    Ok(result) => result,
                    Err(_) => Err(SyncError::Transport(format!(
                        "round from block {} timed out after {:?}",
                        query.from_block(),
                        limit
                    ))),
                },
                None => step.await,
            };

            match result {
                Ok(round) => return Ok(round),
                Err(e) if e.is_retryable() && attempt < self.config.max_round_retries => {
                    attempt += 1;
                    warn!(
                        "Round from block {} failed (attempt {}): {}, retrying in {:?}",
                        query.from_block(),
                        attempt,
                        e,
                        retry_delay
                    );
                    sleep(retry_delay).await;
                    let jitter = rand::thread_rng().gen_range(0..=100u64);
                    retry_delay = next_retry_delay(retry_delay, Duration::from_millis(jitter));
                }
                Err(e) => return Err(e),
            }
        }
    }
}
