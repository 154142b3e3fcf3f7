//! Error types for transfer-sync

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid block range: from_block {from_block} is greater than to_block {to_block}")]
    InvalidRange { from_block: u64, to_block: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("ABI unavailable: {0}")]
    AbiUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sync interrupted after {rounds} completed rounds, resume from block {cursor}: {source}")]
    Interrupted {
        cursor: u64,
        rounds: u32,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl SyncError {
    /// Only transport failures are safe to retry: re-fetching a fixed range is idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }

    /// The `from_block` of the first round that did not complete, if this error aborted a run.
    pub fn last_confirmed_cursor(&self) -> Option<u64> {
        match self {
            SyncError::Interrupted { cursor, .. } => Some(*cursor),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
