//! RocksDB-backed storage for transfer-sync

pub mod options;
pub mod store;

pub use options::{create_log_store_options, create_log_store_options_with_cache};
pub use store::{RocksDBLogStore, BLOCKS_CF, COLUMN_FAMILIES, DECODED_LOGS_CF, LOGS_CF, TRANSACTIONS_CF};
