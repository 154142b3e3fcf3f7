//! transfer-sync test suite
//!
//! Cross-crate scenarios: the sync engine against the mock indexing service,
//! committing into in-memory and RocksDB stores.

pub mod tests;

// Re-export test utilities for external use
pub use tests::{TestConfig, TestUtils};
