//! RocksDB options for the log store.
//!
//! The workload is append-mostly: every round writes a batch of rows whose keys
//! start with a block number, and reads are limited to a reverse scan for the
//! checkpoint and occasional full scans for inspection.

use rocksdb::{BlockBasedOptions, Cache, DBCompressionType, Options};

pub const DEFAULT_CACHE_SIZE: usize = 256 * 1024 * 1024;

pub fn create_log_store_options() -> Options {
    create_log_store_options_with_cache(DEFAULT_CACHE_SIZE)
}

pub fn create_log_store_options_with_cache(cache_size: usize) -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);

    opts.set_write_buffer_size(64 * 1024 * 1024);
    opts.set_max_write_buffer_number(4);
    opts.increase_parallelism(num_cpus::get() as i32);

    let cache = Cache::new_lru_cache(cache_size);
    let mut table_opts = BlockBasedOptions::default();
    table_opts.set_block_cache(&cache);
    table_opts.set_cache_index_and_filter_blocks(true);
    table_opts.set_bloom_filter(10.0, false);
    opts.set_block_based_table_factory(&table_opts);

    // Rows are JSON, which compresses well
    opts.set_compression_type(DBCompressionType::Lz4);
    opts.set_level_compaction_dynamic_level_bytes(true);
    opts.set_keep_log_file_num(5);

    opts
}

/// Column family options. Keys share a big-endian block number prefix.
pub fn create_column_family_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(DBCompressionType::Lz4);
    opts
}
