#![allow(dead_code)]

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use clipfeed::cache::{CacheStore, SharedStore};
use clipfeed::capacity::{PreloadStrategy, SystemCapacity};
use clipfeed::source::SourceConfig;

pub const MIB: u64 = 1024 * 1024;

pub fn capacity(strategy: PreloadStrategy, max_concurrent: usize) -> SystemCapacity {
    SystemCapacity {
        total_storage_bytes: 128 * 1024 * MIB,
        available_storage_bytes: 64 * 1024 * MIB,
        total_memory_bytes: 8 * 1024 * MIB,
        available_memory_bytes: 4 * 1024 * MIB,
        is_low_end_device: false,
        recommended_cache_size_bytes: 500 * MIB,
        max_concurrent_videos: max_concurrent,
        preload_strategy: strategy,
    }
}

pub fn open_store(root: &Path) -> SharedStore {
    Arc::new(Mutex::new(
        CacheStore::open(root, 50 * MIB).expect("open store"),
    ))
}

/// Small spans and no retries keep the HTTP tests quick.
pub fn source_config() -> SourceConfig {
    SourceConfig {
        http_timeout_secs: 5,
        http_connect_timeout_secs: 2,
        retries: 0,
        retry_backoff_ms: 10,
        retry_backoff_max_ms: 20,
        span_bytes: 1024,
    }
}

pub fn clip(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
