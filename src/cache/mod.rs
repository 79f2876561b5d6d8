//! 视频缓存
//!
//! - `store`：磁盘分片缓存（LRU 淘汰，按字节预算约束）
//! - `registry`：按 URL 的缓存状态记录（预加载去重、过期清理）
//! - `budget`：缓存预算计算

mod budget;
mod files;
mod registry;
mod store;

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

pub use budget::{BudgetPolicy, CacheBudget};
pub use registry::{CacheEntry, CacheRegistry, RegistryStats, STALE_AFTER_MS};
pub use store::{CACHE_DIR_NAME, CacheStore, StoredUrl};

pub(crate) use files::now_ms;

use crate::error::CacheError;

pub type SharedStore = Arc<Mutex<CacheStore>>;

/// Owns the process-wide cache store with an explicit init/clear lifecycle.
#[derive(Default)]
pub struct CacheService {
    store: Mutex<Option<SharedStore>>,
}

impl CacheService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the store once; later calls hand back the same store and budget.
    pub fn initialize(&self, root: &Path, budget: CacheBudget) -> Result<SharedStore, CacheError> {
        let mut slot = self.store.lock();
        if let Some(store) = slot.as_ref() {
            tracing::debug!("视频缓存已初始化，忽略重复初始化");
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(Mutex::new(CacheStore::open(root, budget.bytes())?));
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    pub fn get(&self) -> Option<SharedStore> {
        self.store.lock().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.store.lock().is_some()
    }

    /// Releases every cached byte and returns to the uninitialized state.
    pub fn clear(&self) -> (usize, u64) {
        let Some(store) = self.store.lock().take() else {
            return (0, 0);
        };
        let (files, bytes) = store.lock().clear_all();
        tracing::info!(files, bytes, "视频缓存已清空");
        (files, bytes)
    }
}
