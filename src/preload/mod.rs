//! 预加载器
//!
//! 每个 URL 至多一个后台任务：idle → pending → cached | failed。
//! 任务在 worker 运行时上执行，取消是协作式的（见 `task::PendingGuard`）。

mod task;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::cache::{CacheRegistry, RegistryStats};
use crate::network::Connectivity;
use crate::source::CacheDataSource;
use task::{PendingGuard, PreloadJob, TaskMap, TaskSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadStats {
    pub active: usize,
    pub registry: RegistryStats,
}

pub struct Preloader {
    registry: Arc<CacheRegistry>,
    source: Arc<CacheDataSource>,
    connectivity: Arc<dyn Connectivity>,
    semaphore: Arc<Semaphore>,
    tasks: TaskMap,
    next_id: AtomicU64,
    preload_bytes: u64,
    runtime: Handle,
}

impl Preloader {
    pub fn new(
        registry: Arc<CacheRegistry>,
        source: Arc<CacheDataSource>,
        connectivity: Arc<dyn Connectivity>,
        preload_bytes: u64,
        runtime: Handle,
    ) -> Self {
        let concurrency = registry.capacity().max_concurrent_videos.max(1);
        tracing::info!(
            concurrency,
            preload_kb = preload_bytes / 1024,
            strategy = ?registry.capacity().preload_strategy,
            "预加载器已启动"
        );
        Self {
            registry,
            source,
            connectivity,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            preload_bytes,
            runtime,
        }
    }

    /// Preloads the items following `current_index`. Returns how many tasks were started.
    ///
    /// Without connectivity nothing is queued and no state changes.
    pub fn preload_batch(&self, urls: &[String], current_index: usize) -> usize {
        if !self.connectivity.is_available() {
            tracing::warn!("网络不可用，跳过预加载");
            return 0;
        }

        let candidates = self.registry.select_preload_candidates(urls, current_index);
        tracing::debug!(
            candidates = candidates.len(),
            strategy = ?self.registry.capacity().preload_strategy,
            current_index,
            "批量预加载"
        );
        candidates.iter().filter(|url| self.preload(url)).count()
    }

    /// Starts a preload for one URL; a no-op if it is already pending or cached.
    pub fn preload(&self, url: &str) -> bool {
        if self.registry.is_cached(url) || self.registry.is_being_cached(url) {
            tracing::debug!(url, "视频已缓存或正在缓存，跳过");
            return false;
        }
        if !self.registry.mark_caching(url) {
            return false;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = PreloadJob {
            guard: PendingGuard::new(
                Arc::clone(&self.registry),
                Arc::clone(&self.tasks),
                url.to_owned(),
                id,
            ),
            source: Arc::clone(&self.source),
            semaphore: Arc::clone(&self.semaphore),
            url: url.to_owned(),
            preload_bytes: self.preload_bytes,
        };

        // spawn outside the map lock: a runtime that is shutting down drops
        // the job inline and its guard takes the lock
        let handle = self.runtime.spawn(task::run(job)).abort_handle();

        let mut tasks = self.tasks.lock();
        if handle.is_finished() || tasks.get(url).is_some_and(|t| t.id > id) {
            return true;
        }
        if let Some(old) = tasks.insert(url.to_owned(), TaskSlot { id, handle }) {
            tracing::debug!(url, old_id = old.id, "替换旧的预加载任务");
            old.handle.abort();
        }
        true
    }

    pub fn cancel(&self, url: &str) {
        let slot = self.tasks.lock().remove(url);
        if let Some(slot) = slot {
            tracing::debug!(url, id = slot.id, "取消预加载");
            slot.handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        let drained = self.tasks.lock().drain().collect::<Vec<_>>();
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "取消全部预加载");
        }
        for (_, slot) in drained {
            slot.handle.abort();
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|t| !t.handle.is_finished())
            .count()
    }

    pub fn stats(&self) -> PreloadStats {
        PreloadStats {
            active: self.active_count(),
            registry: self.registry.stats(),
        }
    }

    pub fn shutdown(&self) {
        self.cancel_all();
        self.semaphore.close();
    }
}
