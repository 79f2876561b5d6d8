use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

use crate::cache::CacheRegistry;
use crate::source::CacheDataSource;

pub(super) struct TaskSlot {
    pub id: u64,
    pub handle: AbortHandle,
}

pub(super) type TaskMap = Arc<Mutex<HashMap<String, TaskSlot>>>;

/// Reverts the pending mark unless the preload reached its commit point.
///
/// Dropped on abort as well, which is what makes cancellation before the
/// commit leave no entry behind.
pub(super) struct PendingGuard {
    registry: Arc<CacheRegistry>,
    tasks: TaskMap,
    url: String,
    id: u64,
    committed: bool,
}

impl PendingGuard {
    pub fn new(registry: Arc<CacheRegistry>, tasks: TaskMap, url: String, id: u64) -> Self {
        Self {
            registry,
            tasks,
            url,
            id,
            committed: false,
        }
    }

    pub fn commit(mut self, bytes: u64, reached_goal: bool) {
        self.committed = true;
        if reached_goal {
            self.registry.mark_cached(&self.url, bytes);
        } else {
            self.registry.mark_partially_cached(&self.url, bytes);
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock();
        // ids grow monotonically; an older slot is a leftover from a task
        // that finished before it was registered
        let replaced = tasks.get(&self.url).is_some_and(|t| t.id > self.id);
        if !replaced {
            tasks.remove(&self.url);
        }
        drop(tasks);

        if !self.committed && !replaced {
            self.registry.abandon(&self.url);
            tracing::debug!(url = %self.url, id = self.id, "预加载未完成，撤销缓存中标记");
        }
    }
}

pub(super) struct PreloadJob {
    pub guard: PendingGuard,
    pub source: Arc<CacheDataSource>,
    pub semaphore: Arc<Semaphore>,
    pub url: String,
    pub preload_bytes: u64,
}

/// Prepares the item through the read-through source without playing it.
pub(super) async fn run(job: PreloadJob) {
    let PreloadJob {
        guard,
        source,
        semaphore,
        url,
        preload_bytes,
    } = job;

    let Ok(_permit) = semaphore.acquire_owned().await else {
        tracing::debug!(url = %url, "预加载器已关闭，放弃任务");
        return;
    };

    tracing::debug!(url = %url, preload_bytes, "开始预加载视频");
    match source.prefetch(&url, preload_bytes).await {
        Ok(done) => {
            let reached = done.reached(preload_bytes);
            // commit point: synchronous from here on
            guard.commit(done.bytes, reached);
            tracing::info!(url = %url, kb = done.bytes / 1024, full = reached, "预加载完成");
        }
        Err(e) => {
            tracing::warn!(url = %url, err = %e, "预加载视频失败");
            drop(guard);
        }
    }
}
