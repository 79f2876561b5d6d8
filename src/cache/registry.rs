use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;

use super::files::now_ms;
use super::store::CacheStore;
use crate::capacity::SystemCapacity;

/// Entries untouched for longer than this are dropped by [`CacheRegistry::cleanup_stale`].
pub const STALE_AFTER_MS: u64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub cached_at_ms: u64,
    pub byte_size: u64,
    pub is_fully_cached: bool,
    pub last_accessed_ms: u64,
}

/// One slot per URL, so "pending" and "cached" can never be observed together.
#[derive(Debug, Clone)]
enum Slot {
    Pending { previous: Option<CacheEntry> },
    Cached(CacheEntry),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub tracked: usize,
    pub fully_cached: usize,
    pub pending: usize,
    pub total_bytes: u64,
}

/// 按 URL 记录缓存状态，与底层字节存储的淘汰记录相互独立
pub struct CacheRegistry {
    slots: DashMap<String, Slot>,
    capacity: SystemCapacity,
}

impl CacheRegistry {
    pub fn new(capacity: SystemCapacity) -> Self {
        Self {
            slots: DashMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> &SystemCapacity {
        &self.capacity
    }

    pub fn is_cached(&self, url: &str) -> bool {
        self.slots
            .get(url)
            .is_some_and(|s| matches!(&*s, Slot::Cached(e) if e.is_fully_cached))
    }

    pub fn is_being_cached(&self, url: &str) -> bool {
        self.slots
            .get(url)
            .is_some_and(|s| matches!(&*s, Slot::Pending { .. }))
    }

    pub fn entry(&self, url: &str) -> Option<CacheEntry> {
        match &*self.slots.get(url)? {
            Slot::Cached(e) => Some(e.clone()),
            Slot::Pending { .. } => None,
        }
    }

    /// Moves `url` to pending. Returns false if it is already pending or fully cached.
    pub fn mark_caching(&self, url: &str) -> bool {
        match self.slots.entry(url.to_owned()) {
            Entry::Vacant(v) => {
                v.insert(Slot::Pending { previous: None });
                true
            }
            Entry::Occupied(mut o) => match o.get() {
                Slot::Pending { .. } => false,
                Slot::Cached(e) if e.is_fully_cached => false,
                Slot::Cached(e) => {
                    let previous = Some(e.clone());
                    o.insert(Slot::Pending { previous });
                    true
                }
            },
        }
    }

    /// Records a completed preload; always clears the pending mark.
    pub fn mark_cached(&self, url: &str, byte_size: u64) {
        self.record(url, byte_size, true);
    }

    /// Records bytes that do not yet satisfy the preload goal.
    pub fn mark_partially_cached(&self, url: &str, byte_size: u64) {
        self.record(url, byte_size, false);
    }

    fn record(&self, url: &str, byte_size: u64, is_fully_cached: bool) {
        let now = now_ms();
        self.slots.insert(
            url.to_owned(),
            Slot::Cached(CacheEntry {
                url: url.to_owned(),
                cached_at_ms: now,
                byte_size,
                is_fully_cached,
                last_accessed_ms: now,
            }),
        );
        tracing::debug!(url, kb = byte_size / 1024, full = is_fully_cached, "视频已缓存");
    }

    /// Failed or cancelled preload: pending → whatever was there before.
    pub fn abandon(&self, url: &str) {
        if let Entry::Occupied(mut o) = self.slots.entry(url.to_owned()) {
            let Slot::Pending { previous } = o.get() else {
                return;
            };
            match previous.clone() {
                Some(prev) => {
                    o.insert(Slot::Cached(prev));
                }
                None => {
                    o.remove();
                }
            }
        }
    }

    pub fn update_access(&self, url: &str) {
        if let Some(mut slot) = self.slots.get_mut(url)
            && let Slot::Cached(e) = &mut *slot
        {
            e.last_accessed_ms = now_ms();
        }
    }

    /// Next URLs worth preloading, nearest first.
    ///
    /// Scans `preload_count` items after `current_index` (wrapping), skipping
    /// cached and pending URLs plus repeats of the current one, and stops at
    /// `max_concurrent_videos`.
    pub fn select_preload_candidates(&self, urls: &[String], current_index: usize) -> Vec<String> {
        if urls.is_empty() {
            return Vec::new();
        }
        let preload_count = self.capacity.preload_count();
        let max_concurrent = self.capacity.max_concurrent_videos;

        let mut out = Vec::with_capacity(max_concurrent);
        let mut seen = HashSet::new();
        let base = current_index % urls.len();
        // the current item is fed by the player itself
        seen.insert(urls[base].as_str());
        for i in 1..=preload_count {
            if out.len() >= max_concurrent {
                break;
            }
            let url = &urls[(base + i) % urls.len()];
            if self.is_cached(url) || self.is_being_cached(url) || !seen.insert(url.as_str()) {
                continue;
            }
            out.push(url.clone());
        }
        out
    }

    pub fn cleanup_stale(&self) -> usize {
        self.cleanup_stale_at(now_ms())
    }

    pub fn cleanup_stale_at(&self, now: u64) -> usize {
        let before = self.slots.len();
        self.slots.retain(|url, slot| match slot {
            Slot::Cached(e) if now.saturating_sub(e.last_accessed_ms) > STALE_AFTER_MS => {
                tracing::debug!(url = %url, "移除过期缓存记录");
                false
            }
            _ => true,
        });
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            tracing::info!(removed, "清理过期缓存记录");
        }
        removed
    }

    /// Fully-cached fraction of tracked entries, 0.0 when nothing is tracked.
    pub fn efficiency(&self) -> f64 {
        let stats = self.stats();
        if stats.tracked == 0 {
            return 0.0;
        }
        stats.fully_cached as f64 / stats.tracked as f64
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for slot in self.slots.iter() {
            match &*slot {
                Slot::Pending { .. } => stats.pending += 1,
                Slot::Cached(e) => {
                    stats.tracked += 1;
                    stats.total_bytes = stats.total_bytes.saturating_add(e.byte_size);
                    if e.is_fully_cached {
                        stats.fully_cached += 1;
                    }
                }
            }
        }
        stats
    }

    /// Rebuilds entries from what the store already holds on disk.
    ///
    /// A URL counts as fully cached once its contiguous prefix reaches
    /// `prefix_goal` bytes or its whole content length.
    pub fn reconcile(&self, store: &CacheStore, prefix_goal: u64) -> usize {
        let mut restored = 0usize;
        for stored in store.entries() {
            if stored.cached_bytes == 0 || self.is_being_cached(&stored.url) {
                continue;
            }
            let goal = stored.content_length.map_or(prefix_goal, |n| n.min(prefix_goal));
            let full = stored.is_complete() || stored.contiguous_bytes >= goal;
            self.record(&stored.url, stored.cached_bytes, full);
            restored += 1;
        }
        tracing::info!(restored, "已根据磁盘缓存重建缓存记录");
        restored
    }

    /// Forgets everything, pending marks included.
    pub fn clear(&self) {
        self.slots.clear();
    }
}
