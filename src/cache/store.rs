use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::files::{INDEX_FILE, clear_dir_files, now_ms};
use crate::error::CacheError;

const INDEX_VERSION: u32 = 1;
pub const CACHE_DIR_NAME: &str = "video_cache";

#[derive(Debug, Serialize, Deserialize, Default)]
struct StoreIndex {
    #[serde(default)]
    version: u32,
    entries: HashMap<String, UrlEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UrlEntry {
    url: String,
    #[serde(default)]
    content_length: Option<u64>,
    /// keyed by byte offset
    #[serde(default)]
    spans: BTreeMap<u64, Span>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Span {
    file_name: String,
    len: u64,
    last_access_ms: u64,
}

/// What the store knows about one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUrl {
    pub url: String,
    pub content_length: Option<u64>,
    pub cached_bytes: u64,
    pub contiguous_bytes: u64,
}

impl StoredUrl {
    pub fn is_complete(&self) -> bool {
        self.content_length
            .is_some_and(|len| self.contiguous_bytes >= len)
    }
}

/// 磁盘字节区间缓存：按 URL 寻址，按分片做 LRU 淘汰
pub struct CacheStore {
    dir: PathBuf,
    index_path: PathBuf,
    index: StoreIndex,
    budget_bytes: u64,
    total_bytes: u64,
}

impl CacheStore {
    pub fn open(root: &Path, budget_bytes: u64) -> Result<Self, CacheError> {
        let dir = root.join(CACHE_DIR_NAME);
        fs::create_dir_all(&dir).map_err(|e| {
            tracing::warn!(dir = %dir.display(), err = %e, "创建视频缓存目录失败");
            CacheError::DirUnavailable
        })?;

        let index_path = dir.join(INDEX_FILE);
        let mut index = fs::read(&index_path)
            .ok()
            .and_then(|b| serde_json::from_slice::<StoreIndex>(&b).ok())
            .unwrap_or_default();

        if index.version != INDEX_VERSION {
            // stale layout: drop every span
            let (files, bytes) = clear_dir_files(&dir, false);
            tracing::info!(files, bytes, "缓存索引版本不匹配，已清空缓存目录");
            index = StoreIndex {
                version: INDEX_VERSION,
                entries: HashMap::new(),
            };
        }

        let mut store = Self {
            dir,
            index_path,
            index,
            budget_bytes,
            total_bytes: 0,
        };
        store.drop_missing();
        store.evict(None);
        store.persist_index()?;

        tracing::info!(
            dir = %store.dir.display(),
            budget_mb = budget_bytes / (1024 * 1024),
            used_bytes = store.total_bytes,
            urls = store.index.entries.len(),
            "视频缓存已打开"
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Stores `data` as the span starting at `offset`, then evicts down to budget.
    pub fn write_span(&mut self, url: &str, offset: u64, data: &[u8]) -> Result<u64, CacheError> {
        let key = cache_key(url);
        let file_name = format!("{key}.{offset}.span");
        let final_path = self.dir.join(&file_name);

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|source| CacheError::WriteSpan { offset, source })?;
        tmp.write_all(data)
            .map_err(|source| CacheError::WriteSpan { offset, source })?;
        tmp.persist(&final_path)
            .map_err(|e| CacheError::WriteSpan {
                offset,
                source: e.error,
            })?;

        let len = data.len() as u64;
        let entry = self
            .index
            .entries
            .entry(key.clone())
            .or_insert_with(|| UrlEntry {
                url: url.to_owned(),
                content_length: None,
                spans: BTreeMap::new(),
            });
        let replaced = entry.spans.insert(
            offset,
            Span {
                file_name,
                len,
                last_access_ms: now_ms(),
            },
        );
        if let Some(old) = replaced {
            self.total_bytes = self.total_bytes.saturating_sub(old.len);
        }
        self.total_bytes = self.total_bytes.saturating_add(len);

        self.evict(Some((&key, offset)));
        self.persist_index()?;
        Ok(len)
    }

    /// Reads the span starting exactly at `offset` and marks it recently used.
    pub fn read_span(&mut self, url: &str, offset: u64) -> Option<Vec<u8>> {
        let key = cache_key(url);
        let file_name = self
            .index
            .entries
            .get(&key)?
            .spans
            .get(&offset)?
            .file_name
            .clone();

        match fs::read(self.dir.join(&file_name)) {
            Ok(bytes) => {
                if let Some(span) = self
                    .index
                    .entries
                    .get_mut(&key)
                    .and_then(|e| e.spans.get_mut(&offset))
                {
                    span.last_access_ms = now_ms();
                }
                let _ = self.persist_index();
                Some(bytes)
            }
            Err(e) => {
                tracing::debug!(url, offset, err = %e, "缓存分片丢失");
                self.drop_span(&key, offset);
                let _ = self.persist_index();
                None
            }
        }
    }

    pub fn set_content_length(&mut self, url: &str, len: u64) {
        let key = cache_key(url);
        let entry = self.index.entries.entry(key).or_insert_with(|| UrlEntry {
            url: url.to_owned(),
            content_length: None,
            spans: BTreeMap::new(),
        });
        if entry.content_length != Some(len) {
            entry.content_length = Some(len);
            let _ = self.persist_index();
        }
    }

    pub fn content_length(&self, url: &str) -> Option<u64> {
        self.index
            .entries
            .get(&cache_key(url))
            .and_then(|e| e.content_length)
    }

    pub fn cached_bytes(&self, url: &str) -> u64 {
        self.index
            .entries
            .get(&cache_key(url))
            .map(|e| e.spans.values().map(|s| s.len).sum())
            .unwrap_or(0)
    }

    /// Bytes available from offset 0 without a gap.
    pub fn contiguous_bytes(&self, url: &str) -> u64 {
        self.index
            .entries
            .get(&cache_key(url))
            .map(contiguous_len)
            .unwrap_or(0)
    }

    pub fn is_complete(&self, url: &str) -> bool {
        self.content_length(url)
            .is_some_and(|len| self.contiguous_bytes(url) >= len)
    }

    pub fn entries(&self) -> Vec<StoredUrl> {
        self.index
            .entries
            .values()
            .map(|e| StoredUrl {
                url: e.url.clone(),
                content_length: e.content_length,
                cached_bytes: e.spans.values().map(|s| s.len).sum(),
                contiguous_bytes: contiguous_len(e),
            })
            .collect()
    }

    /// Drops every span of `url`, returns the bytes released.
    pub fn remove(&mut self, url: &str) -> u64 {
        let Some(entry) = self.index.entries.remove(&cache_key(url)) else {
            return 0;
        };
        let mut released = 0u64;
        for span in entry.spans.values() {
            let _ = fs::remove_file(self.dir.join(&span.file_name));
            released = released.saturating_add(span.len);
        }
        self.total_bytes = self.total_bytes.saturating_sub(released);
        let _ = self.persist_index();
        released
    }

    pub fn clear_all(&mut self) -> (usize, u64) {
        let (files, bytes) = clear_dir_files(&self.dir, true);
        self.index.entries.clear();
        self.total_bytes = 0;
        let _ = self.persist_index();
        (files, bytes)
    }

    fn drop_span(&mut self, key: &str, offset: u64) {
        let Some(entry) = self.index.entries.get_mut(key) else {
            return;
        };
        if let Some(span) = entry.spans.remove(&offset) {
            let _ = fs::remove_file(self.dir.join(&span.file_name));
            self.total_bytes = self.total_bytes.saturating_sub(span.len);
        }
        if entry.spans.is_empty() && entry.content_length.is_none() {
            self.index.entries.remove(key);
        }
    }

    fn drop_missing(&mut self) {
        let dir = &self.dir;
        for entry in self.index.entries.values_mut() {
            entry
                .spans
                .retain(|_, span| dir.join(&span.file_name).exists());
        }
        self.index.entries.retain(|_, e| !e.spans.is_empty());
        self.total_bytes = self
            .index
            .entries
            .values()
            .flat_map(|e| e.spans.values())
            .map(|s| s.len)
            .sum();
    }

    fn evict(&mut self, keep: Option<(&str, u64)>) {
        if self.total_bytes <= self.budget_bytes {
            return;
        }

        let mut spans = self
            .index
            .entries
            .iter()
            .flat_map(|(k, e)| {
                e.spans
                    .iter()
                    .map(move |(off, s)| (k.clone(), *off, s.last_access_ms))
            })
            .collect::<Vec<_>>();
        spans.sort_by_key(|(_, _, ts)| *ts);

        let mut evicted = 0usize;
        for (key, offset, _ts) in spans {
            if self.total_bytes <= self.budget_bytes {
                break;
            }
            if keep.is_some_and(|(k, o)| k == key && o == offset) {
                continue;
            }
            self.drop_span(&key, offset);
            evicted += 1;
        }
        // urls with no bytes left are forgotten, content length included
        self.index.entries.retain(|_, e| !e.spans.is_empty());

        tracing::debug!(
            evicted,
            total_bytes = self.total_bytes,
            budget_bytes = self.budget_bytes,
            "LRU 淘汰缓存分片"
        );
    }

    fn persist_index(&self) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec_pretty(&self.index)?;
        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|source| CacheError::SaveIndex { source })?;
        tmp.write_all(&bytes)
            .map_err(|source| CacheError::SaveIndex { source })?;
        tmp.persist(&self.index_path)
            .map_err(|e| CacheError::SaveIndex { source: e.error })?;
        Ok(())
    }
}

fn contiguous_len(entry: &UrlEntry) -> u64 {
    let mut pos = 0u64;
    for (offset, span) in &entry.spans {
        if *offset > pos {
            break;
        }
        pos = pos.max(offset.saturating_add(span.len));
    }
    pos
}

pub(crate) fn cache_key(url: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
