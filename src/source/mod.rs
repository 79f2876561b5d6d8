//! 读穿缓存的数据源
//!
//! 先读磁盘缓存中的连续前缀，缺失部分走 HTTP Range 请求，
//! 下载到的字节按分片写回缓存。预加载与当前播放项共用此数据源。

mod download;

use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

use crate::cache::{SharedStore, now_ms};
use crate::error::DownloadError;
use download::{is_retryable_status, sleep_backoff, total_length};

/// 数据源配置
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// HTTP 超时（秒）
    pub http_timeout_secs: u64,
    /// HTTP 连接超时（秒）
    pub http_connect_timeout_secs: u64,
    /// 下载重试次数
    pub retries: u32,
    /// 重试退避初始时间（毫秒）
    pub retry_backoff_ms: u64,
    /// 重试退避最大时间（毫秒）
    pub retry_backoff_max_ms: u64,
    /// 单个缓存分片大小（字节）
    pub span_bytes: usize,
}

/// Outcome of a read-through pass, in measured bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefetched {
    /// Contiguous bytes from offset 0 now held by the store.
    pub bytes: u64,
    pub content_length: Option<u64>,
    /// The whole resource is cached.
    pub complete: bool,
}

impl Prefetched {
    /// The requested prefix (or the whole resource, if shorter) is cached.
    pub fn reached(&self, limit: u64) -> bool {
        self.complete || self.bytes >= limit
    }
}

pub struct CacheDataSource {
    http: Client,
    store: SharedStore,
    config: SourceConfig,
}

impl CacheDataSource {
    pub fn new(store: SharedStore, config: SourceConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(Duration::from_secs(config.http_connect_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!(err = %e, "初始化 HTTP 客户端失败");
                Client::new()
            });
        Self {
            http,
            store,
            config,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// What the store can serve for `url` right now, without touching the network.
    pub fn cached(&self, url: &str) -> Prefetched {
        let store = self.store.lock();
        let bytes = store.contiguous_bytes(url);
        let content_length = store.content_length(url);
        Prefetched {
            bytes,
            content_length,
            complete: content_length.is_some_and(|n| bytes >= n),
        }
    }

    /// Makes sure the first `limit` bytes of `url` are cached, fetching only what is missing.
    pub async fn prefetch(&self, url: &str, limit: u64) -> Result<Prefetched, DownloadError> {
        let cached = self.cached(url);
        if cached.reached(limit) {
            tracing::debug!(url, bytes = cached.bytes, "缓存命中，无需下载");
            return Ok(cached);
        }

        Url::parse(url).map_err(|e| DownloadError::InvalidUrl(format!("{url}: {e}")))?;

        let retries = self.config.retries;
        let mut last_err = None::<DownloadError>;
        for attempt in 0..=retries {
            if attempt > 0 {
                sleep_backoff(
                    attempt - 1,
                    self.config.retry_backoff_ms,
                    self.config.retry_backoff_max_ms,
                )
                .await;
            }
            match self.fetch_once(url, limit).await {
                Ok(done) => return Ok(done),
                Err(e) if e.is_retryable() && attempt < retries => {
                    tracing::debug!(url, attempt, err = %e, "下载失败，准备重试");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| DownloadError::InvalidUrl(url.to_owned())))
    }

    async fn fetch_once(&self, url: &str, limit: u64) -> Result<Prefetched, DownloadError> {
        // resume from whatever earlier attempts left behind
        let offset = self.store.lock().contiguous_bytes(url);
        if offset >= limit {
            return Ok(self.cached(url));
        }

        let mut req = self.http.get(url);
        if offset > 0 {
            req = req.header(RANGE, format!("bytes={offset}-"));
        }
        let resp = req.send().await?;
        let status = resp.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
            // nothing past what we already have
            self.store.lock().set_content_length(url, offset);
            return Ok(self.cached(url));
        }
        if !status.is_success() {
            let err = DownloadError::StatusCode {
                status,
                url: url.to_owned(),
            };
            if !is_retryable_status(status) {
                tracing::warn!(url, %status, "下载视频失败");
            }
            return Err(err);
        }

        // a plain 200 restarts at byte 0, skip what is already cached
        let mut skip = if status == StatusCode::PARTIAL_CONTENT {
            0
        } else {
            offset
        };
        if let Some(total) = total_length(&resp, offset) {
            self.store.lock().set_content_length(url, total);
        }

        let started = now_ms();
        let span_bytes = self.config.span_bytes.max(1);
        let mut pos = offset;
        let mut buf = Vec::with_capacity(span_bytes);
        let mut exhausted = true;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            let mut chunk = &bytes[..];
            if skip > 0 {
                let n = (skip as usize).min(chunk.len());
                chunk = &chunk[n..];
                skip -= n as u64;
            }
            while !chunk.is_empty() && pos + (buf.len() as u64) < limit {
                let room = span_bytes - buf.len();
                let want = limit - pos - buf.len() as u64;
                let n = room.min(chunk.len()).min(want as usize);
                buf.extend_from_slice(&chunk[..n]);
                chunk = &chunk[n..];
                if buf.len() == span_bytes {
                    pos += self.store.lock().write_span(url, pos, &buf)?;
                    buf.clear();
                }
            }
            if pos + buf.len() as u64 >= limit {
                exhausted = false;
                break;
            }
        }
        if !buf.is_empty() {
            pos += self.store.lock().write_span(url, pos, &buf)?;
        }
        if exhausted {
            // the body ended on its own, so this is the real length
            self.store.lock().set_content_length(url, pos);
        }

        let done = self.cached(url);
        tracing::debug!(
            url,
            from = offset,
            to = pos,
            complete = done.complete,
            elapsed_ms = now_ms().saturating_sub(started),
            "数据源写入缓存"
        );
        Ok(done)
    }
}
