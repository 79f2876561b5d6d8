use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{BudgetPolicy, CacheBudget};
use crate::capacity::SystemCapacity;
use crate::error::SettingsError;
use crate::player::{EngineConfig, LoadControl, SurfaceKind};
use crate::source::SourceConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub player: PlayerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub budget_policy: BudgetPolicy,
    /// 手动指定缓存上限（MB），None 表示按设备能力计算
    #[serde(default)]
    pub max_mb: Option<u64>,
    /// 每个预加载任务缓存的前缀大小（KB）
    #[serde(default = "default_preload_kb")]
    pub preload_kb: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            budget_policy: BudgetPolicy::default(),
            max_mb: None,
            preload_kb: default_preload_kb(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_http_connect_timeout_secs")]
    pub http_connect_timeout_secs: u64,
    #[serde(default = "default_download_retries")]
    pub download_retries: u32,
    #[serde(default = "default_download_retry_backoff_ms")]
    pub download_retry_backoff_ms: u64,
    #[serde(default = "default_download_retry_backoff_max_ms")]
    pub download_retry_backoff_max_ms: u64,
    #[serde(default = "default_span_kb")]
    pub span_kb: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
            http_connect_timeout_secs: default_http_connect_timeout_secs(),
            download_retries: default_download_retries(),
            download_retry_backoff_ms: default_download_retry_backoff_ms(),
            download_retry_backoff_max_ms: default_download_retry_backoff_max_ms(),
            span_kb: default_span_kb(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    #[serde(default)]
    pub load_control: LoadControl,
    #[serde(default)]
    pub surface: SurfaceKind,
    /// 时长未知时按此值模拟（毫秒）
    #[serde(default = "default_clip_ms")]
    pub default_clip_ms: u64,
    /// 无 Content-Length 时估算缓冲时长所用的码率
    #[serde(default = "default_assumed_kbps")]
    pub assumed_kbps: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 播放时边下边播的步长（KB）
    #[serde(default = "default_fill_step_kb")]
    pub fill_step_kb: u64,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            load_control: LoadControl::default(),
            surface: SurfaceKind::default(),
            default_clip_ms: default_clip_ms(),
            assumed_kbps: default_assumed_kbps(),
            poll_interval_ms: default_poll_interval_ms(),
            fill_step_kb: default_fill_step_kb(),
        }
    }
}

// 默认值函数（用于 serde default）
fn default_preload_kb() -> u64 { 2048 }
fn default_http_timeout_secs() -> u64 { 30 }
fn default_http_connect_timeout_secs() -> u64 { 10 }
fn default_download_retries() -> u32 { 2 }
fn default_download_retry_backoff_ms() -> u64 { 250 }
fn default_download_retry_backoff_max_ms() -> u64 { 2000 }
fn default_span_kb() -> usize { 512 }
fn default_clip_ms() -> u64 { 15_000 }
fn default_assumed_kbps() -> u64 { 2_000 }
fn default_poll_interval_ms() -> u64 { 100 }
fn default_fill_step_kb() -> u64 { 1024 }

impl AppSettings {
    pub fn preload_bytes(&self) -> u64 {
        self.cache.preload_kb.max(1) * 1024
    }

    pub fn cache_budget(&self, capacity: &SystemCapacity) -> CacheBudget {
        match self.cache.max_mb {
            Some(mb) => CacheBudget::from_mb(mb),
            None => CacheBudget::compute(self.cache.budget_policy, capacity),
        }
    }

    pub fn source_config(&self) -> SourceConfig {
        let n = &self.network;
        SourceConfig {
            http_timeout_secs: n.http_timeout_secs,
            http_connect_timeout_secs: n.http_connect_timeout_secs,
            retries: n.download_retries,
            retry_backoff_ms: n.download_retry_backoff_ms,
            retry_backoff_max_ms: n.download_retry_backoff_max_ms.max(n.download_retry_backoff_ms),
            span_bytes: n.span_kb.max(1) * 1024,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            load_control: self.player.load_control,
            surface: self.player.surface,
            ..EngineConfig::default()
        }
    }

    /// Bytes of video per millisecond at the assumed bitrate.
    pub fn assumed_bytes_per_ms(&self) -> u64 {
        (self.player.assumed_kbps * 1000 / 8 / 1000).max(1)
    }

    /// `CLIPFEED_*` 环境变量覆盖文件中的值
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("CLIPFEED_CACHE_MAX_MB") {
            self.cache.max_mb = Some(v);
        }
        if let Some(v) = env_parse("CLIPFEED_PRELOAD_KB") {
            self.cache.preload_kb = v;
        }
        if let Some(v) = env_parse("CLIPFEED_HTTP_TIMEOUT_SECS") {
            self.network.http_timeout_secs = v;
        }
        if let Some(v) = env_parse("CLIPFEED_HTTP_CONNECT_TIMEOUT_SECS") {
            self.network.http_connect_timeout_secs = v;
        }
        if let Some(v) = env_parse("CLIPFEED_DOWNLOAD_RETRIES") {
            self.network.download_retries = v;
        }
        if let Some(v) = env_parse::<usize>("CLIPFEED_SPAN_KB").filter(|v| *v > 0) {
            self.network.span_kb = v;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let lc = &self.player.load_control;
        if lc.min_buffer_ms > lc.max_buffer_ms {
            return Err(SettingsError::InvalidValue(format!(
                "min_buffer_ms({}) > max_buffer_ms({})",
                lc.min_buffer_ms, lc.max_buffer_ms
            )));
        }
        if lc.buffer_for_playback_ms > lc.min_buffer_ms
            || lc.buffer_for_playback_after_rebuffer_ms > lc.min_buffer_ms
        {
            return Err(SettingsError::InvalidValue(
                "buffer_for_playback 不能大于 min_buffer_ms".to_owned(),
            ));
        }
        if self.player.poll_interval_ms == 0 {
            return Err(SettingsError::InvalidValue("poll_interval_ms 必须大于 0".to_owned()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

pub fn load_settings(data_dir: &Path) -> AppSettings {
    let p = settings_path(data_dir);
    let Ok(bytes) = fs::read(&p) else {
        return AppSettings::default();
    };
    match serde_json::from_slice(&bytes) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %p.display(), err = %e, "设置文件损坏，使用默认值");
            AppSettings::default()
        }
    }
}

pub fn save_settings(data_dir: &Path, s: &AppSettings) -> Result<(), SettingsError> {
    let write = || -> std::io::Result<()> {
        fs::create_dir_all(data_dir)?;
        let p = settings_path(data_dir);
        let tmp = p.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(s).unwrap_or_else(|_| b"{}".to_vec());
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &p) {
            let _ = fs::remove_file(&p);
            fs::rename(&tmp, &p).map_err(|_| e)?;
        }
        Ok(())
    };
    write().map_err(|source| SettingsError::Save { source })
}

fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::{DeviceCounters, analyze};

    #[test]
    fn partial_file_keeps_defaults() {
        let s: AppSettings =
            serde_json::from_str(r#"{"cache":{"budget_policy":"legacy"}}"#).expect("parse");
        assert_eq!(s.cache.budget_policy, BudgetPolicy::Legacy);
        assert_eq!(s.cache.preload_kb, 2048);
        assert_eq!(s.network, NetworkSettings::default());
        assert_eq!(s.player.load_control.buffer_for_playback_ms, 2_500);
    }

    #[test]
    fn explicit_max_mb_overrides_policy() {
        let cap = analyze(&DeviceCounters::from_mb_gb(8192, 4096, 256, 128));
        let mut s = AppSettings::default();
        s.cache.max_mb = Some(100);
        assert_eq!(s.cache_budget(&cap).mb(), 100);
        s.cache.max_mb = Some(10);
        assert_eq!(s.cache_budget(&cap).mb(), 50);
    }

    #[test]
    fn default_settings_are_valid() {
        assert!(AppSettings::default().validate().is_ok());
    }

    #[test]
    fn inverted_buffer_bounds_rejected() {
        let mut s = AppSettings::default();
        s.player.load_control.min_buffer_ms = 60_000;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn source_config_mirrors_network_section() {
        let mut s = AppSettings::default();
        s.network.span_kb = 64;
        s.network.download_retries = 0;
        let cfg = s.source_config();
        assert_eq!(cfg.span_bytes, 64 * 1024);
        assert_eq!(cfg.retries, 0);
    }
}
