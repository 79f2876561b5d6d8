use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub struct LogGuard(#[allow(dead_code)] Option<WorkerGuard>);

/// 未指定过滤且没有 RUST_LOG 时使用
pub const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub filter: Option<String>,
    /// 同时把 warn 及以上输出到 stderr
    pub stderr: bool,
}

fn build_filter(filter: Option<&str>) -> EnvFilter {
    match filter.map(str::trim) {
        Some(s) if !s.is_empty() => EnvFilter::try_new(s).unwrap_or_else(|e| {
            eprintln!("日志过滤无效({s}): {e}，使用默认值");
            EnvFilter::new(DEFAULT_FILTER)
        }),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

pub fn init(data_dir: &Path, cfg: LogConfig) -> LogGuard {
    let log_dir = cfg.dir.unwrap_or_else(|| data_dir.join("logs"));
    let log_dir = match fs::create_dir_all(&log_dir) {
        Ok(()) => log_dir,
        Err(_) => {
            let fallback = std::env::temp_dir().join("clipfeed-logs");
            let _ = fs::create_dir_all(&fallback);
            fallback
        }
    };

    let file_appender = tracing_appender::rolling::daily(&log_dir, "clipfeed.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(file_writer)
        .with_filter(build_filter(cfg.filter.as_deref()));

    let stderr_layer = cfg.stderr.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(LevelFilter::WARN)
    });

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init();
    tracing::info!(log_dir = %log_dir.display(), "日志已初始化");

    LogGuard(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        let f = build_filter(Some("clipfeed=debug"));
        assert_eq!(f.to_string(), "clipfeed=debug");
    }

    #[test]
    fn invalid_filter_falls_back() {
        let f = build_filter(Some("clipfeed=loud"));
        assert_eq!(f.to_string(), EnvFilter::new(DEFAULT_FILTER).to_string());
    }
}
