use clap::Parser;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use clipfeed::cache::{CacheRegistry, CacheService};
use clipfeed::capacity::analyze_host;
use clipfeed::cli::{Cli, Command};
use clipfeed::context::{FeedContext, HostContext};
use clipfeed::error::AppError;
use clipfeed::feed::{FeedController, load_feed};
use clipfeed::logging;
use clipfeed::network::{Connectivity, SharedConnectivity, Transport};
use clipfeed::player::PlayerEvent;
use clipfeed::settings::{AppSettings, default_data_dir, load_settings};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);

    let _log_guard = logging::init(
        &data_dir,
        logging::LogConfig {
            dir: cli.log_dir.clone(),
            filter: cli.log_filter.clone(),
            stderr: true,
        },
    );
    tracing::info!(data_dir = %data_dir.display(), "clipfeed 启动");

    let mut settings = load_settings(&data_dir);
    settings.apply_env_overrides();

    match cli.command {
        Command::Capacity => {
            let cap = analyze_host(&data_dir);
            println!("{}", serde_json::to_string_pretty(&cap)?);
            Ok(())
        }
        Command::Run {
            feed,
            items,
            offline,
        } => run_feed(&data_dir, settings, &feed, items, offline).await,
        Command::CacheStats => cache_stats(&data_dir, &settings),
        Command::ClearCache => {
            let cap = analyze_host(&data_dir);
            let cache = CacheService::new();
            cache.initialize(&data_dir, settings.cache_budget(&cap))?;
            let (files, bytes) = cache.clear();
            println!("已删除 {files} 个文件，释放 {} KB", bytes / 1024);
            Ok(())
        }
    }
}

fn cache_stats(data_dir: &Path, settings: &AppSettings) -> Result<(), AppError> {
    let cap = analyze_host(data_dir);
    let budget = settings.cache_budget(&cap);
    let cache = CacheService::new();
    let store = cache.initialize(data_dir, budget)?;
    let store = store.lock();

    let registry = CacheRegistry::new(cap);
    registry.reconcile(&store, settings.preload_bytes());
    let stats = registry.stats();
    let entries = store.entries();
    let complete = entries.iter().filter(|e| e.is_complete()).count();

    let out = json!({
        "dir": store.dir().display().to_string(),
        "budget_mb": budget.mb(),
        "used_bytes": store.total_bytes(),
        "urls": entries.len(),
        "complete_urls": complete,
        "registry": {
            "tracked": stats.tracked,
            "fully_cached": stats.fully_cached,
            "total_bytes": stats.total_bytes,
            "efficiency": registry.efficiency(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn run_feed(
    data_dir: &Path,
    settings: AppSettings,
    feed_path: &Path,
    items: usize,
    offline: bool,
) -> Result<(), AppError> {
    let videos = load_feed(feed_path)?;
    if videos.is_empty() {
        return Err(AppError::Other("视频列表为空".to_owned()));
    }

    let transport = if offline {
        Transport::None
    } else {
        Transport::Wifi
    };
    let connectivity = Arc::new(SharedConnectivity::new(transport));
    // Generous upper bound per clip; a stalled item is skipped.
    let item_timeout = Duration::from_millis(settings.player.default_clip_ms * 3 + 10_000);

    let ctx = FeedContext::initialize(HostContext::new(
        data_dir.to_path_buf(),
        connectivity.clone(),
        settings,
    ))?;

    let (tx_evt, mut rx_evt) = mpsc::unbounded_channel::<PlayerEvent>();
    ctx.add_listener(move |evt: &PlayerEvent| {
        let _ = tx_evt.send(evt.clone());
    });

    let mut feed = FeedController::new(videos);
    feed.show_current(&ctx);
    if !connectivity.is_available() {
        println!("网络不可用，已跳过播放与预加载");
        ctx.shutdown();
        return Ok(());
    }

    let mut played = 0usize;
    while played < items {
        let evt = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("收到 Ctrl-C，退出");
                break;
            }
            evt = tokio::time::timeout(item_timeout, rx_evt.recv()) => evt,
        };
        let evt = match evt {
            Ok(Some(evt)) => evt,
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(index = feed.index(), "等待播放事件超时，跳过");
                println!("[{}] 超时，跳过", feed.index());
                played += 1;
                feed.advance(&ctx);
                continue;
            }
        };

        match &evt {
            PlayerEvent::MediaItemChanged { url } => println!("[{}] 开始: {url}", feed.index()),
            PlayerEvent::Error { error, .. } => println!("[{}] 错误: {error}", feed.index()),
            PlayerEvent::StateChanged { state, .. } => {
                println!("[{}] 状态: {state:?}", feed.index())
            }
            _ => {}
        }
        if feed.should_advance(&evt) {
            played += 1;
            if played < items {
                feed.advance(&ctx);
            }
        }
    }

    let stats = ctx.preloader().stats();
    println!(
        "已播放 {played} 个视频；登记 {} 个，完整缓存 {} 个",
        stats.registry.tracked, stats.registry.fully_cached
    );
    ctx.shutdown();
    Ok(())
}
