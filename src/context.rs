//! 应用上下文
//!
//! 显式构造并持有所有服务（容量分析、缓存、登记表、数据源、预加载器、播放池），
//! 通过 `initialize` / `shutdown` 管理生命周期。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::cache::{CacheRegistry, CacheService, SharedStore};
use crate::capacity::{SystemCapacity, analyze_host};
use crate::error::AppError;
use crate::network::Connectivity;
use crate::player::{
    EngineConfig, EngineFactory, HeadlessEngine, ListenerId, PlaybackEngine, PlayerListener,
    PlayerPool, PoolDeps,
};
use crate::preload::Preloader;
use crate::settings::AppSettings;
use crate::source::CacheDataSource;

/// What the host application hands over at startup.
pub struct HostContext {
    pub data_dir: PathBuf,
    pub connectivity: Arc<dyn Connectivity>,
    pub settings: AppSettings,
    /// Skips probing the device when set.
    pub capacity: Option<SystemCapacity>,
    /// Defaults to the headless engine.
    pub engine_factory: Option<EngineFactory>,
}

impl HostContext {
    pub fn new(data_dir: PathBuf, connectivity: Arc<dyn Connectivity>, settings: AppSettings) -> Self {
        Self {
            data_dir,
            connectivity,
            settings,
            capacity: None,
            engine_factory: None,
        }
    }
}

pub struct FeedContext {
    data_dir: PathBuf,
    settings: AppSettings,
    capacity: SystemCapacity,
    store: SharedStore,
    registry: Arc<CacheRegistry>,
    source: Arc<CacheDataSource>,
    preloader: Arc<Preloader>,
    pool: PlayerPool,
}

impl FeedContext {
    /// Must be called from inside a tokio runtime; its handle runs network and preparation work.
    pub fn initialize(host: HostContext) -> Result<Self, AppError> {
        let worker = Handle::try_current()
            .map_err(|e| AppError::Runtime(format!("需要在 tokio 运行时中初始化: {e}")))?;
        let HostContext {
            data_dir,
            connectivity,
            settings,
            capacity,
            engine_factory,
        } = host;
        settings.validate()?;

        let capacity = capacity.unwrap_or_else(|| analyze_host(&data_dir));
        let budget = settings.cache_budget(&capacity);
        tracing::info!(
            low_end = capacity.is_low_end_device,
            strategy = ?capacity.preload_strategy,
            max_concurrent = capacity.max_concurrent_videos,
            budget_mb = budget.mb(),
            policy = ?settings.cache.budget_policy,
            "设备能力分析完成"
        );

        // the context owns the only handle from here on
        let store = CacheService::new().initialize(&data_dir, budget)?;

        let registry = Arc::new(CacheRegistry::new(capacity.clone()));
        let preload_bytes = settings.preload_bytes();
        let restored = registry.reconcile(&store.lock(), preload_bytes);
        tracing::info!(restored, "已从磁盘缓存恢复登记");

        let source = Arc::new(CacheDataSource::new(store.clone(), settings.source_config()));
        let preloader = Arc::new(Preloader::new(
            registry.clone(),
            source.clone(),
            connectivity.clone(),
            preload_bytes,
            worker.clone(),
        ));

        let engine_config = settings.engine_config();
        let factory: EngineFactory = match engine_factory {
            Some(f) => f,
            None => {
                let clip_ms = settings.player.default_clip_ms;
                let bytes_per_ms = settings.assumed_bytes_per_ms();
                Box::new(move |config: EngineConfig| -> Box<dyn PlaybackEngine> {
                    Box::new(HeadlessEngine::new(config, clip_ms, bytes_per_ms))
                })
            }
        };
        let pool = PlayerPool::start(
            PoolDeps {
                source: source.clone(),
                registry: registry.clone(),
                connectivity,
                preloader: preloader.clone(),
                worker,
                engine_config,
                poll_interval: Duration::from_millis(settings.player.poll_interval_ms),
                fill_step_bytes: settings.player.fill_step_kb.max(1) * 1024,
            },
            factory,
        )?;

        tracing::info!(data_dir = %data_dir.display(), "FeedContext 已初始化");
        Ok(Self {
            data_dir,
            settings,
            capacity,
            store,
            registry,
            source,
            preloader,
            pool,
        })
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn capacity(&self) -> &SystemCapacity {
        &self.capacity
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn source(&self) -> &Arc<CacheDataSource> {
        &self.source
    }

    pub fn preloader(&self) -> &Arc<Preloader> {
        &self.preloader
    }

    pub fn pool(&self) -> &PlayerPool {
        &self.pool
    }

    pub fn play(&self, url: &str) {
        self.pool.play(url);
    }

    pub fn pause(&self) {
        self.pool.pause();
    }

    pub fn resume(&self) {
        self.pool.resume();
    }

    pub fn preload_videos(&self, urls: &[String], current_index: usize) -> usize {
        self.pool.preload_videos(urls, current_index)
    }

    pub fn add_listener(&self, listener: impl PlayerListener) -> ListenerId {
        self.pool.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.pool.remove_listener(id);
    }

    pub fn cleanup_stale(&self) -> usize {
        self.registry.cleanup_stale()
    }

    /// Drops every cached byte and every registry entry. The store stays open
    /// for the data source, so preloading keeps working afterwards.
    pub fn clear_cache(&self) -> (usize, u64) {
        self.preloader.cancel_all();
        self.registry.clear();
        let (files, bytes) = self.store.lock().clear_all();
        tracing::info!(files, bytes, "缓存已清空");
        (files, bytes)
    }

    pub fn release(&self) {
        self.pool.release();
    }

    pub fn shutdown(self) {
        self.preloader.shutdown();
        self.pool.release();
        tracing::info!(
            cached_bytes = self.store.lock().total_bytes(),
            stats = ?self.registry.stats(),
            "FeedContext 已关闭"
        );
    }
}
