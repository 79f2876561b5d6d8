//! 播放池
//!
//! 整个进程只有一个播放引擎，固定在专用的 UI 线程上（current-thread 运行时 + LocalSet）。
//! 所有引擎操作与监听器回调都在该线程执行；媒体项在 worker 运行时构建后再交回 UI 线程切换。

mod actor;
mod engine;
mod headless;
mod messages;

pub use engine::{
    EngineConfig, EngineEvent, EngineFactory, LoadControl, MediaItem, PlaybackEngine,
    PlaybackState, SurfaceKind,
};
pub use headless::HeadlessEngine;
pub use messages::{ListenerId, PlayerEvent, PlayerListener, TransportState};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::cache::CacheRegistry;
use crate::error::PlayerError;
use crate::network::Connectivity;
use crate::preload::Preloader;
use crate::source::CacheDataSource;
use messages::PlayerCommand;

/// Upper bound of the legacy preload queue.
pub const LEGACY_QUEUE_LEN: usize = 3;

pub struct PoolDeps {
    pub source: Arc<CacheDataSource>,
    pub registry: Arc<CacheRegistry>,
    pub connectivity: Arc<dyn Connectivity>,
    pub preloader: Arc<Preloader>,
    pub worker: Handle,
    pub engine_config: EngineConfig,
    pub poll_interval: Duration,
    pub fill_step_bytes: u64,
}

pub struct PlayerPool {
    tx: mpsc::UnboundedSender<PlayerCommand>,
    transport: watch::Receiver<TransportState>,
    preloader: Arc<Preloader>,
    legacy_queue: Mutex<VecDeque<String>>,
    next_listener: AtomicU64,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl PlayerPool {
    pub fn start(deps: PoolDeps, factory: EngineFactory) -> Result<Self, PlayerError> {
        let (tx, rx_cmd) = mpsc::unbounded_channel();
        let (tx_transport, transport) = watch::channel(TransportState::default());
        let preloader = deps.preloader.clone();
        let actor_deps = actor::ActorDeps {
            source: deps.source,
            registry: deps.registry,
            connectivity: deps.connectivity,
            worker: deps.worker,
            poll_interval: deps.poll_interval,
            fill_step_bytes: deps.fill_step_bytes,
        };
        let thread = actor::spawn(rx_cmd, tx_transport, actor_deps, deps.engine_config, factory)
            .map_err(|e| PlayerError::Engine(format!("无法启动播放线程: {e}")))?;

        Ok(Self {
            tx,
            transport,
            preloader,
            legacy_queue: Mutex::new(VecDeque::with_capacity(LEGACY_QUEUE_LEN)),
            next_listener: AtomicU64::new(1),
            thread: Mutex::new(Some(thread)),
        })
    }

    fn send(&self, cmd: PlayerCommand) {
        if self.tx.send(cmd).is_err() {
            tracing::warn!("播放池已释放，忽略命令");
        }
    }

    /// Plays `url`, resuming instead of reloading when it is already attached.
    pub fn play(&self, url: &str) {
        self.send(PlayerCommand::Play {
            url: url.to_owned(),
        });
    }

    pub fn pause(&self) {
        self.send(PlayerCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(PlayerCommand::Resume);
    }

    pub fn stop(&self) {
        self.send(PlayerCommand::Stop);
    }

    /// Releases the engine and joins the UI thread. Later commands are ignored.
    pub fn release(&self) {
        self.send(PlayerCommand::Release);
        self.legacy_queue.lock().clear();
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            tracing::error!("播放线程异常退出");
        }
    }

    pub fn transport(&self) -> TransportState {
        self.transport.borrow().clone()
    }

    /// Receiver that observes every published transport change.
    pub fn watch(&self) -> watch::Receiver<TransportState> {
        self.transport.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.borrow().is_playing
    }

    pub fn position_ms(&self) -> u64 {
        self.transport.borrow().position_ms
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.transport.borrow().duration_ms
    }

    pub fn current_url(&self) -> Option<String> {
        self.transport.borrow().current_url.clone()
    }

    pub fn add_listener(&self, listener: impl PlayerListener) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.send(PlayerCommand::AddListener {
            id,
            listener: Box::new(listener),
        });
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.send(PlayerCommand::RemoveListener { id });
    }

    /// Delegates to the preloader and refreshes the legacy queue. Returns started tasks.
    pub fn preload_videos(&self, urls: &[String], current_index: usize) -> usize {
        {
            let mut queue = self.legacy_queue.lock();
            queue.clear();
            if !urls.is_empty() {
                let base = current_index % urls.len();
                let current = &urls[base];
                // the feed wraps around
                queue.extend(
                    (1..urls.len())
                        .map(|i| &urls[(base + i) % urls.len()])
                        .filter(|u| *u != current)
                        .take(LEGACY_QUEUE_LEN)
                        .cloned(),
                );
            }
        }
        self.preloader.preload_batch(urls, current_index)
    }

    pub fn legacy_queue(&self) -> Vec<String> {
        self.legacy_queue.lock().iter().cloned().collect()
    }
}

impl Drop for PlayerPool {
    fn drop(&mut self) {
        let _ = self.tx.send(PlayerCommand::Release);
    }
}
