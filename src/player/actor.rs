use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use super::engine::{
    EngineConfig, EngineEvent, EngineFactory, LoadControl, MediaItem, PlaybackEngine,
};
use super::messages::{ListenerId, PlayerCommand, PlayerEvent, PlayerListener, TransportState};
use crate::cache::CacheRegistry;
use crate::error::PlayerError;
use crate::network::Connectivity;
use crate::source::{CacheDataSource, Prefetched};

pub(super) struct ActorDeps {
    pub source: Arc<CacheDataSource>,
    pub registry: Arc<CacheRegistry>,
    pub connectivity: Arc<dyn Connectivity>,
    pub worker: Handle,
    pub poll_interval: Duration,
    pub fill_step_bytes: u64,
}

/// Results marshalled back from the worker runtime.
enum Internal {
    Prepared {
        token: u64,
        url: String,
        result: Result<MediaItem, PlayerError>,
    },
    Buffered {
        token: u64,
        result: Result<Prefetched, PlayerError>,
    },
}

struct PendingSwap {
    token: u64,
    url: String,
    play_when_ready: bool,
}

struct Current {
    token: u64,
    url: String,
}

/// Pacing state shared with the read-through task of the current item.
#[derive(Debug, Clone, Copy)]
struct FillGate {
    /// Bytes the engine has already been told about.
    acked: u64,
    open: bool,
}

struct Fill {
    abort: AbortHandle,
    gate: watch::Sender<FillGate>,
}

struct PlayerActor {
    engine: Box<dyn PlaybackEngine>,
    load_control: LoadControl,
    deps: ActorDeps,
    rx_cmd: mpsc::UnboundedReceiver<PlayerCommand>,
    tx_internal: mpsc::UnboundedSender<Internal>,
    rx_internal: mpsc::UnboundedReceiver<Internal>,
    transport: watch::Sender<TransportState>,
    listeners: Vec<(ListenerId, Box<dyn PlayerListener>)>,
    current: Option<Current>,
    pending: Option<PendingSwap>,
    fill: Option<Fill>,
    next_token: u64,
}

impl PlayerActor {
    fn new(
        engine: Box<dyn PlaybackEngine>,
        load_control: LoadControl,
        deps: ActorDeps,
        rx_cmd: mpsc::UnboundedReceiver<PlayerCommand>,
        transport: watch::Sender<TransportState>,
    ) -> Self {
        let (tx_internal, rx_internal) = mpsc::unbounded_channel();
        Self {
            engine,
            load_control,
            deps,
            rx_cmd,
            tx_internal,
            rx_internal,
            transport,
            listeners: Vec::new(),
            current: None,
            pending: None,
            fill: None,
            next_token: 1,
        }
    }

    async fn run(mut self) {
        let mut tick = tokio::time::interval(self.deps.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            select! {
                biased;
                maybe_cmd = self.rx_cmd.recv() => {
                    let Some(cmd) = maybe_cmd else {
                        self.shutdown();
                        break;
                    };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                Some(msg) = self.rx_internal.recv() => {
                    self.handle_internal(msg);
                }
                _ = tick.tick() => {}
            }
            self.pump();
        }
        tracing::info!("播放线程退出");
    }

    /// Returns false once the pool is released.
    fn handle_command(&mut self, cmd: PlayerCommand) -> bool {
        match cmd {
            PlayerCommand::Play { url } => self.play(url),
            PlayerCommand::Pause => {
                if let Some(p) = self.pending.as_mut() {
                    p.play_when_ready = false;
                }
                self.engine.set_play_when_ready(false);
            }
            PlayerCommand::Resume => self.resume(),
            PlayerCommand::Stop => {
                tracing::debug!("停止播放");
                self.detach();
            }
            PlayerCommand::AddListener { id, listener } => {
                self.listeners.push((id, listener));
            }
            PlayerCommand::RemoveListener { id } => {
                self.listeners.retain(|(lid, _)| *lid != id);
            }
            PlayerCommand::Release => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn play(&mut self, url: String) {
        if self.current.as_ref().is_some_and(|c| c.url == url) {
            tracing::debug!(url = %url, "已是当前视频，继续播放");
            // a swap still in flight for another url is superseded
            self.pending = None;
            self.resume();
            return;
        }
        if let Some(p) = self.pending.as_mut()
            && p.url == url
        {
            tracing::debug!(url = %url, "视频切换中，继续播放");
            p.play_when_ready = true;
            return;
        }
        if !self.deps.connectivity.is_available() {
            tracing::warn!(url = %url, "网络不可用，忽略播放请求");
            return;
        }

        self.deps.registry.update_access(&url);
        let token = self.next_token;
        self.next_token += 1;
        self.pending = Some(PendingSwap {
            token,
            url: url.clone(),
            play_when_ready: true,
        });
        tracing::info!(url = %url, token, "准备切换视频");

        let source = self.deps.source.clone();
        let tx = self.tx_internal.clone();
        self.deps.worker.spawn(async move {
            let result = build_media_item(&source, &url);
            let _ = tx.send(Internal::Prepared { token, url, result });
        });
    }

    fn resume(&mut self) {
        if let Some(p) = self.pending.as_mut() {
            p.play_when_ready = true;
        }
        if self.current.is_some() {
            self.engine.set_play_when_ready(true);
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Prepared { token, url, result } => {
                let Some(p) = self.pending.take_if(|p| p.token == token) else {
                    tracing::debug!(token, url = %url, "过期的切换结果，丢弃");
                    return;
                };
                match result {
                    Ok(item) => self.swap_in(token, item, p.play_when_ready),
                    Err(error) => {
                        tracing::warn!(url = %url, err = %error, "构建媒体项失败");
                        self.dispatch(&PlayerEvent::Error {
                            url: Some(url),
                            error,
                        });
                    }
                }
            }
            Internal::Buffered { token, result } => {
                let Some(current) = self.current.as_ref().filter(|c| c.token == token) else {
                    return;
                };
                let url = current.url.clone();
                match result {
                    Ok(progress) => {
                        self.engine.on_buffered(progress);
                        self.pace_fill(Some(progress.bytes));
                        self.dispatch(&PlayerEvent::Buffered {
                            url,
                            bytes: progress.bytes,
                            complete: progress.complete,
                        });
                    }
                    Err(error) => {
                        tracing::warn!(url = %url, err = %error, "读取媒体源失败");
                        self.engine.on_source_error(error);
                    }
                }
            }
        }
    }

    fn swap_in(&mut self, token: u64, item: MediaItem, play_when_ready: bool) {
        self.cancel_fill();
        let url = item.url.clone();
        let cached = item.cached;

        self.engine.stop();
        self.engine.clear_media_items();
        self.engine.set_media_item(item, true);
        self.engine.prepare();
        self.engine.set_play_when_ready(play_when_ready);
        self.current = Some(Current {
            token,
            url: url.clone(),
        });
        tracing::info!(
            url = %url,
            cached_kb = cached.bytes / 1024,
            complete = cached.complete,
            "视频已切换"
        );
        self.dispatch(&PlayerEvent::MediaItemChanged { url: url.clone() });

        if !cached.complete {
            self.start_fill(token, url, cached);
        }
    }

    /// Read-through of the current item, reporting progress back to the engine.
    ///
    /// Each step waits until the engine has seen the previous one and the
    /// buffer ahead of the playhead is below the load-control ceiling.
    fn start_fill(&mut self, token: u64, url: String, start: Prefetched) {
        let source = self.deps.source.clone();
        let tx = self.tx_internal.clone();
        let step = self.deps.fill_step_bytes.max(1);
        let (gate_tx, mut gate) = watch::channel(FillGate {
            acked: start.bytes,
            open: true,
        });
        let handle = self.deps.worker.spawn(async move {
            let mut have = start.bytes;
            loop {
                if gate.wait_for(|g| g.open && g.acked >= have).await.is_err() {
                    break;
                }
                let target = have.saturating_add(step);
                match source.prefetch(&url, target).await {
                    Ok(progress) => {
                        let stalled = progress.bytes <= have;
                        have = progress.bytes;
                        let _ = tx.send(Internal::Buffered {
                            token,
                            result: Ok(progress),
                        });
                        if progress.complete {
                            break;
                        }
                        if stalled {
                            tracing::warn!(url = %url, bytes = have, "媒体源没有更多数据");
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Internal::Buffered {
                            token,
                            result: Err(PlayerError::source_failed(&url, &e)),
                        });
                        break;
                    }
                }
            }
        });
        self.fill = Some(Fill {
            abort: handle.abort_handle(),
            gate: gate_tx,
        });
        self.pace_fill(None);
    }

    /// Stops the fill above `max_buffer_ms` ahead and restarts it below `min_buffer_ms`.
    fn pace_fill(&mut self, acked: Option<u64>) {
        let Some(fill) = self.fill.as_ref() else {
            return;
        };
        let lc = self.load_control;
        let ahead = self
            .engine
            .buffered_position_ms()
            .saturating_sub(self.engine.position_ms());
        fill.gate.send_if_modified(|g| {
            let mut changed = false;
            if let Some(bytes) = acked
                && bytes > g.acked
            {
                g.acked = bytes;
                changed = true;
            }
            let open = if g.open {
                ahead < lc.max_buffer_ms
            } else {
                ahead < lc.min_buffer_ms
            };
            if open != g.open {
                tracing::debug!(ahead_ms = ahead, open, "调整读取节奏");
                g.open = open;
                changed = true;
            }
            changed
        });
    }

    fn cancel_fill(&mut self) {
        if let Some(fill) = self.fill.take() {
            fill.abort.abort();
        }
    }

    fn detach(&mut self) {
        self.cancel_fill();
        self.pending = None;
        self.current = None;
        self.engine.stop();
        self.engine.clear_media_items();
    }

    fn shutdown(&mut self) {
        self.detach();
        self.engine.release();
        self.pump();
        self.listeners.clear();
        tracing::info!("播放器已释放");
    }

    /// Drains engine events to listeners and republishes transport state.
    fn pump(&mut self) {
        let url = self.current.as_ref().map(|c| c.url.clone());
        for evt in self.engine.poll(Instant::now()) {
            let evt = match evt {
                EngineEvent::StateChanged(state) => PlayerEvent::StateChanged {
                    url: url.clone(),
                    state,
                },
                EngineEvent::IsPlayingChanged(playing) => PlayerEvent::IsPlayingChanged {
                    url: url.clone(),
                    playing,
                },
                EngineEvent::Error(error) => {
                    tracing::warn!(url = ?url, err = %error, "播放错误");
                    PlayerEvent::Error {
                        url: url.clone(),
                        error,
                    }
                }
            };
            self.dispatch(&evt);
        }
        self.pace_fill(None);

        let next = TransportState {
            current_url: url,
            pending_url: self.pending.as_ref().map(|p| p.url.clone()),
            state: self.engine.state(),
            is_playing: self.engine.is_playing(),
            position_ms: self.engine.position_ms(),
            duration_ms: self.engine.duration_ms(),
        };
        self.transport.send_if_modified(|s| {
            if *s == next {
                false
            } else {
                *s = next;
                true
            }
        });
    }

    fn dispatch(&mut self, evt: &PlayerEvent) {
        for (_, l) in self.listeners.iter_mut() {
            l.on_event(evt);
        }
    }
}

fn build_media_item(source: &CacheDataSource, url: &str) -> Result<MediaItem, PlayerError> {
    reqwest::Url::parse(url).map_err(|e| PlayerError::InvalidUri {
        url: url.to_owned(),
        reason: e.to_string(),
    })?;
    Ok(MediaItem {
        url: url.to_owned(),
        cached: source.cached(url),
        duration_ms: None,
    })
}

pub(super) fn spawn(
    rx_cmd: mpsc::UnboundedReceiver<PlayerCommand>,
    transport: watch::Sender<TransportState>,
    deps: ActorDeps,
    config: EngineConfig,
    factory: EngineFactory,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("clipfeed-ui".to_owned())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(err = %e, "初始化播放线程运行时失败");
                    return;
                }
            };
            let local = tokio::task::LocalSet::new();
            local.block_on(&rt, async move {
                let engine = factory(config);
                let load_control = config.load_control;
                tracing::info!(
                    surface = ?config.surface,
                    repeat = config.repeat,
                    "播放器已创建"
                );
                PlayerActor::new(engine, load_control, deps, rx_cmd, transport)
                    .run()
                    .await;
            });
        })
}
