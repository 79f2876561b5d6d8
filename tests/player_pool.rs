mod common;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use clipfeed::capacity::PreloadStrategy;
use clipfeed::context::{FeedContext, HostContext};
use clipfeed::error::PlayerError;
use clipfeed::network::{SharedConnectivity, Transport};
use clipfeed::player::{
    EngineConfig, EngineEvent, HeadlessEngine, MediaItem, PlaybackEngine, PlaybackState,
    PlayerEvent,
};
use clipfeed::settings::AppSettings;
use clipfeed::source::Prefetched;
use common::{capacity, clip};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    SetMediaItem(String),
    PlayWhenReady(bool),
    Release,
}

type CallLog = Arc<Mutex<Vec<Call>>>;

/// Headless engine that records the calls the pool makes.
struct RecordingEngine {
    inner: HeadlessEngine,
    log: CallLog,
}

impl PlaybackEngine for RecordingEngine {
    fn set_media_item(&mut self, item: MediaItem, reset_position: bool) {
        assert!(reset_position);
        self.log.lock().push(Call::SetMediaItem(item.url.clone()));
        self.inner.set_media_item(item, reset_position);
    }
    fn prepare(&mut self) {
        self.inner.prepare();
    }
    fn set_play_when_ready(&mut self, play: bool) {
        self.log.lock().push(Call::PlayWhenReady(play));
        self.inner.set_play_when_ready(play);
    }
    fn play_when_ready(&self) -> bool {
        self.inner.play_when_ready()
    }
    fn stop(&mut self) {
        self.inner.stop();
    }
    fn clear_media_items(&mut self) {
        self.inner.clear_media_items();
    }
    fn on_buffered(&mut self, progress: Prefetched) {
        self.inner.on_buffered(progress);
    }
    fn on_source_error(&mut self, error: PlayerError) {
        self.inner.on_source_error(error);
    }
    fn poll(&mut self, now: Instant) -> Vec<EngineEvent> {
        self.inner.poll(now)
    }
    fn state(&self) -> PlaybackState {
        self.inner.state()
    }
    fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }
    fn position_ms(&self) -> u64 {
        self.inner.position_ms()
    }
    fn buffered_position_ms(&self) -> u64 {
        self.inner.buffered_position_ms()
    }
    fn duration_ms(&self) -> Option<u64> {
        self.inner.duration_ms()
    }
    fn release(&mut self) {
        self.log.lock().push(Call::Release);
        self.inner.release();
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    ctx: FeedContext,
    log: CallLog,
    connectivity: Arc<SharedConnectivity>,
    events: mpsc::UnboundedReceiver<PlayerEvent>,
}

fn fixture(transport: Transport) -> Fixture {
    fixture_with(transport, 1_000, 16, |_| {})
}

fn fixture_with(
    transport: Transport,
    clip_ms: u64,
    bytes_per_ms: u64,
    tweak: impl FnOnce(&mut AppSettings),
) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let connectivity = Arc::new(SharedConnectivity::new(transport));

    let mut settings = AppSettings::default();
    settings.network.download_retries = 0;
    settings.network.span_kb = 4;
    settings.player.poll_interval_ms = 10;
    tweak(&mut settings);

    let mut host = HostContext::new(dir.path().to_path_buf(), connectivity.clone(), settings);
    host.capacity = Some(capacity(PreloadStrategy::Moderate, 2));
    let engine_log = log.clone();
    host.engine_factory = Some(Box::new(move |config: EngineConfig| -> Box<dyn PlaybackEngine> {
        Box::new(RecordingEngine {
            inner: HeadlessEngine::new(config, clip_ms, bytes_per_ms),
            log: engine_log,
        })
    }));

    let ctx = FeedContext::initialize(host).expect("initialize");
    let (tx, events) = mpsc::unbounded_channel();
    ctx.add_listener(move |evt: &PlayerEvent| {
        let _ = tx.send(evt.clone());
    });
    Fixture {
        _dir: dir,
        ctx,
        log,
        connectivity,
        events,
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn next_item_changed(rx: &mut mpsc::UnboundedReceiver<PlayerEvent>) -> String {
    let wait = async {
        while let Some(evt) = rx.recv().await {
            if let PlayerEvent::MediaItemChanged { url } = evt {
                return url;
            }
        }
        panic!("listener channel closed");
    };
    tokio::time::timeout(Duration::from_secs(3), wait)
        .await
        .expect("media item change")
}

fn media_items(log: &CallLog) -> Vec<String> {
    log.lock()
        .iter()
        .filter_map(|c| match c {
            Call::SetMediaItem(u) => Some(u.clone()),
            _ => None,
        })
        .collect()
}

async fn serve(server: &mut mockito::Server, path: &str) -> String {
    server
        .mock("GET", path)
        .with_status(200)
        .with_body(clip(2048))
        .create_async()
        .await;
    format!("{}{path}", server.url())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn playing_current_url_again_resumes_without_reload() {
    let mut server = mockito::Server::new_async().await;
    let url = serve(&mut server, "/a.mp4").await;
    let mut f = fixture(Transport::Wifi);

    f.ctx.play(&url);
    // second request lands while the first swap is still in flight
    f.ctx.play(&url);
    assert_eq!(next_item_changed(&mut f.events).await, url);
    assert_eq!(f.ctx.pool().current_url(), Some(url.clone()));

    f.ctx.pause();
    wait_for(|| f.log.lock().last() == Some(&Call::PlayWhenReady(false))).await;
    f.ctx.play(&url);
    wait_for(|| f.log.lock().last() == Some(&Call::PlayWhenReady(true))).await;

    assert_eq!(media_items(&f.log), vec![url]);
    f.ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_url_replaces_current_item() {
    let mut server = mockito::Server::new_async().await;
    let a = serve(&mut server, "/a.mp4").await;
    let b = serve(&mut server, "/b.mp4").await;
    let mut f = fixture(Transport::Wifi);

    f.ctx.play(&a);
    assert_eq!(next_item_changed(&mut f.events).await, a);
    f.ctx.play(&b);
    assert_eq!(next_item_changed(&mut f.events).await, b);

    assert_eq!(f.ctx.pool().current_url(), Some(b.clone()));
    assert_eq!(media_items(&f.log), vec![a, b]);
    f.ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn swiping_back_to_current_drops_the_in_flight_swap() {
    let mut server = mockito::Server::new_async().await;
    let a = serve(&mut server, "/a.mp4").await;
    let b = serve(&mut server, "/b.mp4").await;
    let mut f = fixture(Transport::Wifi);

    f.ctx.play(&a);
    assert_eq!(next_item_changed(&mut f.events).await, a);

    f.ctx.play(&b);
    f.ctx.play(&a);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(f.ctx.pool().current_url(), Some(a.clone()));
    assert_eq!(f.ctx.pool().transport().pending_url, None);
    assert_eq!(media_items(&f.log), vec![a]);
    f.ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resume_before_swap_lands_still_plays() {
    let mut server = mockito::Server::new_async().await;
    let a = serve(&mut server, "/a.mp4").await;
    let mut f = fixture(Transport::Wifi);

    f.ctx.play(&a);
    f.ctx.pause();
    f.ctx.resume();
    assert_eq!(next_item_changed(&mut f.events).await, a);
    wait_for(|| f.ctx.pool().is_playing()).await;

    let last = f
        .log
        .lock()
        .iter()
        .rev()
        .find(|c| matches!(c, Call::PlayWhenReady(_)))
        .cloned();
    assert_eq!(last, Some(Call::PlayWhenReady(true)));
    f.ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_through_stops_at_max_buffer() {
    let mut server = mockito::Server::new_async().await;
    // 200 s clip at one byte per millisecond
    server
        .mock("GET", "/long.mp4")
        .with_status(200)
        .with_body(clip(200_000))
        .create_async()
        .await;
    let url = format!("{}/long.mp4", server.url());
    let f = fixture_with(Transport::Wifi, 200_000, 1, |s| {
        s.player.fill_step_kb = 4;
    });

    f.ctx.play(&url);
    wait_for(|| f.ctx.source().cached(&url).bytes >= 50_000).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let cached = f.ctx.source().cached(&url);
    let position = f.ctx.pool().position_ms();
    assert!(!cached.complete);
    // one fill step past the 50 s ceiling at most
    assert!(cached.bytes <= 50_000 + position + 4096, "bytes={}", cached.bytes);
    f.ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_network_makes_play_a_no_op() {
    let f = fixture(Transport::None);
    let url = "https://cdn.example.com/offline.mp4";
    f.ctx.play(url);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(media_items(&f.log).is_empty());
    assert_eq!(f.ctx.pool().current_url(), None);
    assert!(!f.ctx.pool().is_playing());
    assert!(f.ctx.registry().entry(url).is_none());

    f.connectivity.set(Transport::Wifi);
    f.ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_url_reports_error_to_listeners() {
    let mut f = fixture(Transport::Wifi);
    f.ctx.play("not a url");
    let evt = tokio::time::timeout(Duration::from_secs(3), f.events.recv())
        .await
        .expect("event")
        .expect("open");
    assert!(matches!(
        evt,
        PlayerEvent::Error {
            error: PlayerError::InvalidUri { .. },
            ..
        }
    ));
    assert!(media_items(&f.log).is_empty());
    f.ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_through_clip_reaches_ready_and_plays() {
    let mut server = mockito::Server::new_async().await;
    let url = serve(&mut server, "/short.mp4").await;
    let f = fixture(Transport::Wifi);

    f.ctx.play(&url);
    wait_for(|| f.ctx.pool().is_playing()).await;
    let t = f.ctx.pool().transport();
    assert_eq!(t.state, PlaybackState::Ready);
    assert_eq!(t.duration_ms, Some(1_000));
    f.ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preload_videos_skips_cached_and_fills_legacy_queue() {
    let f = fixture(Transport::Wifi);
    let urls: Vec<String> = (0..5)
        .map(|i| format!("http://127.0.0.1:9/{i}.mp4"))
        .collect();
    f.ctx.registry().mark_cached(&urls[1], 4096);

    let started = f.ctx.preload_videos(&urls, 0);
    // Moderate looks three ahead, one of them is already cached
    assert_eq!(started, 2);
    assert_eq!(f.ctx.pool().legacy_queue(), urls[1..4].to_vec());
    f.ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn legacy_queue_wraps_at_feed_end() {
    let f = fixture(Transport::None);
    let urls: Vec<String> = (0..5)
        .map(|i| format!("http://127.0.0.1:9/{i}.mp4"))
        .collect();

    assert_eq!(f.ctx.preload_videos(&urls, 3), 0);
    assert_eq!(
        f.ctx.pool().legacy_queue(),
        vec![urls[4].clone(), urls[0].clone(), urls[1].clone()]
    );
    f.ctx.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn release_stops_the_engine_for_good() {
    let mut server = mockito::Server::new_async().await;
    let url = serve(&mut server, "/r.mp4").await;
    let mut f = fixture(Transport::Wifi);

    f.ctx.play(&url);
    next_item_changed(&mut f.events).await;
    f.ctx.release();
    assert_eq!(f.log.lock().last(), Some(&Call::Release));

    f.ctx.play(&url);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(media_items(&f.log).len(), 1);
}
