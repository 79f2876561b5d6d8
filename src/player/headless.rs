use std::time::Instant;

use super::engine::{
    EngineConfig, EngineEvent, MediaItem, PlaybackEngine, PlaybackState,
};
use crate::error::PlayerError;
use crate::source::Prefetched;

/// Timeline-only engine used when nothing renders the video.
///
/// Buffered bytes are converted to buffered time from the clip's content
/// length (or an assumed bitrate), and the load-control thresholds decide
/// when playback may start or must rebuffer.
pub struct HeadlessEngine {
    config: EngineConfig,
    default_clip_ms: u64,
    bytes_per_ms: u64,
    item: Option<MediaItem>,
    buffered: Prefetched,
    state: PlaybackState,
    play_when_ready: bool,
    playing: bool,
    rebuffering: bool,
    position_ms: u64,
    last_tick: Option<Instant>,
    events: Vec<EngineEvent>,
    released: bool,
}

impl HeadlessEngine {
    pub fn new(config: EngineConfig, default_clip_ms: u64, bytes_per_ms: u64) -> Self {
        Self {
            config,
            default_clip_ms,
            bytes_per_ms: bytes_per_ms.max(1),
            item: None,
            buffered: empty_progress(),
            state: PlaybackState::Idle,
            play_when_ready: config.play_when_ready,
            playing: false,
            rebuffering: false,
            position_ms: 0,
            last_tick: None,
            events: Vec::new(),
            released: false,
        }
    }

    fn duration(&self) -> u64 {
        self.item
            .as_ref()
            .and_then(|i| i.duration_ms)
            .unwrap_or(self.default_clip_ms)
    }

    fn required_ahead_ms(&self) -> u64 {
        let lc = &self.config.load_control;
        let want = if self.rebuffering {
            lc.buffer_for_playback_after_rebuffer_ms
        } else {
            lc.buffer_for_playback_ms
        };
        want.min(self.duration().saturating_sub(self.position_ms))
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            self.state = state;
            self.events.push(EngineEvent::StateChanged(state));
        }
        self.sync_playing();
    }

    fn sync_playing(&mut self) {
        let playing = self.state == PlaybackState::Ready && self.play_when_ready;
        if playing != self.playing {
            self.playing = playing;
            self.events.push(EngineEvent::IsPlayingChanged(playing));
        }
    }

    fn check_buffer(&mut self) {
        if self.state != PlaybackState::Buffering {
            return;
        }
        let ahead = self.buffered_position_ms().saturating_sub(self.position_ms);
        if self.buffered.complete || ahead >= self.required_ahead_ms() {
            self.rebuffering = false;
            self.set_state(PlaybackState::Ready);
        }
    }
}

fn empty_progress() -> Prefetched {
    Prefetched {
        bytes: 0,
        content_length: None,
        complete: false,
    }
}

impl PlaybackEngine for HeadlessEngine {
    fn set_media_item(&mut self, item: MediaItem, reset_position: bool) {
        if reset_position {
            self.position_ms = 0;
        }
        self.buffered = item.cached;
        self.item = Some(item);
        self.rebuffering = false;
        self.set_state(PlaybackState::Idle);
    }

    fn prepare(&mut self) {
        if self.item.is_none() || self.released {
            return;
        }
        self.last_tick = None;
        self.set_state(PlaybackState::Buffering);
        self.check_buffer();
    }

    fn set_play_when_ready(&mut self, play: bool) {
        self.play_when_ready = play;
        self.sync_playing();
    }

    fn play_when_ready(&self) -> bool {
        self.play_when_ready
    }

    fn stop(&mut self) {
        self.set_state(PlaybackState::Idle);
    }

    fn clear_media_items(&mut self) {
        self.item = None;
        self.buffered = empty_progress();
        self.position_ms = 0;
        self.set_state(PlaybackState::Idle);
    }

    fn on_buffered(&mut self, progress: Prefetched) {
        if progress.bytes >= self.buffered.bytes || progress.complete {
            self.buffered = progress;
        }
        self.check_buffer();
    }

    fn on_source_error(&mut self, error: PlayerError) {
        self.events.push(EngineEvent::Error(error));
        self.set_state(PlaybackState::Idle);
    }

    fn poll(&mut self, now: Instant) -> Vec<EngineEvent> {
        let elapsed = self
            .last_tick
            .map(|t| now.saturating_duration_since(t).as_millis() as u64)
            .unwrap_or(0);
        self.last_tick = Some(now);

        if self.playing {
            let duration = self.duration();
            let buffered = self.buffered_position_ms();
            self.position_ms = (self.position_ms + elapsed).min(buffered).min(duration);
            if self.position_ms >= duration {
                self.set_state(PlaybackState::Ended);
            } else if self.position_ms >= buffered && !self.buffered.complete {
                self.rebuffering = true;
                self.set_state(PlaybackState::Buffering);
            }
        } else {
            self.check_buffer();
        }

        std::mem::take(&mut self.events)
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn position_ms(&self) -> u64 {
        self.position_ms
    }

    fn buffered_position_ms(&self) -> u64 {
        if self.item.is_none() {
            return 0;
        }
        let duration = self.duration();
        if self.buffered.complete {
            return duration;
        }
        let ms = match self.buffered.content_length {
            Some(total) if total > 0 => {
                (duration as u128 * self.buffered.bytes as u128 / total as u128) as u64
            }
            _ => self.buffered.bytes / self.bytes_per_ms,
        };
        ms.min(duration)
    }

    fn duration_ms(&self) -> Option<u64> {
        self.item.as_ref().map(|_| self.duration())
    }

    fn release(&mut self) {
        self.item = None;
        self.released = true;
        self.set_state(PlaybackState::Idle);
    }
}
