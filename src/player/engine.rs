use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PlayerError;
use crate::source::Prefetched;

/// 缓冲策略：以时长阈值为准，不按字节阈值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadControl {
    pub min_buffer_ms: u64,
    pub max_buffer_ms: u64,
    pub buffer_for_playback_ms: u64,
    pub buffer_for_playback_after_rebuffer_ms: u64,
    pub prioritize_time_over_size_thresholds: bool,
}

impl Default for LoadControl {
    fn default() -> Self {
        Self {
            min_buffer_ms: 15_000,
            max_buffer_ms: 50_000,
            buffer_for_playback_ms: 2_500,
            buffer_for_playback_after_rebuffer_ms: 5_000,
            prioritize_time_over_size_thresholds: true,
        }
    }
}

/// Render target of the engine. A capability flag, chosen at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// Composited like a regular view, needed for clipping and rounded corners.
    #[default]
    Texture,
    Surface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub load_control: LoadControl,
    pub surface: SurfaceKind,
    pub repeat: bool,
    pub play_when_ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Buffering,
    Ready,
    Ended,
}

/// A prepared feed item, built off the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub url: String,
    /// What the cache could already serve when the item was built.
    pub cached: Prefetched,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged(PlaybackState),
    IsPlayingChanged(bool),
    Error(PlayerError),
}

/// The single playback engine. Lives on the UI-affinity thread and is
/// never touched from anywhere else, so it does not need to be `Send`.
pub trait PlaybackEngine {
    fn set_media_item(&mut self, item: MediaItem, reset_position: bool);
    fn prepare(&mut self);
    fn set_play_when_ready(&mut self, play: bool);
    fn play_when_ready(&self) -> bool;
    fn stop(&mut self);
    fn clear_media_items(&mut self);

    /// Read-through progress for the current item.
    fn on_buffered(&mut self, progress: Prefetched);
    fn on_source_error(&mut self, error: PlayerError);

    /// Advances internal clocks and drains pending events.
    fn poll(&mut self, now: Instant) -> Vec<EngineEvent>;

    fn state(&self) -> PlaybackState;
    fn is_playing(&self) -> bool;
    fn position_ms(&self) -> u64;
    /// How far into the item the buffered media reaches.
    fn buffered_position_ms(&self) -> u64;
    fn duration_ms(&self) -> Option<u64>;
    fn release(&mut self);
}

pub type EngineFactory = Box<dyn FnOnce(EngineConfig) -> Box<dyn PlaybackEngine> + Send>;
