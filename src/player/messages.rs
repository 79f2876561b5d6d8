use super::engine::PlaybackState;
use crate::error::PlayerError;

pub type ListenerId = u64;

/// Events delivered to listeners, always on the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    MediaItemChanged {
        url: String,
    },
    StateChanged {
        url: Option<String>,
        state: PlaybackState,
    },
    IsPlayingChanged {
        url: Option<String>,
        playing: bool,
    },
    Buffered {
        url: String,
        bytes: u64,
        complete: bool,
    },
    Error {
        url: Option<String>,
        error: PlayerError,
    },
}

pub trait PlayerListener: Send + 'static {
    fn on_event(&mut self, event: &PlayerEvent);
}

impl<F> PlayerListener for F
where
    F: FnMut(&PlayerEvent) + Send + 'static,
{
    fn on_event(&mut self, event: &PlayerEvent) {
        self(event)
    }
}

pub(super) enum PlayerCommand {
    Play { url: String },
    Pause,
    Resume,
    Stop,
    AddListener {
        id: ListenerId,
        listener: Box<dyn PlayerListener>,
    },
    RemoveListener { id: ListenerId },
    Release,
}

/// Transport snapshot published after every UI-thread turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportState {
    pub current_url: Option<String>,
    pub pending_url: Option<String>,
    pub state: PlaybackState,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
}
