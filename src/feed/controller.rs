use super::model::Video;
use crate::context::FeedContext;
use crate::player::{PlaybackState, PlayerEvent};

/// Items shown between two opportunistic stale-entry sweeps.
const CLEANUP_EVERY: usize = 10;

/// Ordered circular feed with a current index.
pub struct FeedController {
    videos: Vec<Video>,
    urls: Vec<String>,
    index: usize,
    shown: usize,
}

impl FeedController {
    pub fn new(videos: Vec<Video>) -> Self {
        let urls = videos.iter().map(|v| v.url.clone()).collect();
        Self {
            videos,
            urls,
            index: 0,
            shown: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn current(&self) -> Option<&Video> {
        self.videos.get(self.index)
    }

    pub fn next_index(&self) -> usize {
        if self.videos.is_empty() {
            0
        } else {
            (self.index + 1) % self.videos.len()
        }
    }

    pub fn previous_index(&self) -> usize {
        match self.index {
            _ if self.videos.is_empty() => 0,
            0 => self.videos.len() - 1,
            i => i - 1,
        }
    }

    /// The `count` items after the current one, wrapping around.
    pub fn upcoming(&self, count: usize) -> Vec<&Video> {
        let n = self.videos.len();
        if n == 0 {
            return Vec::new();
        }
        (1..=count)
            .map(|i| &self.videos[(self.index + i) % n])
            .collect()
    }

    /// Selects an item without touching playback. Out-of-range indices are ignored.
    pub fn set_index(&mut self, index: usize) -> bool {
        if index < self.videos.len() {
            self.index = index;
            true
        } else {
            false
        }
    }

    /// Plays the current item and primes the ones after it.
    pub fn show_current(&mut self, ctx: &FeedContext) {
        let Some(video) = self.videos.get(self.index) else {
            return;
        };
        tracing::info!(index = self.index, id = %video.id, title = %video.title, "切换到视频");
        ctx.play(&video.url);
        ctx.preload_videos(&self.urls, self.index);

        self.shown += 1;
        if self.shown % CLEANUP_EVERY == 0 {
            let removed = ctx.cleanup_stale();
            if removed > 0 {
                tracing::info!(removed, "已清理过期缓存记录");
            }
        }
    }

    pub fn advance(&mut self, ctx: &FeedContext) {
        self.index = self.next_index();
        self.show_current(ctx);
    }

    pub fn back(&mut self, ctx: &FeedContext) {
        self.index = self.previous_index();
        self.show_current(ctx);
    }

    /// True when the event should move the feed forward: an error or the end of the current clip.
    pub fn should_advance(&self, event: &PlayerEvent) -> bool {
        let current = self.current().map(|v| v.url.as_str());
        match event {
            PlayerEvent::Error { url, .. } => url.as_deref().is_none() || url.as_deref() == current,
            PlayerEvent::StateChanged {
                url,
                state: PlaybackState::Ended,
            } => url.as_deref() == current,
            _ => false,
        }
    }
}
