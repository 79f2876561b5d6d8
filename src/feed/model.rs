use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoResponse {
    #[serde(default)]
    pub videos: Vec<Video>,
}

/// Reads a feed file, dropping items without a URL.
pub fn load_feed(path: &Path) -> Result<Vec<Video>, AppError> {
    let bytes = fs::read(path)?;
    let resp: VideoResponse = serde_json::from_slice(&bytes)?;
    let total = resp.videos.len();
    let videos: Vec<Video> = resp
        .videos
        .into_iter()
        .filter(|v| !v.url.trim().is_empty())
        .collect();
    if videos.len() != total {
        tracing::warn!(skipped = total - videos.len(), "跳过缺少 url 的视频");
    }
    tracing::info!(path = %path.display(), count = videos.len(), "已加载视频列表");
    Ok(videos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_empty() {
        let resp: VideoResponse =
            serde_json::from_str(r#"{"videos":[{"id":"1","url":"https://v/1.mp4"}]}"#)
                .expect("parse");
        assert_eq!(resp.videos[0].title, "");
        assert_eq!(resp.videos[0].thumbnail, "");
    }

    #[test]
    fn load_feed_skips_items_without_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let p = dir.path().join("videos.json");
        fs::write(
            &p,
            r#"{"videos":[{"id":"1","title":"a","url":"https://v/1.mp4","thumbnail":""},{"id":"2","url":" "}]}"#,
        )
        .expect("write");
        let videos = load_feed(&p).expect("load");
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "1");
    }

    #[test]
    fn load_feed_rejects_bad_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let p = dir.path().join("videos.json");
        fs::write(&p, b"{oops").expect("write");
        assert!(matches!(load_feed(&p), Err(AppError::Serde(_))));
    }
}
