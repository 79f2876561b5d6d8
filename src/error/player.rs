//! 播放相关错误

use super::DownloadError;

/// 播放错误类型（通过监听器回调上报，播放池自身不重试）
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PlayerError {
    /// 媒体地址无法解析
    #[error("媒体地址无效({url}): {reason}")]
    InvalidUri { url: String, reason: String },

    /// 媒体源读取失败
    #[error("读取媒体源失败({url}): {message}")]
    Source { url: String, message: String },

    /// 播放引擎运行时错误
    #[error("播放引擎错误: {0}")]
    Engine(String),
}

impl PlayerError {
    pub fn source_failed(url: &str, err: &DownloadError) -> Self {
        PlayerError::Source {
            url: url.to_owned(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_uri_display() {
        let err = PlayerError::InvalidUri {
            url: "not a url".to_owned(),
            reason: "relative URL without a base".to_owned(),
        };
        assert!(err.to_string().contains("not a url"));
    }

    #[test]
    fn test_source_failed_wraps_download_error() {
        let err = PlayerError::source_failed(
            "http://example.com/a.mp4",
            &DownloadError::InvalidUrl("x".to_owned()),
        );
        assert!(matches!(err, PlayerError::Source { .. }));
        assert!(err.to_string().contains("http://example.com/a.mp4"));
    }
}
