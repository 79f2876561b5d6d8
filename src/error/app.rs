//! 应用通用错误

use super::{CacheError, DownloadError, PlayerError};

/// 应用通用错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("JSON 序列化失败: {0}")]
    Serde(#[from] serde_json::Error),

    /// 设置错误
    #[error("设置错误: {0}")]
    Settings(#[from] SettingsError),

    /// 缓存错误
    #[error("缓存错误: {0}")]
    Cache(#[from] CacheError),

    /// 下载错误
    #[error("下载错误: {0}")]
    Download(#[from] DownloadError),

    /// 播放错误
    #[error("播放错误: {0}")]
    Player(#[from] PlayerError),

    /// 运行时初始化失败
    #[error("运行时初始化失败: {0}")]
    Runtime(String),

    /// 其他错误
    #[error("{0}")]
    Other(String),
}

/// 设置相关错误
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// 保存设置失败
    #[error("保存设置失败: {source}")]
    Save {
        #[source]
        source: std::io::Error,
    },

    /// 设置值无效
    #[error("设置值无效: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "文件未找到");
        let err = AppError::Io(io_err);
        assert!(err.to_string().contains("IO 错误"));
    }

    #[test]
    fn test_error_chain() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let app_err = AppError::Io(io_err);

        use std::error::Error;
        assert!(app_err.source().is_some());
    }

    #[test]
    fn test_cache_error_converts() {
        let err: AppError = CacheError::DirUnavailable.into();
        assert!(err.to_string().contains("缓存目录不可用"));
    }
}
