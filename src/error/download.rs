//! 下载相关错误

use reqwest::StatusCode;

use super::CacheError;

/// 下载错误类型
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP 请求错误
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP 状态码错误
    #[error("HTTP 状态码 {status}: {url}")]
    StatusCode { status: StatusCode, url: String },

    /// 写入缓存失败
    #[error("写入缓存失败: {0}")]
    Cache(#[from] CacheError),

    /// 下载 URL 无效
    #[error("下载 URL 无效: {0}")]
    InvalidUrl(String),
}

impl DownloadError {
    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Http(_) => true,
            DownloadError::StatusCode { status, .. } => {
                *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || status.is_server_error()
            }
            DownloadError::Cache(_) | DownloadError::InvalidUrl(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_display() {
        let err = DownloadError::InvalidUrl("ftp://x".to_owned());
        assert_eq!(err.to_string(), "下载 URL 无效: ftp://x");
    }

    #[test]
    fn test_is_retryable() {
        assert!(
            DownloadError::StatusCode {
                status: StatusCode::SERVICE_UNAVAILABLE,
                url: "http://example.com/a.mp4".to_string()
            }
            .is_retryable()
        );
        assert!(
            !DownloadError::StatusCode {
                status: StatusCode::NOT_FOUND,
                url: "http://example.com/a.mp4".to_string()
            }
            .is_retryable()
        );
        assert!(!DownloadError::Cache(CacheError::DirUnavailable).is_retryable());
    }
}
