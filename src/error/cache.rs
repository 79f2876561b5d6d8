//! 视频缓存相关错误

/// 缓存操作错误类型
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// 缓存目录不可用
    #[error("缓存目录不可用")]
    DirUnavailable,

    /// 写入分片失败
    #[error("写入缓存分片失败(offset={offset}): {source}")]
    WriteSpan {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// 索引保存失败
    #[error("保存缓存索引失败: {source}")]
    SaveIndex {
        #[source]
        source: std::io::Error,
    },

    /// 序列化失败
    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::DirUnavailable;
        assert_eq!(err.to_string(), "缓存目录不可用");
    }

    #[test]
    fn test_write_span_error_keeps_offset() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "只读");
        let err = CacheError::WriteSpan {
            offset: 4096,
            source: io_err,
        };
        assert!(err.to_string().contains("offset=4096"));
        assert!(err.to_string().contains("只读"));
    }
}
