pub mod store;

pub use store::{
    AppSettings, CacheSettings, NetworkSettings, PlayerSettings, load_settings, save_settings,
};

use std::path::PathBuf;

/// 默认数据目录（系统 data_local_dir 下）
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "clipfeed", "clipfeed")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("clipfeed"))
}
