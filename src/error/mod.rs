//! 统一错误处理模块
//!
//! 提供各子系统的结构化错误类型。

mod app;
mod cache;
mod download;
mod player;

pub use app::{AppError, SettingsError};
pub use cache::CacheError;
pub use download::DownloadError;
pub use player::PlayerError;
