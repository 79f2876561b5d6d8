//! 视频流
//!
//! 读取本地视频列表，并维护当前位置（循环），在切换时触发播放与预加载。

mod controller;
mod model;

pub use controller::FeedController;
pub use model::{Video, VideoResponse, load_feed};
