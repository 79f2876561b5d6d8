use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "clipfeed", version, about = "短视频流的自适应缓存与播放池")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// 覆盖数据目录（默认走系统 data_local_dir）
    #[arg(long, env = "CLIPFEED_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// 覆盖日志目录（默认 `{data_dir}/logs`）
    #[arg(long, env = "CLIPFEED_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// 覆盖日志过滤（等价于设置 RUST_LOG）
    #[arg(long, env = "RUST_LOG")]
    pub log_filter: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 探测设备能力并以 JSON 输出
    Capacity,

    /// 以无界面引擎播放视频列表
    Run {
        /// 视频列表 JSON（{"videos": [...]}）
        #[arg(long)]
        feed: PathBuf,

        /// 播放的视频数量，播完或出错时切到下一个
        #[arg(long, default_value_t = 5)]
        items: usize,

        /// 模拟断网（播放与预加载都会被跳过）
        #[arg(long)]
        offline: bool,
    },

    /// 打印磁盘缓存与登记表统计
    CacheStats,

    /// 清空磁盘缓存
    ClearCache,
}
