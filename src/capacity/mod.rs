//! 设备容量分析
//!
//! 启动时读取一次存储/内存计数器，划分设备档位，
//! 据此决定缓存预算、并发预加载数量与预加载策略。

mod analyzer;
mod probe;

pub use analyzer::{DeviceCounters, PreloadStrategy, SystemCapacity, analyze};
pub use probe::{analyze_host, probe_counters};
