use serde::{Deserialize, Serialize};

pub(crate) const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Recommended cache sizes never drop below this, whatever the tier.
pub const CACHE_FLOOR_MB: u64 = 50;

const LOW_END_MEMORY_MB: u64 = 2048;
const MID_MEMORY_MB: u64 = 4096;
const HIGH_MEMORY_MB: u64 = 8192;
const LOW_END_STORAGE_GB: f64 = 16.0;
const MEMORY_PRESSURE_PCT: f64 = 80.0;
const STORAGE_PRESSURE_PCT: f64 = 85.0;

/// 原始设备计数器（字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCounters {
    pub total_storage_bytes: u64,
    pub available_storage_bytes: u64,
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
}

impl DeviceCounters {
    /// Convenience constructor in the units the tiers are expressed in.
    pub fn from_mb_gb(
        total_memory_mb: u64,
        available_memory_mb: u64,
        total_storage_gb: u64,
        available_storage_gb: u64,
    ) -> Self {
        Self {
            total_storage_bytes: total_storage_gb * GIB,
            available_storage_bytes: available_storage_gb * GIB,
            total_memory_bytes: total_memory_mb * MIB,
            available_memory_bytes: available_memory_mb * MIB,
        }
    }

    fn is_readable(&self) -> bool {
        self.total_storage_bytes > 0
            && self.total_memory_bytes > 0
            && self.available_storage_bytes <= self.total_storage_bytes
            && self.available_memory_bytes <= self.total_memory_bytes
    }

    fn total_memory_mb(&self) -> u64 {
        self.total_memory_bytes / MIB
    }

    fn available_storage_mb(&self) -> u64 {
        self.available_storage_bytes / MIB
    }

    fn total_storage_gb(&self) -> f64 {
        self.total_storage_bytes as f64 / GIB as f64
    }

    fn available_storage_gb(&self) -> f64 {
        self.available_storage_bytes as f64 / GIB as f64
    }

    fn memory_used_pct(&self) -> f64 {
        used_pct(self.total_memory_bytes, self.available_memory_bytes)
    }

    fn storage_used_pct(&self) -> f64 {
        used_pct(self.total_storage_bytes, self.available_storage_bytes)
    }
}

fn used_pct(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    total.saturating_sub(available) as f64 / total as f64 * 100.0
}

/// 预加载策略档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreloadStrategy {
    Aggressive,
    Moderate,
    Conservative,
    Minimal,
}

impl PreloadStrategy {
    /// How many feed items ahead of the current one are scanned.
    pub fn preload_count(self) -> usize {
        match self {
            PreloadStrategy::Aggressive => 5,
            PreloadStrategy::Moderate => 3,
            PreloadStrategy::Conservative => 2,
            PreloadStrategy::Minimal => 1,
        }
    }
}

/// 设备容量快照，进程内只生成一次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemCapacity {
    pub total_storage_bytes: u64,
    pub available_storage_bytes: u64,
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
    pub is_low_end_device: bool,
    pub recommended_cache_size_bytes: u64,
    pub max_concurrent_videos: usize,
    pub preload_strategy: PreloadStrategy,
}

impl SystemCapacity {
    /// Tier used whenever the host counters cannot be read.
    pub fn conservative() -> Self {
        Self {
            total_storage_bytes: 0,
            available_storage_bytes: 0,
            total_memory_bytes: 0,
            available_memory_bytes: 0,
            is_low_end_device: true,
            recommended_cache_size_bytes: CACHE_FLOOR_MB * MIB,
            max_concurrent_videos: 1,
            preload_strategy: PreloadStrategy::Minimal,
        }
    }

    pub fn recommended_cache_size_mb(&self) -> u64 {
        self.recommended_cache_size_bytes / MIB
    }

    pub fn preload_count(&self) -> usize {
        self.preload_strategy.preload_count()
    }
}

/// 根据计数器划分设备档位；计数器不可读时退化为最保守档位
pub fn analyze(counters: &DeviceCounters) -> SystemCapacity {
    if !counters.is_readable() {
        tracing::warn!(?counters, "设备计数器不可读，使用最保守档位");
        return SystemCapacity::conservative();
    }

    let is_low_end = is_low_end_device(counters);
    let capacity = SystemCapacity {
        total_storage_bytes: counters.total_storage_bytes,
        available_storage_bytes: counters.available_storage_bytes,
        total_memory_bytes: counters.total_memory_bytes,
        available_memory_bytes: counters.available_memory_bytes,
        is_low_end_device: is_low_end,
        recommended_cache_size_bytes: recommended_cache_size_mb(counters, is_low_end) * MIB,
        max_concurrent_videos: max_concurrent_videos(counters, is_low_end),
        preload_strategy: preload_strategy(counters, is_low_end),
    };

    tracing::info!(
        low_end = capacity.is_low_end_device,
        cache_mb = capacity.recommended_cache_size_mb(),
        max_concurrent = capacity.max_concurrent_videos,
        strategy = ?capacity.preload_strategy,
        "设备容量分析完成"
    );
    capacity
}

fn is_low_end_device(c: &DeviceCounters) -> bool {
    c.total_memory_mb() < LOW_END_MEMORY_MB
        || c.total_storage_gb() < LOW_END_STORAGE_GB
        || c.memory_used_pct() > MEMORY_PRESSURE_PCT
        || c.storage_used_pct() > STORAGE_PRESSURE_PCT
}

fn recommended_cache_size_mb(c: &DeviceCounters, is_low_end: bool) -> u64 {
    let available_mb = c.available_storage_mb();
    let (divisor, ceiling_mb) = if is_low_end {
        (20, 200)
    } else if c.total_memory_mb() < MID_MEMORY_MB {
        (15, 500)
    } else {
        (10, 1024)
    };
    (available_mb / divisor).min(ceiling_mb).max(CACHE_FLOOR_MB)
}

fn max_concurrent_videos(c: &DeviceCounters, is_low_end: bool) -> usize {
    let total_mb = c.total_memory_mb();
    if is_low_end {
        1
    } else if total_mb < MID_MEMORY_MB {
        2
    } else if total_mb < HIGH_MEMORY_MB {
        3
    } else {
        4
    }
}

fn preload_strategy(c: &DeviceCounters, is_low_end: bool) -> PreloadStrategy {
    let total_mb = c.total_memory_mb();
    let available_gb = c.available_storage_gb();
    if is_low_end {
        PreloadStrategy::Minimal
    } else if total_mb < MID_MEMORY_MB || available_gb < 8.0 {
        PreloadStrategy::Conservative
    } else if total_mb < HIGH_MEMORY_MB || available_gb < 16.0 {
        PreloadStrategy::Moderate
    } else {
        PreloadStrategy::Aggressive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_end_device_gets_minimal_tier() {
        let c = DeviceCounters::from_mb_gb(1024, 512, 8, 4);
        let cap = analyze(&c);
        assert!(cap.is_low_end_device);
        assert_eq!(cap.preload_strategy, PreloadStrategy::Minimal);
        assert_eq!(cap.max_concurrent_videos, 1);
        // 4 GiB / 20 = 204 MB, capped at 200
        assert_eq!(cap.recommended_cache_size_mb(), 200);
    }

    #[test]
    fn high_end_device_gets_aggressive_tier() {
        let c = DeviceCounters::from_mb_gb(8192, 4096, 64, 20);
        let cap = analyze(&c);
        assert!(!cap.is_low_end_device);
        assert_eq!(cap.preload_strategy, PreloadStrategy::Aggressive);
        assert_eq!(cap.max_concurrent_videos, 4);
        assert_eq!(cap.recommended_cache_size_mb(), 1024);
    }

    #[test]
    fn memory_pressure_alone_marks_low_end() {
        // 16 GiB RAM but only 10% free
        let c = DeviceCounters::from_mb_gb(16384, 1600, 128, 100);
        assert!(analyze(&c).is_low_end_device);
    }

    #[test]
    fn storage_pressure_alone_marks_low_end() {
        // 128 GiB disk with 10 GiB free -> 92% used
        let c = DeviceCounters::from_mb_gb(16384, 8192, 128, 10);
        assert!(analyze(&c).is_low_end_device);
    }

    #[test]
    fn mid_range_memory_is_conservative() {
        let c = DeviceCounters::from_mb_gb(3072, 2048, 64, 40);
        let cap = analyze(&c);
        assert!(!cap.is_low_end_device);
        assert_eq!(cap.preload_strategy, PreloadStrategy::Conservative);
        assert_eq!(cap.max_concurrent_videos, 2);
        // 40 GiB / 15 = 2730 MB, capped at 500
        assert_eq!(cap.recommended_cache_size_mb(), 500);
    }

    #[test]
    fn low_available_storage_drops_to_moderate() {
        // plenty of RAM, 12 GiB free on a 64 GiB disk
        let c = DeviceCounters::from_mb_gb(12288, 8192, 64, 12);
        let cap = analyze(&c);
        assert_eq!(cap.preload_strategy, PreloadStrategy::Moderate);
        assert_eq!(cap.max_concurrent_videos, 4);
    }

    #[test]
    fn recommended_size_never_below_floor() {
        // 0 GiB free computes 0 MB before the floor applies
        for avail_gb in [0u64, 1, 2, 3] {
            let c = DeviceCounters::from_mb_gb(1024, 512, 16, avail_gb);
            let mb = analyze(&c).recommended_cache_size_mb();
            assert!((CACHE_FLOOR_MB..=200).contains(&mb), "got {mb}");
        }
    }

    #[test]
    fn unreadable_counters_fall_back_to_conservative() {
        let cap = analyze(&DeviceCounters::default());
        assert_eq!(cap, SystemCapacity::conservative());
    }

    #[test]
    fn preload_counts_per_strategy() {
        assert_eq!(PreloadStrategy::Aggressive.preload_count(), 5);
        assert_eq!(PreloadStrategy::Moderate.preload_count(), 3);
        assert_eq!(PreloadStrategy::Conservative.preload_count(), 2);
        assert_eq!(PreloadStrategy::Minimal.preload_count(), 1);
    }
}
