use std::path::Path;

use sysinfo::{Disks, MemoryRefreshKind, RefreshKind, System};

use super::analyzer::{DeviceCounters, SystemCapacity, analyze};

/// Reads storage counters for the disk holding `path` plus host memory.
///
/// Returns `None` when either side cannot be determined.
pub fn probe_counters(path: &Path) -> Option<DeviceCounters> {
    let disks = Disks::new_with_refreshed_list();
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    // longest matching mount point wins
    let mut best: Option<(&sysinfo::Disk, usize)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if path.starts_with(mount) {
            let len = mount.as_os_str().len();
            if best.is_none_or(|(_, l)| len > l) {
                best = Some((disk, len));
            }
        }
    }
    let Some((disk, _)) = best else {
        tracing::warn!(path = %path.display(), "未找到数据目录所在磁盘");
        return None;
    };

    let mut system = System::new_with_specifics(
        RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
    );
    system.refresh_memory();

    let counters = DeviceCounters {
        total_storage_bytes: disk.total_space(),
        available_storage_bytes: disk.available_space(),
        total_memory_bytes: system.total_memory(),
        available_memory_bytes: system.available_memory(),
    };
    tracing::debug!(?counters, mount = %disk.mount_point().display(), "读取设备计数器");
    Some(counters)
}

/// Probes the host and classifies it; unreadable hosts get the most conservative tier.
pub fn analyze_host(path: &Path) -> SystemCapacity {
    match probe_counters(path) {
        Some(counters) => analyze(&counters),
        None => {
            tracing::warn!("设备容量读取失败，使用最保守档位");
            SystemCapacity::conservative()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_host_always_yields_a_tier() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cap = analyze_host(dir.path());
        assert!(cap.max_concurrent_videos >= 1);
        assert!(cap.recommended_cache_size_mb() >= 50);
    }
}
