use serde::{Deserialize, Serialize};

use crate::capacity::SystemCapacity;

const MIB: u64 = 1024 * 1024;

pub const BUDGET_FLOOR_BYTES: u64 = 50 * MIB;
pub const LEGACY_CEILING_BYTES: u64 = 500 * MIB;
pub const CAPACITY_CEILING_BYTES: u64 = 1024 * MIB;

/// 缓存预算的计算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// 10% of available internal storage, clamped to [50 MB, 500 MB].
    Legacy,
    /// Analyzer-recommended size, clamped to [50 MB, 1 GB].
    #[default]
    Capacity,
}

/// Byte ceiling for the cache store, fixed once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBudget {
    bytes: u64,
}

impl CacheBudget {
    pub fn compute(policy: BudgetPolicy, capacity: &SystemCapacity) -> Self {
        let bytes = match policy {
            BudgetPolicy::Legacy => (capacity.available_storage_bytes / 10)
                .clamp(BUDGET_FLOOR_BYTES, LEGACY_CEILING_BYTES),
            BudgetPolicy::Capacity => capacity
                .recommended_cache_size_bytes
                .clamp(BUDGET_FLOOR_BYTES, CAPACITY_CEILING_BYTES),
        };
        Self { bytes }
    }

    /// Explicit override, still subject to the floor and the largest ceiling.
    pub fn from_mb(mb: u64) -> Self {
        Self {
            bytes: mb
                .saturating_mul(MIB)
                .clamp(BUDGET_FLOOR_BYTES, CAPACITY_CEILING_BYTES),
        }
    }

    pub fn bytes(self) -> u64 {
        self.bytes
    }

    pub fn mb(self) -> u64 {
        self.bytes / MIB
    }
}
