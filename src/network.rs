//! 网络可达性
//!
//! 缓存/预加载/播放在开始前都会同步查询一次可达性。
//! 真实的连接状态由外部观察者推送进来。

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    None,
    Wifi,
    Cellular,
    Ethernet,
}

impl Transport {
    fn as_u8(self) -> u8 {
        match self {
            Transport::None => 0,
            Transport::Wifi => 1,
            Transport::Cellular => 2,
            Transport::Ethernet => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Transport::Wifi,
            2 => Transport::Cellular,
            3 => Transport::Ethernet,
            _ => Transport::None,
        }
    }

    pub fn is_reachable(self) -> bool {
        !matches!(self, Transport::None)
    }
}

/// Synchronous, non-blocking reachability query.
pub trait Connectivity: Send + Sync {
    fn transport(&self) -> Transport;

    fn is_available(&self) -> bool {
        self.transport().is_reachable()
    }
}

/// Connectivity state pushed in by an external observer.
#[derive(Debug)]
pub struct SharedConnectivity {
    transport: AtomicU8,
}

impl SharedConnectivity {
    pub fn new(initial: Transport) -> Self {
        Self {
            transport: AtomicU8::new(initial.as_u8()),
        }
    }

    pub fn set(&self, transport: Transport) {
        let prev = Transport::from_u8(self.transport.swap(transport.as_u8(), Ordering::Relaxed));
        if prev != transport {
            tracing::info!(from = ?prev, to = ?transport, "网络状态变化");
        }
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(Transport::Wifi)
    }
}

impl Connectivity for SharedConnectivity {
    fn transport(&self) -> Transport {
        Transport::from_u8(self.transport.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_none_is_unreachable() {
        let c = SharedConnectivity::new(Transport::None);
        assert!(!c.is_available());
        for t in [Transport::Wifi, Transport::Cellular, Transport::Ethernet] {
            c.set(t);
            assert!(c.is_available());
            assert_eq!(c.transport(), t);
        }
    }
}
