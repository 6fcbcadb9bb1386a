use std::sync::atomic::{AtomicU64, Ordering};

use kv_storage::DiskSpace;

/// Tracks accounted bytes against a configured soft limit, rejecting a `Put` once the
/// running total would exceed it. A real deployment would ask the embedded engine's
/// own disk-usage stats instead of this running counter.
pub struct SoftLimitDiskSpace {
    limit: u64,
    used: AtomicU64,
}

impl SoftLimitDiskSpace {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    fn entry_size(key: &[u8], val: &[u8]) -> u64 {
        (key.len() + val.len()) as u64
    }
}

impl DiskSpace for SoftLimitDiskSpace {
    fn has_enough_disk_space(&self, key: &[u8], val: &[u8]) -> bool {
        self.used.load(Ordering::Relaxed) + Self::entry_size(key, val) <= self.limit
    }

    fn account_for_disk_space(&self, key: &[u8], val: &[u8]) {
        self.used
            .fetch_add(Self::entry_size(key, val), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_once_the_limit_is_reached() {
        let disk = SoftLimitDiskSpace::new(10);
        assert!(disk.has_enough_disk_space(b"k", b"12345"));
        disk.account_for_disk_space(b"k", b"12345");
        assert!(disk.has_enough_disk_space(b"k2", b"1234"));
        disk.account_for_disk_space(b"k2", b"1234");
        assert!(!disk.has_enough_disk_space(b"k3", b"12"));
    }
}
