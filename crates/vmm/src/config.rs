//! 虚拟内存子系统的布局常量与换页参数
//!
//! 页表几何（页大小、索引位数、级数）是编译期常量；换页相关的容量
//! （可跟踪页数、驻留上限）通过 [`PagerConfig`] 在地址空间创建时显式传入。

/// 页大小 (字节)
pub const PAGE_SIZE: usize = 4096;

/// 每级页表索引占用的位数
pub const INDEX_BITS: usize = 9;

/// 页表级数
pub const LEVELS: usize = 3;

/// 每张页表的槽位数 (1 << INDEX_BITS)
pub const ENTRIES_PER_TABLE: usize = 1 << INDEX_BITS;

/// 页内偏移占用的位数
pub const PAGE_OFFSET_BITS: usize = 12;

/// 可翻译虚拟地址空间的上界 (不包含)。
///
/// 三级页表可覆盖 9 * 3 + 12 = 39 位，保留最高一位索引避免符号扩展歧义，
/// 因此实际可用范围是 `[0, 1 << 38)`。
pub const MAX_VA: usize = 1 << (INDEX_BITS * LEVELS + PAGE_OFFSET_BITS - 1);

/// [PagerConfig]
/// ---------------------
/// 换页引擎的容量参数，在创建支持换页的地址空间时显式给出。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PagerConfig {
    /// 地址空间可跟踪的最大页数（虚拟页号上界，不包含）。
    pub max_tracked_pages: usize,
    /// 允许同时驻留物理内存的页数上限。
    pub resident_capacity: usize,
}

impl PagerConfig {
    /// 创建一份换页配置。
    ///
    /// # Panics
    /// `resident_capacity` 为 0 或超过 `max_tracked_pages` 时 panic，
    /// 此类配置无法维持有界驻留集。
    pub fn new(max_tracked_pages: usize, resident_capacity: usize) -> Self {
        assert!(resident_capacity > 0);
        assert!(resident_capacity <= max_tracked_pages);
        Self {
            max_tracked_pages,
            resident_capacity,
        }
    }
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self::new(32, 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry() {
        assert_eq!(ENTRIES_PER_TABLE, 512);
        assert_eq!(ENTRIES_PER_TABLE * 8, PAGE_SIZE);
        assert_eq!(MAX_VA, 1 << 38);
    }

    #[test]
    #[should_panic]
    fn test_capacity_above_tracked_rejected() {
        let _ = PagerConfig::new(8, 9);
    }
}
