//! 页表条目模块
//!
//! 定义页表条目 (PTE) 的标志位集合与 64 位打包格式。
//!
//! 打包格式：低 10 位为标志位，物理页号从第 10 位开始
//! (`ppn << 10 | flags`)。标志位中第 8 位属于软件保留区，
//! 用于标记"已换出"状态。

use crate::address::{Ppn, UsizeConvert};
use bitflags::bitflags;

bitflags! {
    /// [PteFlags]
    /// ---------------------
    /// 页表条目的标志位集合。
    ///
    /// 不变量：
    /// - 中间条目只携带 `VALID`；
    /// - 叶子条目携带 `VALID` 加上 R/W/X 中至少一个；
    /// - `SWAPPED` 只出现在无效条目上，与 `VALID` 互斥。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        /// 条目有效
        const VALID = 1 << 0;
        /// 可读
        const READ = 1 << 1;
        /// 可写
        const WRITE = 1 << 2;
        /// 可执行
        const EXECUTE = 1 << 3;
        /// 用户态可访问
        const USER = 1 << 4;
        /// 硬件访问位，页被引用时置位
        const ACCESSED = 1 << 6;
        /// 软件保留位：页已换出到交换存储
        const SWAPPED = 1 << 8;
    }
}

impl PteFlags {
    /// 用户态可读写页的标志组合。
    pub fn user_rw() -> Self {
        Self::READ | Self::WRITE | Self::USER
    }

    /// 用户态可读写可执行页的标志组合。
    pub fn user_rwx() -> Self {
        Self::READ | Self::WRITE | Self::EXECUTE | Self::USER
    }

    /// 是否携带任一访问权限位 (R/W/X)，即是否描述叶子。
    pub fn is_leaf(&self) -> bool {
        self.intersects(Self::READ | Self::WRITE | Self::EXECUTE)
    }
}

/// [Pte]
/// ---------------------
/// 一条 64 位页表条目。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pte(u64);

/// 物理页号在条目中的偏移位数
const PPN_SHIFT: usize = 10;

impl Pte {
    /// 空条目 (全零，无效)。
    pub const fn empty() -> Self {
        Pte(0)
    }

    /// 由物理页号和标志位构造条目。
    pub fn new(ppn: Ppn, flags: PteFlags) -> Self {
        Pte(((ppn.as_usize() as u64) << PPN_SHIFT) | flags.bits())
    }

    /// 由原始位构造条目。
    pub fn from_bits(bits: u64) -> Self {
        Pte(bits)
    }

    /// 原始位。
    pub fn bits(&self) -> u64 {
        self.0
    }

    /// 条目中的物理页号。
    pub fn ppn(&self) -> Ppn {
        Ppn::from_usize((self.0 >> PPN_SHIFT) as usize)
    }

    /// 条目中的标志位 (未定义位被截断)。
    pub fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// 条目是否有效。
    pub fn is_valid(&self) -> bool {
        self.flags().contains(PteFlags::VALID)
    }

    /// 条目是否记录了一个被换出的页。
    pub fn is_swapped(&self) -> bool {
        self.flags().contains(PteFlags::SWAPPED)
    }

    /// 条目是否是有效叶子 (有效且携带访问权限位)。
    pub fn is_leaf(&self) -> bool {
        self.is_valid() && self.flags().is_leaf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let pte = Pte::new(Ppn(0x1234), PteFlags::user_rw() | PteFlags::VALID);
        assert_eq!(pte.ppn(), Ppn(0x1234));
        assert!(pte.is_valid());
        assert!(pte.is_leaf());
        assert!(!pte.is_swapped());
        assert!(pte.flags().contains(PteFlags::USER));
    }

    #[test]
    fn test_interior_not_leaf() {
        let pte = Pte::new(Ppn(7), PteFlags::VALID);
        assert!(pte.is_valid());
        assert!(!pte.is_leaf());
    }

    #[test]
    fn test_swapped_marker() {
        let flags = (PteFlags::user_rw() | PteFlags::SWAPPED) - PteFlags::VALID;
        let pte = Pte::new(Ppn(0), flags);
        assert!(!pte.is_valid());
        assert!(pte.is_swapped());
        // 权限位在换出期间保留
        assert!(pte.flags().contains(PteFlags::WRITE));
    }
}
