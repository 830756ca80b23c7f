//! 页表结构模块
//!
//! 三级基数树页表：每张表占一个物理帧，含 512 个 64 位槽位，
//! 虚拟地址的三段 9 位索引自顶向下逐级选择槽位。表本身与叶子帧
//! 都通过 [`MemoryHal`] 的帧服务分配和释放。
//!
//! ## 设计要点
//!
//! - [`PageTable`] 只持有根表的物理页号，全部状态都在 HAL 帧中，
//!   因此中间表的分配与释放真实经过帧服务，泄漏可被外部审计。
//! - `walk` 对超界地址报致命错误；只读的 `translate` 对同样的地址
//!   返回"未映射"，供复制原语直接消费。

use super::{FatalError, FatalKind, PagingError, PagingResult, Pte, PteFlags};
use crate::address::{AlignOps, PageNum, Paddr, Ppn, UsizeConvert, Vaddr, Vpn, VpnRange};
use crate::config::{ENTRIES_PER_TABLE, INDEX_BITS, LEVELS, MAX_VA, PAGE_OFFSET_BITS, PAGE_SIZE};
use crate::hal::MemoryHal;

/// [PteSlot]
/// ---------------------
/// 页表中一个槽位的位置：所在表的物理页号加槽位下标。
/// 读写都经过 HAL，保证条目始终以小端 u64 存放在表帧内。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PteSlot {
    /// 槽位所在页表的物理页号
    pub table: Ppn,
    /// 槽位下标 (0..512)
    pub index: usize,
}

impl PteSlot {
    /// 读取槽位中的条目。
    pub fn read(&self, hal: &dyn MemoryHal) -> Pte {
        Pte::from_bits(hal.read_u64(self.table, self.index))
    }

    /// 向槽位写入条目。
    pub fn write(&self, hal: &dyn MemoryHal, pte: Pte) {
        hal.write_u64(self.table, self.index, pte.bits());
    }
}

/// 解除映射时单页的处置结果，供上层维护驻留与交换元数据。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDisposition {
    /// 页原本有效映射，条目已清除（帧按 `free_frames` 处理）
    Mapped,
    /// 页原本已换出，换出标记已清除，调用方应释放其交换槽位
    Swapped,
    /// 该地址没有任何记录
    Absent,
}

/// [PageTable]
/// ---------------------
/// 三级基数树页表。
#[derive(Debug)]
pub struct PageTable {
    root: Ppn,
}

impl PageTable {
    /// 创建一张空页表（分配清零的根表帧）。
    pub fn new(hal: &dyn MemoryHal) -> PagingResult<Self> {
        let root = hal.alloc_frame().ok_or(PagingError::OutOfFrames)?;
        Ok(PageTable { root })
    }

    /// 根表的物理页号。
    pub fn root_ppn(&self) -> Ppn {
        self.root
    }

    /// 虚拟地址在给定级别的 9 位索引。
    fn index_of(vaddr: Vaddr, level: usize) -> usize {
        (vaddr.as_usize() >> (PAGE_OFFSET_BITS + INDEX_BITS * level)) & (ENTRIES_PER_TABLE - 1)
    }

    /// 自顶向下定位 `vaddr` 对应的叶子槽位。
    ///
    /// `alloc` 为真时沿途缺失的中间表会被分配（仅携带 `VALID`）；
    /// 为假时缺失则返回 `Ok(None)`。已换出的页其槽位仍然存在，
    /// 会照常返回。
    ///
    /// # Errors
    /// - 超出 [`MAX_VA`] 的地址：致命错误；
    /// - 中间表分配失败：[`PagingError::OutOfFrames`]。
    pub fn walk(
        &self,
        hal: &dyn MemoryHal,
        vaddr: Vaddr,
        alloc: bool,
    ) -> PagingResult<Option<PteSlot>> {
        if vaddr.as_usize() >= MAX_VA {
            return Err(FatalError::new(
                FatalKind::VaddrOutOfRange,
                "walk",
                Some(vaddr.as_usize()),
            ));
        }

        let mut table = self.root;
        for level in (1..LEVELS).rev() {
            let slot = PteSlot {
                table,
                index: Self::index_of(vaddr, level),
            };
            let pte = slot.read(hal);
            if pte.is_valid() {
                table = pte.ppn();
            } else if alloc {
                let next = hal.alloc_frame().ok_or(PagingError::OutOfFrames)?;
                slot.write(hal, Pte::new(next, PteFlags::VALID));
                table = next;
            } else {
                return Ok(None);
            }
        }

        Ok(Some(PteSlot {
            table,
            index: Self::index_of(vaddr, 0),
        }))
    }

    /// 将单个虚拟页映射到给定物理帧。
    ///
    /// `flags` 必须携带访问权限位；`VALID` 由本方法补上。
    ///
    /// # Errors
    /// - 地址未按页对齐或槽位已有有效映射：致命错误；
    /// - 中间表分配失败：[`PagingError::OutOfFrames`]。
    pub fn map_page(
        &mut self,
        hal: &dyn MemoryHal,
        vaddr: Vaddr,
        ppn: Ppn,
        flags: PteFlags,
    ) -> PagingResult<()> {
        if !vaddr.is_page_aligned() {
            return Err(FatalError::new(
                FatalKind::UnalignedVaddr,
                "map_page",
                Some(vaddr.as_usize()),
            ));
        }
        debug_assert!(flags.is_leaf());

        let slot = self
            .walk(hal, vaddr, true)?
            .ok_or(PagingError::OutOfFrames)?;
        if slot.read(hal).is_valid() {
            return Err(FatalError::new(
                FatalKind::Remap,
                "map_page",
                Some(vaddr.as_usize()),
            ));
        }
        slot.write(hal, Pte::new(ppn, flags | PteFlags::VALID));
        Ok(())
    }

    /// 从 `vaddr` 开始把一组物理帧映射到连续的虚拟页。
    pub fn map_pages(
        &mut self,
        hal: &dyn MemoryHal,
        vaddr: Vaddr,
        frames: &[Ppn],
        flags: PteFlags,
    ) -> PagingResult<()> {
        for (i, &ppn) in frames.iter().enumerate() {
            self.map_page(hal, vaddr + i * PAGE_SIZE, ppn, flags)?;
        }
        Ok(())
    }

    /// 解除单个虚拟页的映射并报告处置结果。
    ///
    /// 从未映射过的地址被容忍（返回 [`PageDisposition::Absent`]）；
    /// 已换出的页清除其换出标记并返回 [`PageDisposition::Swapped`]，
    /// 交换槽位的回收由调用方完成。
    ///
    /// # Errors
    /// 地址未对齐，或槽位指向中间表（树损坏）：致命错误。
    pub fn unmap_page(
        &mut self,
        hal: &dyn MemoryHal,
        vaddr: Vaddr,
        free_frame: bool,
    ) -> PagingResult<PageDisposition> {
        if !vaddr.is_page_aligned() {
            return Err(FatalError::new(
                FatalKind::UnalignedVaddr,
                "unmap_page",
                Some(vaddr.as_usize()),
            ));
        }

        let Some(slot) = self.walk(hal, vaddr, false)? else {
            return Ok(PageDisposition::Absent);
        };
        let pte = slot.read(hal);

        if !pte.is_valid() {
            if pte.is_swapped() {
                slot.write(hal, Pte::empty());
                return Ok(PageDisposition::Swapped);
            }
            return Ok(PageDisposition::Absent);
        }
        if !pte.flags().is_leaf() {
            return Err(FatalError::new(
                FatalKind::NotALeaf,
                "unmap_page",
                Some(vaddr.as_usize()),
            ));
        }

        if free_frame {
            hal.free_frame(pte.ppn());
        }
        slot.write(hal, Pte::empty());
        Ok(PageDisposition::Mapped)
    }

    /// 解除从 `vaddr` 起连续 `count` 页的映射。
    pub fn unmap_pages(
        &mut self,
        hal: &dyn MemoryHal,
        vaddr: Vaddr,
        count: usize,
        free_frames: bool,
    ) -> PagingResult<()> {
        for page in 0..count {
            self.unmap_page(hal, vaddr + page * PAGE_SIZE, free_frames)?;
        }
        Ok(())
    }

    /// 只读翻译：虚拟地址到物理地址。
    ///
    /// 只接受有效且用户态可访问的叶子；超界地址、无效条目
    /// （含已换出的页）一律视为未映射返回 `None`。
    pub fn translate(&self, hal: &dyn MemoryHal, vaddr: Vaddr) -> Option<Paddr> {
        if vaddr.as_usize() >= MAX_VA {
            return None;
        }
        let slot = self.walk(hal, vaddr, false).ok().flatten()?;
        let pte = slot.read(hal);
        if !pte.is_valid() || !pte.flags().contains(PteFlags::USER) {
            return None;
        }
        Some(Paddr::from_usize(
            pte.ppn().as_usize() * PAGE_SIZE + vaddr.page_offset(),
        ))
    }

    /// 深拷贝前 `size` 字节覆盖的映射到一张新页表。
    ///
    /// 只物化当前有效的叶子；空洞与已换出的页都被跳过。
    /// 全有或全无：任何一页复制失败时，已复制的页连同新表全部回收，
    /// 返回 [`PagingError::OutOfFrames`]。
    pub fn duplicate(&self, hal: &dyn MemoryHal, size: usize) -> PagingResult<PageTable> {
        let mut child = PageTable::new(hal)?;
        let range = VpnRange::from_start_len(Vpn::from_usize(0), size.div_ceil(PAGE_SIZE));

        for vpn in range {
            let vaddr = vpn.start_addr();
            let Some(slot) = self.walk(hal, vaddr, false)? else {
                continue;
            };
            let pte = slot.read(hal);
            if !pte.is_valid() {
                continue;
            }
            if !pte.flags().is_leaf() {
                return Err(FatalError::new(
                    FatalKind::NotALeaf,
                    "duplicate",
                    Some(vaddr.as_usize()),
                ));
            }

            match Self::copy_leaf(hal, &mut child, vaddr, pte) {
                Ok(()) => {}
                Err(PagingError::OutOfFrames) => {
                    child.free(hal, vpn.as_usize() * PAGE_SIZE)?;
                    return Err(PagingError::OutOfFrames);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(child)
    }

    /// 复制一个叶子页到子表：分配帧、拷贝内容、按原标志映射。
    fn copy_leaf(
        hal: &dyn MemoryHal,
        child: &mut PageTable,
        vaddr: Vaddr,
        pte: Pte,
    ) -> PagingResult<()> {
        let frame = hal.alloc_frame().ok_or(PagingError::OutOfFrames)?;
        hal.copy_frame(pte.ppn(), frame);
        if let Err(err) = child.map_page(hal, vaddr, frame, pte.flags() - PteFlags::VALID) {
            hal.free_frame(frame);
            return Err(err);
        }
        Ok(())
    }

    /// 释放整张页表：先解除前 `size` 字节覆盖的叶子映射（释放帧），
    /// 再递归释放所有表帧。
    ///
    /// # Errors
    /// 递归释放时发现仍有效的叶子（`size` 之外存在映射）：致命错误。
    pub fn free(mut self, hal: &dyn MemoryHal, size: usize) -> PagingResult<()> {
        let pages = size.div_ceil(PAGE_SIZE);
        self.unmap_pages(hal, Vaddr::from_usize(0), pages, true)?;
        Self::free_walk(hal, self.root, LEVELS - 1)
    }

    /// 递归释放以 `table` 为根、位于 `level` 级的子树。
    fn free_walk(hal: &dyn MemoryHal, table: Ppn, level: usize) -> PagingResult<()> {
        for index in 0..ENTRIES_PER_TABLE {
            let pte = PteSlot { table, index }.read(hal);
            if pte.is_valid() {
                if level == 0 || pte.flags().is_leaf() {
                    return Err(FatalError::new(FatalKind::LeafInFreeWalk, "free_walk", None));
                }
                Self::free_walk(hal, pte.ppn(), level - 1)?;
            }
        }
        hal.free_frame(table);
        Ok(())
    }
}
