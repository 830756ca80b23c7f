//! 地址空间模块
//!
//! [`AddressSpace`] 把页表、逻辑大小和可选的换页引擎组合成进程的
//! 内存视图，提供创建、增长、收缩、深拷贝、释放、缺页处理与
//! 用户复制等操作。
//!
//! ## 换页引擎
//!
//! 支持换页的地址空间持有一个 [`Pager`]：按页号索引的元数据表、
//! 替换策略与驻留计数。增长与缺页换入都在入驻前检查驻留上限，
//! 必要时先淘汰一页到交换存储；交换槽位按首次适配分配。
//! 引导进程等不参与换页的空间用 [`AddressSpace::new`] 创建，
//! 不携带任何交换元数据。

use crate::address::{AlignOps, PageNum, Paddr, Ppn, UsizeConvert, Vaddr, Vpn, VpnRange};
use crate::backing_store::BackingStore;
use crate::config::{MAX_VA, PAGE_SIZE, PagerConfig};
use crate::hal::MemoryHal;
use crate::page_table::{
    FatalError, FatalKind, PageDisposition, PageTable, PagingError, PagingResult, Pte, PteFlags,
};
use crate::resident::{PageMeta, PolicyKind, ReplacementPolicy};
use crate::uaccess;
use alloc::vec::Vec;

/// [Pager]
/// ---------------------
/// 地址空间的换页引擎：元数据表、替换策略与驻留计数。
pub struct Pager {
    config: PagerConfig,
    meta: Vec<PageMeta>,
    policy: ReplacementPolicy,
    resident: usize,
}

impl Pager {
    fn new(config: PagerConfig, kind: PolicyKind) -> Self {
        Self {
            config,
            meta: alloc::vec![PageMeta::default(); config.max_tracked_pages],
            policy: ReplacementPolicy::new(kind, config.resident_capacity),
            resident: 0,
        }
    }

    /// 容量参数。
    pub fn config(&self) -> PagerConfig {
        self.config
    }

    /// 当前驻留物理内存的页数。
    pub fn resident_count(&self) -> usize {
        self.resident
    }

    /// 替换策略。
    pub fn policy(&self) -> &ReplacementPolicy {
        &self.policy
    }

    /// 给定页号的元数据。
    pub fn meta(&self, page: usize) -> Option<&PageMeta> {
        self.meta.get(page)
    }
}

/// [AddressSpace]
/// ---------------------
/// 一个进程的内存视图：页表 + 逻辑大小 + 可选换页引擎。
pub struct AddressSpace {
    table: PageTable,
    size: usize,
    pager: Option<Pager>,
}

impl AddressSpace {
    /// 创建一个不参与换页的空地址空间。
    pub fn new(hal: &dyn MemoryHal) -> PagingResult<Self> {
        Ok(Self {
            table: PageTable::new(hal)?,
            size: 0,
            pager: None,
        })
    }

    /// 创建一个支持换页的空地址空间，策略与容量在此刻固定。
    pub fn new_paged(
        hal: &dyn MemoryHal,
        config: PagerConfig,
        kind: PolicyKind,
    ) -> PagingResult<Self> {
        Ok(Self {
            table: PageTable::new(hal)?,
            size: 0,
            pager: Some(Pager::new(config, kind)),
        })
    }

    /// 逻辑大小 (字节)。
    pub fn size(&self) -> usize {
        self.size
    }

    /// 底层页表。
    pub fn table(&self) -> &PageTable {
        &self.table
    }

    /// 换页引擎（不参与换页的空间返回 `None`）。
    pub fn pager(&self) -> Option<&Pager> {
        self.pager.as_ref()
    }

    /// 向空的地址空间装入首进程镜像：单页代码/数据映射到页 0。
    ///
    /// # Errors
    /// - 镜像不小于一页：致命错误；
    /// - 帧耗尽：[`PagingError::OutOfFrames`]。
    pub fn init_first(&mut self, hal: &dyn MemoryHal, data: &[u8]) -> PagingResult<()> {
        if data.len() >= PAGE_SIZE {
            return Err(FatalError::new(
                FatalKind::OversizedFirstPage,
                "init_first",
                None,
            ));
        }
        debug_assert_eq!(self.size, 0);

        let frame = hal.alloc_frame().ok_or(PagingError::OutOfFrames)?;
        if let Err(err) = self
            .table
            .map_page(hal, Vaddr::from_usize(0), frame, PteFlags::user_rwx())
        {
            hal.free_frame(frame);
            return Err(err);
        }
        hal.write_frame(frame, 0, data);
        self.size = PAGE_SIZE;
        self.admit(Vpn::from_usize(0));
        Ok(())
    }

    /// 把地址空间增长到 `new_size` 字节，返回生效后的大小。
    ///
    /// 目标不大于当前大小时是空操作。新页以用户态 RWX 映射并清零；
    /// 支持换页的空间在每次入驻前检查驻留上限，必要时先淘汰。
    /// 任何一页失败时整体回退到原大小。
    ///
    /// # Errors
    /// - 帧耗尽：[`PagingError::OutOfFrames`]（已回退）；
    /// - 新页超出可跟踪范围：[`PagingError::PageLimitExceeded`]（已回退）。
    pub fn grow(
        &mut self,
        hal: &dyn MemoryHal,
        store: &dyn BackingStore,
        new_size: usize,
    ) -> PagingResult<usize> {
        if new_size <= self.size {
            return Ok(self.size);
        }
        let old_size = self.size;
        let first = Vpn::from_addr_ceil(Vaddr::from_usize(old_size));
        let end = Vpn::from_addr_ceil(Vaddr::from_usize(new_size));

        for vpn in VpnRange::new(first, end) {
            match self.grow_one(hal, store, vpn.as_usize()) {
                Ok(()) => self.size = vpn.end_addr().as_usize(),
                Err(err @ (PagingError::OutOfFrames | PagingError::PageLimitExceeded)) => {
                    self.shrink(hal, old_size)?;
                    return Err(err);
                }
                Err(other) => return Err(other),
            }
        }
        self.size = new_size;
        Ok(new_size)
    }

    /// 增长一页：容量检查、可能的淘汰、分配并映射。
    fn grow_one(
        &mut self,
        hal: &dyn MemoryHal,
        store: &dyn BackingStore,
        page: usize,
    ) -> PagingResult<()> {
        if let Some(pager) = &self.pager {
            if page >= pager.config.max_tracked_pages {
                return Err(PagingError::PageLimitExceeded);
            }
        }
        let at_capacity = self
            .pager
            .as_ref()
            .is_some_and(|p| p.resident >= p.config.resident_capacity);
        if at_capacity {
            self.page_out(hal, store)?;
        }

        let frame = hal.alloc_frame().ok_or(PagingError::OutOfFrames)?;
        let vaddr = Vpn::from_usize(page).start_addr();
        if let Err(err) = self.table.map_page(hal, vaddr, frame, PteFlags::user_rwx()) {
            hal.free_frame(frame);
            return Err(err);
        }
        self.admit(Vpn::from_usize(page));
        Ok(())
    }

    /// 把地址空间收缩到 `new_size` 字节，返回生效后的大小。
    ///
    /// 目标不小于当前大小时是空操作。被裁掉的驻留页释放其帧，
    /// 已换出的页只丢弃交换槽位记录。
    pub fn shrink(&mut self, hal: &dyn MemoryHal, new_size: usize) -> PagingResult<usize> {
        if new_size >= self.size {
            return Ok(self.size);
        }
        let first = Vpn::from_addr_ceil(Vaddr::from_usize(new_size));
        let end = Vpn::from_addr_ceil(Vaddr::from_usize(self.size));

        for vpn in VpnRange::new(first, end) {
            let page = vpn.as_usize();
            let disposition = self.table.unmap_page(hal, vpn.start_addr(), true)?;
            if let Some(pager) = self.pager.as_mut() {
                if page < pager.config.max_tracked_pages {
                    match disposition {
                        PageDisposition::Mapped => {
                            pager.policy.on_unmap(Vpn::from_usize(page));
                            pager.meta[page] = PageMeta::default();
                            pager.resident -= 1;
                        }
                        PageDisposition::Swapped => {
                            pager.meta[page] = PageMeta::default();
                        }
                        PageDisposition::Absent => {}
                    }
                }
            }
        }
        self.size = new_size;
        Ok(new_size)
    }

    /// 淘汰一页到交换存储。
    ///
    /// 受害者由策略选出；其帧内容写入首次适配到的空闲槽位，
    /// 帧被释放，条目改写为无效但携带换出标记（权限位保留）。
    fn page_out(&mut self, hal: &dyn MemoryHal, store: &dyn BackingStore) -> PagingResult<()> {
        let Some(pager) = self.pager.as_mut() else {
            return Ok(());
        };
        let victim = pager.policy.select_victim(hal, &self.table, &pager.meta)?;
        let vaddr = victim.start_addr();
        let slot = self.table.walk(hal, vaddr, false)?.ok_or_else(|| {
            FatalError::new(FatalKind::ResidentNotMapped, "page_out", Some(vaddr.as_usize()))
        })?;
        let pte = slot.read(hal);
        if !pte.is_leaf() {
            return Err(FatalError::new(
                FatalKind::ResidentNotMapped,
                "page_out",
                Some(vaddr.as_usize()),
            ));
        }

        let offset = Self::free_swap_offset(&pager.meta, pager.config.max_tracked_pages)
            .ok_or_else(|| FatalError::new(FatalKind::SwapSpaceExhausted, "page_out", None))?;
        let mut buf = [0u8; PAGE_SIZE];
        hal.read_frame(pte.ppn(), 0, &mut buf);
        let written = store.write_at(offset, &buf).map_err(|_| {
            FatalError::new(FatalKind::BackingStoreIo, "page_out", Some(vaddr.as_usize()))
        })?;
        if written != PAGE_SIZE {
            return Err(FatalError::new(
                FatalKind::BackingStoreIo,
                "page_out",
                Some(vaddr.as_usize()),
            ));
        }

        hal.free_frame(pte.ppn());
        let flags = (pte.flags() - PteFlags::VALID - PteFlags::ACCESSED) | PteFlags::SWAPPED;
        slot.write(hal, Pte::new(Ppn::from_usize(0), flags));
        hal.flush_translation(vaddr);

        let index = victim.as_usize();
        pager.meta[index].resident = false;
        pager.meta[index].swap_offset = Some(offset);
        pager.resident -= 1;
        log::debug!("page_out: vpn={} -> offset={:#x}", index, offset);
        Ok(())
    }

    /// 首次适配：返回第一个未被任何页占用的页对齐交换偏移。
    ///
    /// 扫描上界取可跟踪页数而非当前逻辑大小：已换出的页数恒小于
    /// 已入驻过的页数，故 `[0, size)` 内必有空闲槽位，从 0 起的
    /// 首次适配在两种上界下选中同一偏移。
    fn free_swap_offset(meta: &[PageMeta], max_tracked_pages: usize) -> Option<usize> {
        (0..max_tracked_pages)
            .map(|slot| slot * PAGE_SIZE)
            .find(|&offset| !meta.iter().any(|m| m.swap_offset == Some(offset)))
    }

    /// 处理一次缺页：把被换出的页读回物理内存。
    ///
    /// 该页的交换槽位先被释放，容量压力下的淘汰可以立即复用它；
    /// 权限位在两条路径（有空位 / 先淘汰）下都完整恢复，
    /// 最后通知 HAL 失效对应的翻译缓存条目。
    ///
    /// # Errors
    /// - 地址不指向一个被换出的页：[`PagingError::NotMapped`]，
    ///   由派发方决定后续处置；
    /// - 缺页路径上的帧耗尽、交换读失败、槽位记录缺失：致命错误。
    pub fn handle_fault(
        &mut self,
        hal: &dyn MemoryHal,
        store: &dyn BackingStore,
        vaddr: Vaddr,
    ) -> PagingResult<()> {
        let vaddr = vaddr.align_down_to_page();
        let page = Vpn::from_addr_floor(vaddr).as_usize();
        let Some(pager) = self.pager.as_mut() else {
            return Err(PagingError::NotMapped);
        };
        if vaddr.as_usize() >= MAX_VA || page >= pager.config.max_tracked_pages {
            return Err(PagingError::NotMapped);
        }

        let slot = self.table.walk(hal, vaddr, false)?.ok_or(PagingError::NotMapped)?;
        let pte = slot.read(hal);
        if pte.is_valid() || !pte.is_swapped() {
            return Err(PagingError::NotMapped);
        }

        let offset = pager.meta[page].swap_offset.take().ok_or_else(|| {
            FatalError::new(FatalKind::MissingSwapSlot, "handle_fault", Some(vaddr.as_usize()))
        })?;
        let mut buf = [0u8; PAGE_SIZE];
        let read = store.read_at(offset, &mut buf).map_err(|_| {
            FatalError::new(FatalKind::BackingStoreIo, "handle_fault", Some(vaddr.as_usize()))
        })?;
        if read != PAGE_SIZE {
            return Err(FatalError::new(
                FatalKind::BackingStoreIo,
                "handle_fault",
                Some(vaddr.as_usize()),
            ));
        }

        if pager.resident >= pager.config.resident_capacity {
            self.page_out(hal, store)?;
        }

        let frame = hal.alloc_frame().ok_or_else(|| {
            FatalError::new(FatalKind::NoFrameInFault, "handle_fault", Some(vaddr.as_usize()))
        })?;
        hal.write_frame(frame, 0, &buf);
        let flags = (pte.flags() - PteFlags::SWAPPED) | PteFlags::VALID;
        slot.write(hal, Pte::new(frame, flags));
        self.admit(Vpn::from_usize(page));
        hal.flush_translation(vaddr);
        log::debug!("swap_in: vpn={} <- offset={:#x}", page, offset);
        Ok(())
    }

    /// 时钟滴答：对驻留页做一次老化更新（FIFO 下为空操作）。
    pub fn tick(&mut self, hal: &dyn MemoryHal) -> PagingResult<()> {
        let Some(pager) = self.pager.as_mut() else {
            return Ok(());
        };
        pager.policy.on_tick(hal, &self.table, &mut pager.meta)
    }

    /// 深拷贝整个地址空间。
    ///
    /// 只复制当前有效映射的页；已换出的页不在子空间中物化。
    /// 子空间继承容量参数与策略种类，元数据按复制到的页重建。
    /// 全有或全无：失败时不留下任何子空间残余。
    pub fn duplicate(&self, hal: &dyn MemoryHal) -> PagingResult<AddressSpace> {
        let child_table = self.table.duplicate(hal, self.size)?;
        let mut child = AddressSpace {
            table: child_table,
            size: self.size,
            pager: None,
        };

        if let Some(pager) = &self.pager {
            let mut child_pager = Pager::new(pager.config, pager.policy.kind());
            let range =
                VpnRange::from_start_len(Vpn::from_usize(0), self.size.div_ceil(PAGE_SIZE));
            for vpn in range {
                let Some(slot) = child.table.walk(hal, vpn.start_addr(), false)? else {
                    continue;
                };
                if !slot.read(hal).is_valid() {
                    continue;
                }
                child_pager.meta[vpn.as_usize()].resident = true;
                child_pager.policy.on_admit(vpn, &mut child_pager.meta);
                child_pager.resident += 1;
            }
            child.pager = Some(child_pager);
        }
        Ok(child)
    }

    /// 释放地址空间：解除全部叶子映射并递归释放页表本身。
    /// 交换存储中的内容随元数据一并丢弃。
    pub fn free(self, hal: &dyn MemoryHal) -> PagingResult<()> {
        self.table.free(hal, self.size)
    }

    /// 只读翻译：见 [`PageTable::translate`]。已换出的页视为未映射。
    pub fn translate(&self, hal: &dyn MemoryHal, vaddr: Vaddr) -> Option<Paddr> {
        self.table.translate(hal, vaddr)
    }

    /// 向本空间的用户地址写入数据：见 [`uaccess::copy_to_user`]。
    pub fn copy_to_user(
        &self,
        hal: &dyn MemoryHal,
        dst: Vaddr,
        src: &[u8],
    ) -> PagingResult<()> {
        uaccess::copy_to_user(hal, &self.table, dst, src)
    }

    /// 从本空间的用户地址读出数据：见 [`uaccess::copy_from_user`]。
    pub fn copy_from_user(
        &self,
        hal: &dyn MemoryHal,
        dst: &mut [u8],
        src: Vaddr,
    ) -> PagingResult<()> {
        uaccess::copy_from_user(hal, &self.table, dst, src)
    }

    /// 从本空间复制 NUL 结尾字符串：见 [`uaccess::copy_str_from_user`]。
    pub fn copy_str_from_user(
        &self,
        hal: &dyn MemoryHal,
        dst: &mut [u8],
        src: Vaddr,
    ) -> PagingResult<usize> {
        uaccess::copy_str_from_user(hal, &self.table, dst, src)
    }

    /// 页入驻的簿记：标记驻留、调用策略钩子、驻留计数加一。
    fn admit(&mut self, vpn: Vpn) {
        if let Some(pager) = self.pager.as_mut() {
            let index = vpn.as_usize();
            pager.meta[index].resident = true;
            pager.policy.on_admit(vpn, &mut pager.meta);
            pager.resident += 1;
        }
    }
}
