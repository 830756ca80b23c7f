//! 驻留集元数据与页替换策略
//!
//! 每个支持换页的地址空间按页号记录一份 [`PageMeta`]；策略引擎
//! [`ReplacementPolicy`] 在页入驻、时钟滴答和容量不足时被调用，
//! 三种策略作为同一枚举的变体在地址空间创建时选定：
//!
//! - **NotFrequentlyUsed**：老化计数器近似 NFU，入驻初值 0，
//!   受害者取计数器最小者（并列取页号较小者）；
//! - **LeastActivePage**：入驻初值全 1，受害者取计数器中置位
//!   最少者（并列比较数值，再比较页号）；
//! - **SecondChanceFifo**：驻留页构成循环队列，从队头扫描，
//!   访问位为 1 的页清位后移到队尾获得第二次机会，第一个
//!   访问位为 0 的页被淘汰。
//!
//! 老化更新：计数器右移一位；若硬件访问位为 1，则最高位置 1
//! 并清除访问位。仅对当前有效映射的驻留页进行。

use crate::address::{PageNum, UsizeConvert, Vpn};
use crate::hal::MemoryHal;
use crate::page_table::{
    FatalError, FatalKind, PageTable, PagingResult, Pte, PteFlags,
};
use alloc::vec::Vec;

/// 单页的换页元数据。
#[derive(Debug, Clone, Copy, Default)]
pub struct PageMeta {
    /// 页当前是否驻留物理内存
    pub resident: bool,
    /// 页被换出时在交换存储中的偏移
    pub swap_offset: Option<usize>,
    /// 老化计数器（仅计数器类策略使用）
    pub age: u32,
}

/// [ResidentQueue]
/// ---------------------
/// 有界循环队列，记录驻留页的先进先出顺序（仅 FIFO 策略持有）。
///
/// "按值移除"通过整体倒出再重插实现，幸存者的相对顺序不变。
pub struct ResidentQueue {
    slots: Vec<Vpn>,
    head: usize,
    count: usize,
}

impl ResidentQueue {
    /// 创建容量为 `capacity` 的空队列。
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: alloc::vec![Vpn(0); capacity],
            head: 0,
            count: 0,
        }
    }

    /// 队列中的页数。
    pub fn len(&self) -> usize {
        self.count
    }

    /// 队列是否为空。
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 在队尾追加一页。
    pub fn push(&mut self, vpn: Vpn) {
        debug_assert!(self.count < self.slots.len());
        let capacity = self.slots.len();
        self.slots[(self.head + self.count) % capacity] = vpn;
        self.count += 1;
    }

    /// 弹出队头的页。
    pub fn pop(&mut self) -> Option<Vpn> {
        if self.count == 0 {
            return None;
        }
        let vpn = self.slots[self.head];
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        Some(vpn)
    }

    /// 按值移除一页：倒出全部元素，跳过首个匹配后重插。
    /// 返回是否确有移除。
    pub fn remove(&mut self, vpn: Vpn) -> bool {
        let mut drained = Vec::with_capacity(self.count);
        while let Some(v) = self.pop() {
            drained.push(v);
        }
        let mut removed = false;
        for v in drained {
            if !removed && v == vpn {
                removed = true;
                continue;
            }
            self.push(v);
        }
        removed
    }

    /// 自队头向队尾迭代。
    pub fn iter(&self) -> impl Iterator<Item = Vpn> + '_ {
        (0..self.count).map(move |i| self.slots[(self.head + i) % self.slots.len()])
    }
}

/// 替换策略的种类选择器。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// 老化计数器近似 NFU
    NotFrequentlyUsed,
    /// 最少置位数优先
    LeastActivePage,
    /// 第二次机会 FIFO
    SecondChanceFifo,
}

/// [ReplacementPolicy]
/// ---------------------
/// 页替换策略引擎。FIFO 的队列状态内嵌在对应变体中。
pub enum ReplacementPolicy {
    /// 老化计数器近似 NFU
    NotFrequentlyUsed,
    /// 最少置位数优先
    LeastActivePage,
    /// 第二次机会 FIFO，携带驻留队列
    SecondChanceFifo(ResidentQueue),
}

impl ReplacementPolicy {
    /// 按种类构造策略；`capacity` 只约束 FIFO 队列的大小。
    pub fn new(kind: PolicyKind, capacity: usize) -> Self {
        match kind {
            PolicyKind::NotFrequentlyUsed => Self::NotFrequentlyUsed,
            PolicyKind::LeastActivePage => Self::LeastActivePage,
            PolicyKind::SecondChanceFifo => Self::SecondChanceFifo(ResidentQueue::new(capacity)),
        }
    }

    /// 策略的种类。
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::NotFrequentlyUsed => PolicyKind::NotFrequentlyUsed,
            Self::LeastActivePage => PolicyKind::LeastActivePage,
            Self::SecondChanceFifo(_) => PolicyKind::SecondChanceFifo,
        }
    }

    /// FIFO 驻留队列（其他策略返回 `None`）。
    pub fn queue(&self) -> Option<&ResidentQueue> {
        match self {
            Self::SecondChanceFifo(queue) => Some(queue),
            _ => None,
        }
    }

    /// 页入驻钩子：初始化其老化计数器或入队。
    pub fn on_admit(&mut self, vpn: Vpn, meta: &mut [PageMeta]) {
        match self {
            Self::NotFrequentlyUsed => meta[vpn.as_usize()].age = 0,
            Self::LeastActivePage => meta[vpn.as_usize()].age = u32::MAX,
            Self::SecondChanceFifo(queue) => queue.push(vpn),
        }
    }

    /// 页被解除映射钩子：FIFO 需要从队列中剔除。
    pub fn on_unmap(&mut self, vpn: Vpn) {
        if let Self::SecondChanceFifo(queue) = self {
            queue.remove(vpn);
        }
    }

    /// 时钟滴答钩子：对每个当前有效映射的驻留页做一次老化更新。
    /// FIFO 下是空操作。
    pub fn on_tick(
        &mut self,
        hal: &dyn MemoryHal,
        table: &PageTable,
        meta: &mut [PageMeta],
    ) -> PagingResult<()> {
        if matches!(self, Self::SecondChanceFifo(_)) {
            return Ok(());
        }
        for (index, entry) in meta.iter_mut().enumerate() {
            if !entry.resident {
                continue;
            }
            let vaddr = Vpn::from_usize(index).start_addr();
            let Some(slot) = table.walk(hal, vaddr, false)? else {
                continue;
            };
            let pte = slot.read(hal);
            if !pte.is_valid() {
                continue;
            }
            entry.age >>= 1;
            if pte.flags().contains(PteFlags::ACCESSED) {
                entry.age |= 1 << 31;
                slot.write(hal, Pte::new(pte.ppn(), pte.flags() - PteFlags::ACCESSED));
            }
        }
        Ok(())
    }

    /// 选出一个受害者页。调用方保证驻留集非空。
    pub fn select_victim(
        &mut self,
        hal: &dyn MemoryHal,
        table: &PageTable,
        meta: &[PageMeta],
    ) -> PagingResult<Vpn> {
        match self {
            Self::NotFrequentlyUsed => {
                let mut best: Option<(u32, usize)> = None;
                for (index, entry) in meta.iter().enumerate() {
                    if !entry.resident {
                        continue;
                    }
                    // 严格小于：并列时保留页号较小者
                    if best.is_none_or(|(age, _)| entry.age < age) {
                        best = Some((entry.age, index));
                    }
                }
                let (_, index) = best.ok_or_else(Self::no_resident_page)?;
                Ok(Vpn::from_usize(index))
            }
            Self::LeastActivePage => {
                let mut best: Option<(u32, u32, usize)> = None;
                for (index, entry) in meta.iter().enumerate() {
                    if !entry.resident {
                        continue;
                    }
                    let key = (entry.age.count_ones(), entry.age);
                    if best.is_none_or(|(ones, age, _)| key < (ones, age)) {
                        best = Some((key.0, key.1, index));
                    }
                }
                let (_, _, index) = best.ok_or_else(Self::no_resident_page)?;
                Ok(Vpn::from_usize(index))
            }
            Self::SecondChanceFifo(queue) => loop {
                let vpn = queue.pop().ok_or_else(Self::no_resident_page)?;
                let slot = table
                    .walk(hal, vpn.start_addr(), false)?
                    .ok_or_else(Self::no_resident_page)?;
                let pte = slot.read(hal);
                if !pte.is_valid() {
                    return Err(Self::no_resident_page());
                }
                if pte.flags().contains(PteFlags::ACCESSED) {
                    // 第二次机会：清访问位，移到队尾
                    slot.write(hal, Pte::new(pte.ppn(), pte.flags() - PteFlags::ACCESSED));
                    queue.push(vpn);
                    continue;
                }
                return Ok(vpn);
            },
        }
    }

    /// 驻留记录与页表不一致时的致命错误。
    fn no_resident_page() -> crate::page_table::PagingError {
        FatalError::new(FatalKind::ResidentNotMapped, "select_victim", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Vaddr;
    use crate::config::PAGE_SIZE;
    use crate::frame_allocator::SimMemoryHal;

    #[test]
    fn test_queue_order_and_remove() {
        let mut queue = ResidentQueue::new(4);
        for page in [0usize, 1, 2, 3] {
            queue.push(Vpn(page));
        }
        assert!(queue.remove(Vpn(1)));
        assert!(!queue.remove(Vpn(9)));
        let order: Vec<usize> = queue.iter().map(|v| v.as_usize()).collect();
        assert_eq!(order, [0, 2, 3]);

        assert_eq!(queue.pop(), Some(Vpn(0)));
        queue.push(Vpn(4));
        queue.push(Vpn(5));
        let order: Vec<usize> = queue.iter().map(|v| v.as_usize()).collect();
        assert_eq!(order, [2, 3, 4, 5]);
    }

    /// 映射 `pages` 个页并将它们全部登记为驻留。
    fn resident_fixture(
        hal: &SimMemoryHal,
        pages: usize,
    ) -> (PageTable, Vec<PageMeta>) {
        let mut table = PageTable::new(hal).unwrap();
        let mut meta = alloc::vec![PageMeta::default(); pages];
        for (page, entry) in meta.iter_mut().enumerate() {
            let frame = hal.alloc_frame().unwrap();
            table
                .map_page(hal, Vaddr(page * PAGE_SIZE), frame, PteFlags::user_rw())
                .unwrap();
            entry.resident = true;
        }
        (table, meta)
    }

    fn set_accessed(hal: &SimMemoryHal, table: &PageTable, page: usize) {
        let slot = table
            .walk(hal, Vaddr(page * PAGE_SIZE), false)
            .unwrap()
            .unwrap();
        let pte = slot.read(hal);
        slot.write(hal, Pte::new(pte.ppn(), pte.flags() | PteFlags::ACCESSED));
    }

    #[test]
    fn test_aging_update() {
        let hal = SimMemoryHal::new(16);
        let (table, mut meta) = resident_fixture(&hal, 2);
        meta[0].age = 0b100;
        meta[1].age = 0b100;
        set_accessed(&hal, &table, 1);

        let mut policy = ReplacementPolicy::new(PolicyKind::NotFrequentlyUsed, 16);
        policy.on_tick(&hal, &table, &mut meta).unwrap();

        assert_eq!(meta[0].age, 0b10);
        assert_eq!(meta[1].age, (1 << 31) | 0b10);
        // 访问位已清除，下一轮不再计入
        policy.on_tick(&hal, &table, &mut meta).unwrap();
        assert_eq!(meta[1].age, 1 << 30 | 0b1);
    }

    #[test]
    fn test_nfu_tie_breaks_to_lower_index() {
        let hal = SimMemoryHal::new(16);
        let (table, mut meta) = resident_fixture(&hal, 3);
        meta[0].age = 7;
        meta[1].age = 3;
        meta[2].age = 3;

        let mut policy = ReplacementPolicy::new(PolicyKind::NotFrequentlyUsed, 16);
        let victim = policy.select_victim(&hal, &table, &meta).unwrap();
        assert_eq!(victim, Vpn(1));
    }

    #[test]
    fn test_lapa_prefers_fewer_set_bits() {
        let hal = SimMemoryHal::new(16);
        let (table, mut meta) = resident_fixture(&hal, 2);
        // 页 0 数值小但置位多；页 1 数值大但只有一个置位
        meta[0].age = 0b0111;
        meta[1].age = 1 << 31;

        let mut policy = ReplacementPolicy::new(PolicyKind::LeastActivePage, 16);
        let victim = policy.select_victim(&hal, &table, &meta).unwrap();
        assert_eq!(victim, Vpn(1));
    }

    #[test]
    fn test_scfifo_second_chance() {
        let hal = SimMemoryHal::new(16);
        let (table, meta) = resident_fixture(&hal, 3);
        let mut policy = ReplacementPolicy::new(PolicyKind::SecondChanceFifo, 3);
        for page in 0..3usize {
            // meta 由 fixture 置好，这里只入队
            if let ReplacementPolicy::SecondChanceFifo(queue) = &mut policy {
                queue.push(Vpn(page));
            }
        }
        // 队头被访问过：旋转后淘汰下一个
        set_accessed(&hal, &table, 0);
        let victim = policy.select_victim(&hal, &table, &meta).unwrap();
        assert_eq!(victim, Vpn(1));
        let order: Vec<usize> = policy.queue().unwrap().iter().map(|v| v.as_usize()).collect();
        assert_eq!(order, [2, 0]);
    }

    #[test]
    fn test_scfifo_all_accessed_falls_back_to_head() {
        let hal = SimMemoryHal::new(16);
        let (table, meta) = resident_fixture(&hal, 2);
        let mut policy = ReplacementPolicy::new(PolicyKind::SecondChanceFifo, 2);
        if let ReplacementPolicy::SecondChanceFifo(queue) = &mut policy {
            queue.push(Vpn(0));
            queue.push(Vpn(1));
        }
        set_accessed(&hal, &table, 0);
        set_accessed(&hal, &table, 1);
        // 全部旋转一轮后，原队头（访问位已清）被淘汰
        let victim = policy.select_victim(&hal, &table, &meta).unwrap();
        assert_eq!(victim, Vpn(0));
    }
}
