//! 机器能力抽象 (HAL)
//!
//! 页表与换页逻辑不直接触碰物理内存，而是通过 [`MemoryHal`] Trait 使用
//! 宿主内核提供的帧服务与翻译缓存失效原语。所有操作接收 `&self`，
//! 实现方自行保证并发安全（参见 `frame_allocator` 中的参考实现）。

use crate::address::{Ppn, Vaddr};

/// [MemoryHal] Trait
/// ---------------------
/// 虚拟内存子系统消费的机器能力：物理帧的分配 / 释放 / 读写，
/// 以及翻译缓存 (TLB) 的失效通知。
///
/// 约定：
/// - `alloc_frame` 返回的帧内容必须已清零；
/// - `free_frame` 只接受本 HAL 分配且尚未释放的帧；
/// - 帧内容的读写以 `(帧号, 页内偏移)` 寻址，不得越过页边界。
pub trait MemoryHal {
    /// 分配一个清零的物理帧，耗尽时返回 `None`。
    fn alloc_frame(&self) -> Option<Ppn>;

    /// 释放一个物理帧。
    fn free_frame(&self, ppn: Ppn);

    /// 从帧内偏移 `offset` 处读取 `buf.len()` 字节。
    fn read_frame(&self, ppn: Ppn, offset: usize, buf: &mut [u8]);

    /// 向帧内偏移 `offset` 处写入 `data`。
    fn write_frame(&self, ppn: Ppn, offset: usize, data: &[u8]);

    /// 将整个源帧的内容复制到目标帧。
    fn copy_frame(&self, src: Ppn, dst: Ppn) {
        let mut buf = [0u8; crate::config::PAGE_SIZE];
        self.read_frame(src, 0, &mut buf);
        self.write_frame(dst, 0, &buf);
    }

    /// 使给定虚拟地址的翻译缓存条目失效。
    ///
    /// 页表在撤销或降级一个映射后调用；宿主可按地址精确失效，
    /// 也可整体刷新。
    fn flush_translation(&self, vaddr: Vaddr);

    /// 当前已分配且未释放的帧数，用于泄漏断言。
    fn frames_outstanding(&self) -> usize;

    /// 读取帧内 `index` 槽位处的 u64 (小端)。页表条目以此格式存放。
    fn read_u64(&self, ppn: Ppn, index: usize) -> u64 {
        let mut buf = [0u8; 8];
        self.read_frame(ppn, index * 8, &mut buf);
        u64::from_le_bytes(buf)
    }

    /// 写入帧内 `index` 槽位处的 u64 (小端)。
    fn write_u64(&self, ppn: Ppn, index: usize, value: u64) {
        self.write_frame(ppn, index * 8, &value.to_le_bytes());
    }
}
