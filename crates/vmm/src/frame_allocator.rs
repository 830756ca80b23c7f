//! 模拟帧服务模块
//!
//! 本模块提供 [`MemoryHal`] 的参考实现，供单元测试与宿主端集成使用。
//!
//! ## 分配策略（位图）
//!
//! [`SimMemory`] 使用位图（bitmap）跟踪每个物理帧的分配状态：
//!
//! - **bitmap**：每个 bit 表示一个物理帧（0=空闲，1=已分配）
//! - **last_alloc_hint**：上次分配位置提示，利用局部性加速查找
//!
//! 分配流程：从 last_alloc_hint 开始循环查找第一个空闲位，
//! 利用 u64 的 `trailing_zeros` 快速跳过全满字。释放时直接清除对应
//! bit，O(1) 操作。
//!
//! 帧内容保存在一段连续的堆存储中，按 `帧号 * PAGE_SIZE` 索引；
//! 分配出的帧内容已清零。
//!
//! [`SimMemoryHal`] 将 [`SimMemory`] 包入自旋锁并实现 [`MemoryHal`]，
//! 使所有帧操作都可通过 `&self` 并发调用。

use crate::address::{Ppn, UsizeConvert, Vaddr};
use crate::config::PAGE_SIZE;
use crate::hal::MemoryHal;
use alloc::vec::Vec;
use spin::Mutex;

/// 模拟物理内存。
/// 采用位图策略跟踪每个物理帧的分配状态，并持有帧内容的字节存储。
pub struct SimMemory {
    /// 位图数据（每个 bit 表示一个帧：0=空闲，1=已分配）。
    /// 使用 Vec<u64> 存储，利用 64 位操作优化查找。
    bitmap: Vec<u64>,
    /// 帧内容，按 `帧号 * PAGE_SIZE` 索引。
    storage: Vec<u8>,
    /// 总帧数。
    total_frames: usize,
    /// 已分配帧数（用于快速统计）。
    allocated_count: usize,
    /// 上次分配的位置提示（用于加速单帧分配）。
    last_alloc_hint: usize,
}

impl SimMemory {
    /// 创建持有 `total_frames` 个物理帧的模拟内存。
    pub fn new(total_frames: usize) -> Self {
        let bitmap_u64_count = total_frames.div_ceil(64);
        SimMemory {
            bitmap: alloc::vec![0u64; bitmap_u64_count],
            storage: alloc::vec![0u8; total_frames * PAGE_SIZE],
            total_frames,
            allocated_count: 0,
            last_alloc_hint: 0,
        }
    }

    /// 检查帧是否空闲
    #[inline]
    fn is_free(&self, frame_idx: usize) -> bool {
        let word_idx = frame_idx / 64;
        let bit_idx = frame_idx % 64;
        (self.bitmap[word_idx] & (1u64 << bit_idx)) == 0
    }

    /// 标记帧为已分配
    #[inline]
    fn mark_allocated(&mut self, frame_idx: usize) {
        let word_idx = frame_idx / 64;
        let bit_idx = frame_idx % 64;
        self.bitmap[word_idx] |= 1u64 << bit_idx;
    }

    /// 标记帧为空闲
    #[inline]
    fn mark_free(&mut self, frame_idx: usize) {
        let word_idx = frame_idx / 64;
        let bit_idx = frame_idx % 64;
        self.bitmap[word_idx] &= !(1u64 << bit_idx);
    }

    /// 分配一个物理帧并清零其内容。
    /// 从 last_alloc_hint 开始循环查找第一个空闲位。
    pub fn alloc_frame(&mut self) -> Option<Ppn> {
        let bitmap_len = self.bitmap.len();
        if bitmap_len == 0 {
            return None;
        }

        // 从上次分配位置开始查找（局部性优化）
        let start_idx = self.last_alloc_hint;

        // 循环查找：[hint, end) + [0, hint)
        for offset in 0..bitmap_len {
            let idx = (start_idx + offset) % bitmap_len;
            let word = self.bitmap[idx];

            // 快速跳过全满的 u64
            if word == u64::MAX {
                continue;
            }

            // 找到第一个空闲位（trailing_zeros 找最低位的 0）
            let bit_pos = (!word).trailing_zeros() as usize;
            if bit_pos < 64 {
                let frame_idx = idx * 64 + bit_pos;

                if frame_idx >= self.total_frames {
                    continue;
                }

                self.mark_allocated(frame_idx);
                self.allocated_count += 1;
                self.last_alloc_hint = idx;

                self.storage[frame_idx * PAGE_SIZE..(frame_idx + 1) * PAGE_SIZE].fill(0);
                return Some(Ppn::from_usize(frame_idx));
            }
        }

        None // 内存耗尽
    }

    /// 回收一个物理帧。
    pub fn dealloc_frame(&mut self, ppn: Ppn) {
        let frame_idx = ppn.as_usize();
        debug_assert!(
            frame_idx < self.total_frames,
            "dealloc_frame: frame out of range" // 回收帧超出范围
        );
        debug_assert!(
            !self.is_free(frame_idx),
            "dealloc_frame: double free detected" // 检测到重复释放
        );

        self.mark_free(frame_idx);
        self.allocated_count -= 1;
    }

    /// 帧内容的只读切片。
    fn frame(&self, ppn: Ppn) -> &[u8] {
        let base = ppn.as_usize() * PAGE_SIZE;
        &self.storage[base..base + PAGE_SIZE]
    }

    /// 帧内容的可写切片。
    fn frame_mut(&mut self, ppn: Ppn) -> &mut [u8] {
        let base = ppn.as_usize() * PAGE_SIZE;
        &mut self.storage[base..base + PAGE_SIZE]
    }

    /// 获取总的物理帧数
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// 获取已分配的帧数
    pub fn allocated_frames(&self) -> usize {
        self.allocated_count
    }

    /// 获取空闲的帧数
    pub fn free_frames(&self) -> usize {
        self.total_frames - self.allocated_count
    }
}

/// [SimMemoryHal]
/// ---------------------
/// 将 [`SimMemory`] 包入自旋锁的 [`MemoryHal`] 实现。
///
/// 翻译缓存在模拟环境中不存在，`flush_translation` 仅计数，
/// 供测试断言换入路径确实发出了失效通知。
pub struct SimMemoryHal {
    memory: Mutex<SimMemory>,
    flush_count: Mutex<usize>,
}

impl SimMemoryHal {
    /// 创建持有 `total_frames` 个帧的模拟 HAL。
    pub fn new(total_frames: usize) -> Self {
        Self {
            memory: Mutex::new(SimMemory::new(total_frames)),
            flush_count: Mutex::new(0),
        }
    }

    /// 已发出的翻译缓存失效次数。
    pub fn flushes(&self) -> usize {
        *self.flush_count.lock()
    }

    /// 空闲帧数。
    pub fn free_frames(&self) -> usize {
        self.memory.lock().free_frames()
    }
}

impl MemoryHal for SimMemoryHal {
    fn alloc_frame(&self) -> Option<Ppn> {
        self.memory.lock().alloc_frame()
    }

    fn free_frame(&self, ppn: Ppn) {
        self.memory.lock().dealloc_frame(ppn);
    }

    fn read_frame(&self, ppn: Ppn, offset: usize, buf: &mut [u8]) {
        debug_assert!(offset + buf.len() <= PAGE_SIZE);
        let memory = self.memory.lock();
        buf.copy_from_slice(&memory.frame(ppn)[offset..offset + buf.len()]);
    }

    fn write_frame(&self, ppn: Ppn, offset: usize, data: &[u8]) {
        debug_assert!(offset + data.len() <= PAGE_SIZE);
        let mut memory = self.memory.lock();
        memory.frame_mut(ppn)[offset..offset + data.len()].copy_from_slice(data);
    }

    fn flush_translation(&self, _vaddr: Vaddr) {
        *self.flush_count.lock() += 1;
    }

    fn frames_outstanding(&self) -> usize {
        self.memory.lock().allocated_frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_exhaust_and_reuse() {
        let mut memory = SimMemory::new(4);
        let mut frames = Vec::new();
        for _ in 0..4 {
            frames.push(memory.alloc_frame().unwrap());
        }
        assert!(memory.alloc_frame().is_none());
        assert_eq!(memory.allocated_frames(), 4);

        memory.dealloc_frame(frames[1]);
        let again = memory.alloc_frame().unwrap();
        assert_eq!(again, frames[1]);
        assert_eq!(memory.allocated_frames(), 4);
    }

    #[test]
    fn test_frame_zeroed_on_alloc() {
        let mut memory = SimMemory::new(2);
        let ppn = memory.alloc_frame().unwrap();
        memory.frame_mut(ppn).fill(0xAB);
        memory.dealloc_frame(ppn);

        let ppn = memory.alloc_frame().unwrap();
        assert!(memory.frame(ppn).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_hal_read_write() {
        let hal = SimMemoryHal::new(2);
        let ppn = hal.alloc_frame().unwrap();
        hal.write_frame(ppn, 100, b"hello");
        let mut buf = [0u8; 5];
        hal.read_frame(ppn, 100, &mut buf);
        assert_eq!(&buf, b"hello");

        hal.write_u64(ppn, 3, 0xDEAD_BEEF);
        assert_eq!(hal.read_u64(ppn, 3), 0xDEAD_BEEF);

        hal.free_frame(ppn);
        assert_eq!(hal.frames_outstanding(), 0);
    }
}
