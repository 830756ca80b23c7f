//! 虚拟内存子系统
//!
//! 提供地址抽象、三级页表、按需换页和用户空间复制功能。
//!
//! # 机器解耦
//!
//! 通过 trait 抽象与宿主内核解耦：
//! - [`MemoryHal`]: 物理帧服务与翻译缓存失效
//! - [`BackingStore`]: 每进程交换存储的最小读写接口
//!
//! 两者都作为参数显式传入每个操作，不存在全局注册的环境状态；
//! [`frame_allocator`] 与 [`backing_store`] 提供可在宿主上运行的
//! 参考实现，供测试与集成使用。
//!
//! # 换页
//!
//! 支持换页的 [`AddressSpace`] 在创建时选定替换策略
//! （NFU 近似 / LAPA / 第二次机会 FIFO）与容量参数；驻留集
//! 超限时淘汰一页到交换存储，缺页时由 [`AddressSpace::handle_fault`]
//! 读回。不可恢复的不变量破坏以 [`FatalError`] 上抛，最终交给
//! [`die`]。

#![no_std]

extern crate alloc;

pub mod address;
pub mod address_space;
pub mod backing_store;
pub mod config;
pub mod frame_allocator;
pub mod hal;
pub mod page_table;
pub mod resident;
pub mod uaccess;

pub use backing_store::{BackingStore, HeapBackingStore, StoreError};
pub use config::{PagerConfig, MAX_VA, PAGE_SIZE};
pub use hal::MemoryHal;

// Re-export 常用类型
pub use address::{AlignOps, PageNum, Paddr, Ppn, UsizeConvert, Vaddr, Vpn, VpnRange};
pub use address_space::{AddressSpace, Pager};
pub use frame_allocator::{SimMemory, SimMemoryHal};
pub use page_table::{
    die, FatalError, FatalKind, PageDisposition, PageTable, PagingError, PagingResult, Pte,
    PteFlags, PteSlot,
};
pub use resident::{PageMeta, PolicyKind, ReplacementPolicy, ResidentQueue};
