//! 地址抽象模块
//!
//! 此模块提供物理/虚拟地址与页码的强类型封装：
//!
//! - [`types`]：地址 newtype ([`Paddr`]、[`Vaddr`]) 与 [`Address`] Trait
//! - [`page_num`]：页码 newtype ([`Ppn`]、[`Vpn`])、[`PageNum`] Trait
//!   与页码范围 [`PageNumRange`]
//! - [`operations`]：转换、算术与对齐操作 Trait

pub mod operations;
pub mod page_num;
pub mod types;

pub use operations::{AlignOps, CalcOps, UsizeConvert};
pub use page_num::{PageNum, PageNumRange, PageNumRangeIterator, Ppn, Vpn, VpnRange};
pub use types::{Address, Paddr, Vaddr};
