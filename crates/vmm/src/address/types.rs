//! 地址类型模块
//!
//! 此模块定义了物理地址 (Paddr) 和虚拟地址 (Vaddr) 两种 newtype，
//! 以及它们共同实现的 [`Address`] Trait。
//!
//! 两种地址在类型层面严格区分，避免在页表遍历和帧操作中混用。

use crate::address::operations::{AlignOps, CalcOps, UsizeConvert};

/// [Address] Trait
/// ---------------------
/// 表示一个地址的 Trait。所有地址类型 (如 Paddr 和 Vaddr) 必须实现此 Trait。
pub trait Address:
    CalcOps + AlignOps + UsizeConvert + Copy + Clone + PartialEq + PartialOrd + Eq + Ord
{
}

/// `impl_address!` 宏
/// ---------------------
/// 快速为给定类型实现 `UsizeConvert`、`AlignOps` 和 [`Address`] Trait。
#[macro_export]
macro_rules! impl_address {
    ($type:ty) => {
        impl $crate::address::operations::UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        $crate::impl_calc_ops!($type);

        impl $crate::address::operations::AlignOps for $type {}

        impl $crate::address::types::Address for $type {}
    };
}

/// [Paddr] (Physical Address)
/// ---------------------
/// 物理地址。
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Paddr(pub usize);
impl_address!(Paddr);

/// [Vaddr] (Virtual Address)
/// ---------------------
/// 虚拟地址。
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Vaddr(pub usize);
impl_address!(Vaddr);
