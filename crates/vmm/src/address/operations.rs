//! 地址与页码的基础操作 Trait
//!
//! 此模块提供三类操作抽象：
//!
//! - [`UsizeConvert`]：类型与 usize 之间的互相转换
//! - [`CalcOps`]：算术运算（由 `impl_calc_ops!` 宏自动实现）
//! - [`AlignOps`]：地址对齐操作
//!
//! 所有地址和页码 newtype 都通过这些 Trait 获得统一的操作接口，
//! 避免在各处手写位运算。

use crate::config::PAGE_SIZE;

/// 与 usize 互相转换的 Trait。
///
/// 所有地址和页码类型都是 usize 的 newtype 封装，必须实现此 Trait。
pub trait UsizeConvert {
    /// 取出内部的 usize 值。
    fn as_usize(&self) -> usize;

    /// 从 usize 值构造。
    fn from_usize(value: usize) -> Self;
}

/// 算术运算 Trait。
///
/// 为地址/页码类型提供与 usize 的加减运算，由 `impl_calc_ops!` 自动实现。
pub trait CalcOps:
    UsizeConvert
    + core::ops::Add<usize, Output = Self>
    + core::ops::Sub<usize, Output = Self>
    + Sized
{
}

/// `impl_calc_ops!` 宏
/// ---------------------
/// 为给定的 newtype 实现 `Add<usize>`、`Sub<usize>` 和 [`CalcOps`]。
#[macro_export]
macro_rules! impl_calc_ops {
    ($type:ty) => {
        impl core::ops::Add<usize> for $type {
            type Output = Self;
            fn add(self, rhs: usize) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl core::ops::Sub<usize> for $type {
            type Output = Self;
            fn sub(self, rhs: usize) -> Self {
                Self(self.0 - rhs)
            }
        }

        impl $crate::address::operations::CalcOps for $type {}
    };
}

/// 地址对齐操作 Trait。
///
/// 默认实现基于 [`UsizeConvert`]，对齐值必须是 2 的幂。
pub trait AlignOps: UsizeConvert + Sized {
    /// 向下对齐到给定边界。
    fn align_down(&self, align: usize) -> Self {
        debug_assert!(align.is_power_of_two());
        Self::from_usize(self.as_usize() & !(align - 1))
    }

    /// 向上对齐到给定边界。
    fn align_up(&self, align: usize) -> Self {
        debug_assert!(align.is_power_of_two());
        Self::from_usize((self.as_usize() + align - 1) & !(align - 1))
    }

    /// 向下对齐到页边界。
    fn align_down_to_page(&self) -> Self {
        self.align_down(PAGE_SIZE)
    }

    /// 向上对齐到页边界。
    fn align_up_to_page(&self) -> Self {
        self.align_up(PAGE_SIZE)
    }

    /// 是否按页对齐。
    fn is_page_aligned(&self) -> bool {
        self.as_usize() % PAGE_SIZE == 0
    }

    /// 页内偏移。
    fn page_offset(&self) -> usize {
        self.as_usize() % PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use crate::address::{AlignOps, UsizeConvert, Vaddr};

    #[test]
    fn test_align_ops() {
        let a = Vaddr::from_usize(4097);
        assert_eq!(a.align_down_to_page().as_usize(), 4096);
        assert_eq!(a.align_up_to_page().as_usize(), 8192);
        assert!(!a.is_page_aligned());
        assert_eq!(a.page_offset(), 1);

        let b = Vaddr::from_usize(8192);
        assert_eq!(b.align_up_to_page().as_usize(), 8192);
        assert!(b.is_page_aligned());
    }
}
