//! 页表模块
//!
//! 本模块提供与页表管理相关的功能，包括页表的创建、映射、解除映射、
//! 深拷贝、递归释放与翻译等操作，以及分页错误的两级划分。
mod entry;
mod table;

pub use entry::*;
pub use table::*;

/// 分页操作中可能发生的可恢复错误与致命错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    /// 帧（Frame）耗尽，增长或复制操作可回退后重试
    OutOfFrames,
    /// 虚拟地址未被映射
    NotMapped,
    /// 页号超出地址空间可跟踪的范围
    PageLimitExceeded,
    /// 用户字符串在允许长度内未出现终止符
    StringNotTerminated,
    /// 不变量被破坏，调用方不可恢复，必须交给 [`die`]
    Fatal(FatalError),
}

/// 致命错误的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// 虚拟地址超出 `MAX_VA`
    VaddrOutOfRange,
    /// 目标槽位已存在有效映射
    Remap,
    /// 期望叶子条目，却发现中间条目
    NotALeaf,
    /// 递归释放时发现尚未解除映射的叶子
    LeafInFreeWalk,
    /// 虚拟地址未按页对齐
    UnalignedVaddr,
    /// 被换出的页缺少交换槽位记录
    MissingSwapSlot,
    /// 驻留记录指向的页在页表中并非有效映射
    ResidentNotMapped,
    /// 交换存储读写失败或长度不符
    BackingStoreIo,
    /// 交换存储中找不到空闲槽位
    SwapSpaceExhausted,
    /// 缺页处理路径上帧耗尽
    NoFrameInFault,
    /// 首进程镜像超过一页
    OversizedFirstPage,
}

/// 携带上下文的致命错误。
///
/// 致命错误表示数据结构不变量已被破坏或关键路径上的资源假设失效，
/// 沿调用链通过 [`PagingError::Fatal`] 逐层上抛，最终由顶层调用 [`die`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalError {
    /// 错误分类
    pub kind: FatalKind,
    /// 检测到错误的操作名
    pub op: &'static str,
    /// 相关的虚拟地址（若有）
    pub vaddr: Option<usize>,
}

impl FatalError {
    /// 构造一个致命错误并包入 [`PagingError::Fatal`]。
    pub fn new(kind: FatalKind, op: &'static str, vaddr: Option<usize>) -> PagingError {
        PagingError::Fatal(FatalError { kind, op, vaddr })
    }
}

/// 致命错误的最终处理：记录诊断信息后中止。
///
/// 只在最外层调用（陷入处理器、进程生命周期入口）。
pub fn die(err: &FatalError) -> ! {
    match err.vaddr {
        Some(vaddr) => {
            log::error!("fatal paging error: {:?} in {} (va={:#x})", err.kind, err.op, vaddr)
        }
        None => log::error!("fatal paging error: {:?} in {}", err.kind, err.op),
    }
    panic!("unrecoverable paging error: {:?} in {}", err.kind, err.op);
}

/// 分页操作的结果类型
pub type PagingResult<T> = Result<T, PagingError>;
