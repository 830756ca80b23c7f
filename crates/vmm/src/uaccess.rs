//! 用户空间复制原语
//!
//! 内核与用户地址空间之间的数据搬运：按页分块，每块先通过
//! [`PageTable::translate`] 求出物理帧，再经 HAL 读写帧内容。
//! 遇到第一个未映射页立即停止，已复制的前缀保持原样。

use crate::address::{AlignOps, Ppn, UsizeConvert, Vaddr};
use crate::config::PAGE_SIZE;
use crate::hal::MemoryHal;
use crate::page_table::{PageTable, PagingError, PagingResult};

/// 求出 `vaddr` 所在页的物理帧与页内偏移。
fn resolve(
    hal: &dyn MemoryHal,
    table: &PageTable,
    vaddr: Vaddr,
) -> PagingResult<(Ppn, usize)> {
    let pa = table
        .translate(hal, vaddr.align_down_to_page())
        .ok_or(PagingError::NotMapped)?;
    Ok((
        Ppn::from_usize(pa.as_usize() / PAGE_SIZE),
        vaddr.page_offset(),
    ))
}

/// 将 `src` 复制到用户地址空间的 `dst` 处。
///
/// # Errors
/// 途中遇到未映射页返回 [`PagingError::NotMapped`]，
/// 该页之前的数据已写入。
pub fn copy_to_user(
    hal: &dyn MemoryHal,
    table: &PageTable,
    mut dst: Vaddr,
    src: &[u8],
) -> PagingResult<()> {
    let mut done = 0;
    while done < src.len() {
        let (ppn, offset) = resolve(hal, table, dst)?;
        let chunk = (PAGE_SIZE - offset).min(src.len() - done);
        hal.write_frame(ppn, offset, &src[done..done + chunk]);
        done += chunk;
        dst = dst + chunk;
    }
    Ok(())
}

/// 从用户地址空间的 `src` 处复制数据填满 `dst`。
///
/// # Errors
/// 途中遇到未映射页返回 [`PagingError::NotMapped`]，
/// 该页之前的数据已读入。
pub fn copy_from_user(
    hal: &dyn MemoryHal,
    table: &PageTable,
    dst: &mut [u8],
    mut src: Vaddr,
) -> PagingResult<()> {
    let mut done = 0;
    while done < dst.len() {
        let (ppn, offset) = resolve(hal, table, src)?;
        let chunk = (PAGE_SIZE - offset).min(dst.len() - done);
        hal.read_frame(ppn, offset, &mut dst[done..done + chunk]);
        done += chunk;
        src = src + chunk;
    }
    Ok(())
}

/// 从用户地址空间复制一个以 NUL 结尾的字符串。
///
/// 成功时返回终止符之前的字节数，`dst` 中对应位置已写入 NUL；
/// 终止符之后的 `dst` 内容保持原样。
///
/// # Errors
/// - 未映射页：[`PagingError::NotMapped`]；
/// - 在 `dst.len()` 字节内没有出现终止符：
///   [`PagingError::StringNotTerminated`]。
pub fn copy_str_from_user(
    hal: &dyn MemoryHal,
    table: &PageTable,
    dst: &mut [u8],
    mut src: Vaddr,
) -> PagingResult<usize> {
    let mut scratch = [0u8; PAGE_SIZE];
    let mut copied = 0;
    while copied < dst.len() {
        let (ppn, offset) = resolve(hal, table, src)?;
        let chunk = (PAGE_SIZE - offset).min(dst.len() - copied);
        let buf = &mut scratch[..chunk];
        hal.read_frame(ppn, offset, buf);
        if let Some(nul) = buf.iter().position(|&b| b == 0) {
            dst[copied..copied + nul + 1].copy_from_slice(&buf[..=nul]);
            return Ok(copied + nul);
        }
        dst[copied..copied + chunk].copy_from_slice(buf);
        copied += chunk;
        src = src + chunk;
    }
    Err(PagingError::StringNotTerminated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_allocator::SimMemoryHal;
    use crate::page_table::PteFlags;

    fn space_with_pages(hal: &SimMemoryHal, pages: usize) -> PageTable {
        let mut table = PageTable::new(hal).unwrap();
        for page in 0..pages {
            let frame = hal.alloc_frame().unwrap();
            table
                .map_page(hal, Vaddr(page * PAGE_SIZE), frame, PteFlags::user_rw())
                .unwrap();
        }
        table
    }

    #[test]
    fn test_round_trip_across_page_boundary() {
        let hal = SimMemoryHal::new(16);
        let table = space_with_pages(&hal, 2);
        let msg = b"straddles the boundary";
        let dst = Vaddr(PAGE_SIZE - 8);
        copy_to_user(&hal, &table, dst, msg).unwrap();

        let mut back = [0u8; 22];
        copy_from_user(&hal, &table, &mut back, dst).unwrap();
        assert_eq!(&back, msg);
    }

    #[test]
    fn test_stops_at_unmapped_page() {
        let hal = SimMemoryHal::new(16);
        let table = space_with_pages(&hal, 1);
        let data = alloc::vec![0x5Au8; PAGE_SIZE + 64];
        let err = copy_to_user(&hal, &table, Vaddr(0), &data).unwrap_err();
        assert_eq!(err, PagingError::NotMapped);

        // 第一页已写入
        let mut first = [0u8; 16];
        copy_from_user(&hal, &table, &mut first, Vaddr(0)).unwrap();
        assert!(first.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_string_terminated_and_not() {
        let hal = SimMemoryHal::new(16);
        let table = space_with_pages(&hal, 1);
        copy_to_user(&hal, &table, Vaddr(10), b"hello\0").unwrap();

        let mut buf = [0u8; 32];
        let len = copy_str_from_user(&hal, &table, &mut buf, Vaddr(10)).unwrap();
        assert_eq!(len, 5);
        assert_eq!(&buf[..6], b"hello\0");

        // 缓冲区用尽仍未见终止符
        let mut short = [0u8; 3];
        let err = copy_str_from_user(&hal, &table, &mut short, Vaddr(10)).unwrap_err();
        assert_eq!(err, PagingError::StringNotTerminated);
    }

    #[test]
    fn test_string_copy_leaves_tail_untouched() {
        let hal = SimMemoryHal::new(16);
        let table = space_with_pages(&hal, 1);
        // 终止符之后的用户内存内容不应进入 dst
        copy_to_user(&hal, &table, Vaddr(0), b"ok\0garbage").unwrap();

        let mut buf = [0xEEu8; 16];
        let len = copy_str_from_user(&hal, &table, &mut buf, Vaddr(0)).unwrap();
        assert_eq!(len, 2);
        assert_eq!(&buf[..3], b"ok\0");
        assert!(buf[3..].iter().all(|&b| b == 0xEE));
    }
}
