//! 交换存储接口 trait 定义
//!
//! 被换出页面的内容写入每进程的交换存储，以页对齐偏移寻址。
//! 偏移的分配与回收由换页引擎自己记录，存储方只提供最小的读写接口。

use alloc::vec::Vec;
use spin::Mutex;

/// 交换存储 I/O 错误。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// 读取范围超出存储已有内容。
    OutOfRange,
}

/// 可用于换页读写的存储接口
///
/// 此 trait 抽象了交换 I/O 所需的最小接口。
pub trait BackingStore: Send + Sync {
    /// 从指定偏移读取数据到缓冲区，返回实际读取的字节数。
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, StoreError>;

    /// 将缓冲区数据写入指定偏移，返回实际写入的字节数。
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, StoreError>;
}

/// [HeapBackingStore]
/// ---------------------
/// 堆上的可增长交换存储，供测试与宿主端使用。
/// 写入越过当前末尾时自动按零扩展。
pub struct HeapBackingStore {
    data: Mutex<Vec<u8>>,
}

impl HeapBackingStore {
    /// 创建一个空的交换存储。
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
        }
    }
}

impl Default for HeapBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BackingStore for HeapBackingStore {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, StoreError> {
        let data = self.data.lock();
        if offset + buf.len() > data.len() {
            return Err(StoreError::OutOfRange);
        }
        buf.copy_from_slice(&data[offset..offset + buf.len()]);
        Ok(buf.len())
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, StoreError> {
        let mut data = self.data.lock();
        if offset + buf.len() > data.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let store = HeapBackingStore::new();
        assert_eq!(store.write_at(4096, b"swap").unwrap(), 4);
        let mut buf = [0u8; 4];
        assert_eq!(store.read_at(4096, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"swap");

        // 写入自动零扩展了 [0, 4096)
        let mut head = [1u8; 16];
        store.read_at(0, &mut head).unwrap();
        assert!(head.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_past_end() {
        let store = HeapBackingStore::new();
        let mut buf = [0u8; 8];
        assert_eq!(store.read_at(0, &mut buf), Err(StoreError::OutOfRange));
    }
}
