//! 字节汇/字节源抽象
//!
//! 编解码器只依赖这两个 trait，自己不打开文件或套接字。
//! 对解码器来说"流结束"永远是错误，不是提前停止的软信号。

use std::io::{Read, Write};

use super::error::MarshalError;

/// 编码输出端
pub trait MarshalSink {
    /// 写出全部字节
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), MarshalError>;
}

impl MarshalSink for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), MarshalError> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// 解码输入端
pub trait MarshalSource {
    /// 读满整个缓冲区；读不满（含流结束）返回 Malformed
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), MarshalError>;

    /// 剩余可读字节数的提示（切片源已知，IO 源未知）
    ///
    /// 用于在分配大缓冲区之前拒绝显然超长的计数字段。
    fn remaining_hint(&self) -> Option<usize> {
        None
    }
}

/// 内存切片字节源
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// 从字节切片创建
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// 已消费的字节数
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> MarshalSource for SliceSource<'a> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), MarshalError> {
        let end = self.pos + buf.len();
        if end > self.bytes.len() {
            return Err(MarshalError::truncated());
        }
        buf.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn remaining_hint(&self) -> Option<usize> {
        Some(self.bytes.len() - self.pos)
    }
}

/// `std::io::Write` 适配：IO 错误原样传播
pub struct IoSink<W: Write> {
    inner: W,
}

impl<W: Write> IoSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// 取回底层 writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> MarshalSink for IoSink<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), MarshalError> {
        self.inner.write_all(bytes)?;
        Ok(())
    }
}

/// `std::io::Read` 适配：IO 错误折叠为 Malformed
pub struct IoSource<R: Read> {
    inner: R,
}

impl<R: Read> IoSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> MarshalSource for IoSource<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), MarshalError> {
        self.inner
            .read_exact(buf)
            .map_err(|e| MarshalError::Malformed(format!("source io error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_source_read() {
        let data = [1u8, 2, 3, 4];
        let mut source = SliceSource::new(&data);
        let mut buf = [0u8; 2];
        source.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
        assert_eq!(source.position(), 2);
        assert_eq!(source.remaining_hint(), Some(2));
    }

    #[test]
    fn test_slice_source_truncated() {
        let data = [1u8];
        let mut source = SliceSource::new(&data);
        let mut buf = [0u8; 4];
        let err = source.read_exact(&mut buf).unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }

    #[test]
    fn test_vec_sink() {
        let mut sink = Vec::new();
        sink.write_bytes(&[1, 2]).unwrap();
        sink.write_bytes(&[3]).unwrap();
        assert_eq!(sink, vec![1, 2, 3]);
    }

    #[test]
    fn test_io_source_eof_is_malformed() {
        let mut source = IoSource::new(std::io::Cursor::new(vec![1u8]));
        let mut buf = [0u8; 2];
        let err = source.read_exact(&mut buf).unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }
}
