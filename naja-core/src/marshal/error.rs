//! 编解码错误类型
//!
//! 五种互不重叠的错误，对当前调用都是致命的：没有部分结果，
//! 也没有自动重试。编码端的 IO 错误原样向上传播；解码端的 IO
//! 错误（包括流提前结束）一律折叠为 Malformed。

use naja_config::CodeBackend;
use thiserror::Error;

/// 编解码错误
#[derive(Error, Debug)]
pub enum MarshalError {
    /// 值没有对应的类型标签，也没有字节视图兜底
    #[error("unsupported value for marshal: {0}")]
    Unsupported(String),

    /// 输入流损坏：未知标签、非法长度字段或数据截断
    #[error("malformed marshal stream: {0}")]
    Malformed(String),

    /// 引用索引为负或落在已填充的引用表之外
    #[error("bad marshal reference: index {index} out of range (table size {size})")]
    BadReference { index: i64, size: usize },

    /// 递归深度超过上限（对抗恶意或病态嵌套输入）
    #[error("marshal recursion depth exceeded (max {0})")]
    DepthExceeded(usize),

    /// 代码单元子格式与当前配置的字节码后端不一致
    #[error("code unit backend mismatch: stream has '{stream}', configured '{configured}'")]
    BackendMismatch {
        stream: CodeBackend,
        configured: CodeBackend,
    },

    /// 编码端底层字节汇的 IO 错误
    #[error("marshal sink io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarshalError {
    /// 解码端的截断/流结束错误
    pub(crate) fn truncated() -> Self {
        MarshalError::Malformed("unexpected end of stream".to_string())
    }
}
