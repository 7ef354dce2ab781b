//! API 错误类型
//!
//! 提供统一的错误类型和结构化错误报告。

use thiserror::Error;

/// 编解码错误（结构化）
pub use naja_core::marshal::MarshalError;

/// Naja 错误类型
#[derive(Error, Debug)]
pub enum NajaError {
    /// 编解码错误
    #[error("{0}")]
    Marshal(#[from] MarshalError),

    /// 文件/流 IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NajaError {
    /// 获取错误阶段名称
    pub fn phase(&self) -> &'static str {
        match self {
            NajaError::Marshal(_) => "marshal",
            NajaError::Io(_) => "io",
        }
    }

    /// 转换为结构化错误报告
    ///
    /// 适用于 CLI 输出和需要结构化数据的上层应用。
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            phase: self.phase(),
            kind: match self {
                NajaError::Marshal(e) => match e {
                    MarshalError::Unsupported(_) => "unsupported",
                    MarshalError::Malformed(_) => "malformed",
                    MarshalError::BadReference { .. } => "bad-reference",
                    MarshalError::DepthExceeded(_) => "depth-exceeded",
                    MarshalError::BackendMismatch { .. } => "backend-mismatch",
                    MarshalError::Io(_) => "io",
                },
                NajaError::Io(_) => "io",
            },
            message: self.to_string(),
        }
    }
}

/// 结构化错误报告
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// 出错阶段
    pub phase: &'static str,
    /// 错误种类
    pub kind: &'static str,
    /// 人类可读消息
    pub message: String,
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.phase, self.kind, self.message)
    }
}
