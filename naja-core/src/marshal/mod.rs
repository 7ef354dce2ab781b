//! Naja 对象图二进制编解码（marshal）
//!
//! 把内存中的值图（原语、字符串、容器、编译后代码单元）写成紧凑
//! 的标签字节流并还原，与长期部署的外部二进制格式逐字节兼容。
//!
//! # 线上格式
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ 每个值 = 标签字节 + 标签专属负载                            │
//! ├──────────────────────────────────────────────────────────┤
//! │ 标签字节  │ 低 7 位选变体；最高位 0x80 = 引用表标志          │
//! │ 整数字段  │ 小端定宽：计数/int32 4 字节，int64/double 8 字节 │
//! │ 回指      │ 'r' + 4 字节引用表索引                          │
//! │ 大整数    │ 带符号 4 字节数字个数 + base 2^15 的 16 位数字   │
//! │ 字符串    │ 4 字节长度 + UTF-8（ASCII 紧凑形式为 1 字节长度）│
//! │ 元组      │ 1 字节计数（版本 >= 4 且 < 256）或 4 字节计数    │
//! │ 字典      │ 键值对序列，键位上的 null 标签终止，无计数前缀    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! 格式版本是带外上下文，从不写入流中，编码和解码方必须提供相同
//! 的版本号。版本门控：引用机制 >= 3；二进制浮点 > 1；紧凑元组和
//! ASCII 形式 >= 4。
//!
//! # 示例
//!
//! ```rust,ignore
//! use naja_core::marshal;
//! use naja_core::{MarshalOptions, Value};
//!
//! let options = MarshalOptions::default();
//! let bytes = marshal::encode(&Value::Int32(42), &options)?;
//! let value = marshal::decode(&bytes, &options)?;
//! ```

mod bigint;
mod code;
pub mod error;
mod reader;
mod refs;
mod stream;
mod tag;
mod writer;

// 公开导出
pub use error::MarshalError;
pub use reader::MarshalReader;
pub use stream::{IoSink, IoSource, MarshalSink, MarshalSource, SliceSource};
pub use tag::{TypeTag, FLAG_REF};
pub use writer::MarshalWriter;

use std::rc::Rc;

use naja_config::{MarshalOptions, MAX_VERSION};

use crate::object::code::CodeUnit;
use crate::object::value::Value;

fn check_version(version: u8) -> Result<(), MarshalError> {
    if version > MAX_VERSION {
        return Err(MarshalError::Unsupported(format!(
            "unknown marshal version {version} (max {MAX_VERSION})"
        )));
    }
    Ok(())
}

/// 编码到内存缓冲区
pub fn encode(value: &Value, options: &MarshalOptions) -> Result<Vec<u8>, MarshalError> {
    let mut buf = Vec::new();
    encode_to(value, options, &mut buf)?;
    Ok(buf)
}

/// 编码到字节汇
pub fn encode_to<S: MarshalSink>(
    value: &Value,
    options: &MarshalOptions,
    sink: &mut S,
) -> Result<(), MarshalError> {
    check_version(options.version)?;
    let mut writer = MarshalWriter::new(sink, options);
    writer.write_value(value)
}

/// 从内存缓冲区解码
pub fn decode(bytes: &[u8], options: &MarshalOptions) -> Result<Value, MarshalError> {
    let mut source = SliceSource::new(bytes);
    decode_from(&mut source, options)
}

/// 从字节源解码
pub fn decode_from<S: MarshalSource>(
    source: &mut S,
    options: &MarshalOptions,
) -> Result<Value, MarshalError> {
    check_version(options.version)?;
    let mut reader = MarshalReader::new(source, options);
    reader.read_value()
}

/// 序列化一个代码单元
pub fn encode_code(unit: &Rc<CodeUnit>, options: &MarshalOptions) -> Result<Vec<u8>, MarshalError> {
    encode(&Value::Code(unit.clone()), options)
}

/// 反序列化一个代码单元，源名称自动合成
pub fn decode_code(bytes: &[u8], options: &MarshalOptions) -> Result<Rc<CodeUnit>, MarshalError> {
    decode_code_inner(bytes, options, None)
}

/// 反序列化一个代码单元，用调用方提供的源名称
pub fn decode_code_named(
    bytes: &[u8],
    options: &MarshalOptions,
    source_name: &str,
) -> Result<Rc<CodeUnit>, MarshalError> {
    decode_code_inner(bytes, options, Some(source_name))
}

fn decode_code_inner(
    bytes: &[u8],
    options: &MarshalOptions,
    source_name: Option<&str>,
) -> Result<Rc<CodeUnit>, MarshalError> {
    check_version(options.version)?;
    let mut source = SliceSource::new(bytes);
    let mut reader = MarshalReader::new(&mut source, options);
    if let Some(name) = source_name {
        reader.set_source_name(name);
    }
    match reader.read_value()? {
        Value::Code(unit) => Ok(unit),
        other => Err(MarshalError::Malformed(format!(
            "stream does not contain a code unit (found {})",
            other.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_validation() {
        let options = MarshalOptions::with_version(9);
        let err = encode(&Value::None, &options).unwrap_err();
        assert!(matches!(err, MarshalError::Unsupported(_)));

        let err = decode(&[b'N'], &options).unwrap_err();
        assert!(matches!(err, MarshalError::Unsupported(_)));
    }

    #[test]
    fn test_encode_decode_buffer() {
        let options = MarshalOptions::default();
        let bytes = encode(&Value::Int32(42), &options).unwrap();
        assert_eq!(decode(&bytes, &options).unwrap(), Value::Int32(42));
    }

    #[test]
    fn test_encode_decode_io_adapters() {
        let options = MarshalOptions::default();
        let value = Value::tuple(vec![Value::str("io"), Value::Int64(-9)]);

        let mut sink = IoSink::new(Vec::new());
        encode_to(&value, &options, &mut sink).unwrap();
        let bytes = sink.into_inner();

        let mut source = IoSource::new(std::io::Cursor::new(bytes));
        let decoded = decode_from(&mut source, &options).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_decode_code_rejects_plain_value() {
        let options = MarshalOptions::default();
        let bytes = encode(&Value::Int32(1), &options).unwrap();
        let err = decode_code(&bytes, &options).unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }
}
