//! 值图编码器
//!
//! 递归遍历值图，按形态分派到类型标签并写出标签专属负载。
//! 可引用的值先过引用表：已跟踪的只写回指；首次出现的先占槽
//! 再递归子值，标签带上引用标志位（版本 >= 3）。
//! 深度计数器在每次递归进入时自增、所有返回路径上自减，超过
//! 上限立即中止整个调用。

use num_traits::Zero;

use naja_config::{CodeBackend, MarshalOptions, COMPACT_VERSION, REF_VERSION};

use super::bigint;
use super::code::write_code_unit;
use super::error::MarshalError;
use super::refs::{Tracked, WriteRefs};
use super::stream::MarshalSink;
use super::tag::{TypeTag, FLAG_REF};
use crate::object::array::TypedArray;
use crate::object::value::{StrObject, Value};

/// 值图编码器；一个实例只服务一次顶层编码调用
pub struct MarshalWriter<'a, S: MarshalSink> {
    sink: &'a mut S,
    version: u8,
    backend: CodeBackend,
    refs: WriteRefs,
    depth: usize,
    max_depth: usize,
}

impl<'a, S: MarshalSink> MarshalWriter<'a, S> {
    /// 创建编码器
    pub fn new(sink: &'a mut S, options: &MarshalOptions) -> Self {
        Self {
            sink,
            version: options.version,
            backend: options.backend,
            refs: WriteRefs::new(),
            depth: 0,
            max_depth: options.limits.max_marshal_depth,
        }
    }

    /// 当前配置的字节码后端
    pub(crate) fn backend(&self) -> CodeBackend {
        self.backend
    }

    /// 递归写出一个值
    pub fn write_value(&mut self, value: &Value) -> Result<(), MarshalError> {
        if self.depth >= self.max_depth {
            return Err(MarshalError::DepthExceeded(self.max_depth));
        }
        self.depth += 1;
        let result = self.write_dispatch(value);
        self.depth -= 1;
        result
    }

    fn write_dispatch(&mut self, value: &Value) -> Result<(), MarshalError> {
        match value {
            Value::Null => self.write_u8(TypeTag::Null as u8),
            Value::None => self.write_u8(TypeTag::None as u8),
            Value::NoValue => self.write_u8(TypeTag::NoValue as u8),
            Value::StopIteration => self.write_u8(TypeTag::StopIteration as u8),
            Value::Ellipsis => self.write_u8(TypeTag::Ellipsis as u8),
            Value::SourceMarker => self.write_u8(TypeTag::SourceMarker as u8),
            Value::Bool(true) => self.write_u8(TypeTag::True as u8),
            Value::Bool(false) => self.write_u8(TypeTag::False as u8),

            Value::Int32(n) => {
                self.write_u8(TypeTag::Int32 as u8)?;
                self.write_i32(*n)
            }
            Value::Int64(n) => {
                self.write_u8(TypeTag::Int64 as u8)?;
                self.write_i64(*n)
            }
            Value::Float(f) => self.write_float_value(*f),
            Value::Complex { re, im } => self.write_complex_value(*re, *im),

            Value::BigInt(big) => {
                // 零特判为 32 位整数 0，从不走数字序列路径
                if big.is_zero() {
                    self.write_u8(TypeTag::Int32 as u8)?;
                    return self.write_i32(0);
                }
                if self.emit_ref(value)? {
                    return Ok(());
                }
                self.write_u8(TypeTag::BigInt as u8 | self.ref_flag())?;
                self.write_big_int(big)
            }

            Value::Bytes(data) => {
                if self.emit_ref(value)? {
                    return Ok(());
                }
                self.write_u8(TypeTag::Bytes as u8 | self.ref_flag())?;
                self.write_len_prefixed(data)
            }

            Value::Foreign(obj) => {
                // 字节视图兜底：按原始字节串写出；没有视图就无法序列化
                let Some(view) = obj.view.as_ref() else {
                    return Err(MarshalError::Unsupported(format!(
                        "foreign object '{}' has no buffer view",
                        obj.type_name
                    )));
                };
                if self.emit_ref(value)? {
                    return Ok(());
                }
                self.write_u8(TypeTag::Bytes as u8 | self.ref_flag())?;
                self.write_len_prefixed(view)
            }

            Value::Str(s) => {
                if self.emit_ref(value)? {
                    return Ok(());
                }
                self.write_str_value(s)
            }

            Value::Tuple(items) => {
                if self.emit_ref(value)? {
                    return Ok(());
                }
                let flag = self.ref_flag();
                if self.version >= COMPACT_VERSION && items.len() < 256 {
                    self.write_u8(TypeTag::SmallTuple as u8 | flag)?;
                    self.write_u8(items.len() as u8)?;
                } else {
                    self.write_u8(TypeTag::Tuple as u8 | flag)?;
                    self.write_count(items.len())?;
                }
                for item in items.iter() {
                    self.write_value(item)?;
                }
                Ok(())
            }

            Value::List(items) => {
                if self.emit_ref(value)? {
                    return Ok(());
                }
                self.write_u8(TypeTag::List as u8 | self.ref_flag())?;
                self.write_count(items.borrow().len())?;
                for item in items.borrow().iter() {
                    self.write_value(item)?;
                }
                Ok(())
            }

            Value::Dict(pairs) => {
                if self.emit_ref(value)? {
                    return Ok(());
                }
                self.write_u8(TypeTag::Dict as u8 | self.ref_flag())?;
                // 无计数前缀；null 标签在键位上充当终止符，因此
                // 键本身不允许是 null，键和值都必须完整序列化
                for (key, val) in pairs.borrow().iter() {
                    if matches!(key, Value::Null) {
                        return Err(MarshalError::Unsupported(
                            "null is not a valid dict key".to_string(),
                        ));
                    }
                    self.write_value(key)?;
                    self.write_value(val)?;
                }
                self.write_u8(TypeTag::Null as u8)
            }

            Value::Set(items) => {
                if self.emit_ref(value)? {
                    return Ok(());
                }
                self.write_u8(TypeTag::Set as u8 | self.ref_flag())?;
                self.write_count(items.borrow().len())?;
                for item in items.borrow().iter() {
                    self.write_value(item)?;
                }
                Ok(())
            }

            Value::FrozenSet(items) => {
                if self.emit_ref(value)? {
                    return Ok(());
                }
                self.write_u8(TypeTag::FrozenSet as u8 | self.ref_flag())?;
                self.write_count(items.len())?;
                for item in items.iter() {
                    self.write_value(item)?;
                }
                Ok(())
            }

            Value::Array(array) => {
                if self.emit_ref(value)? {
                    return Ok(());
                }
                self.write_u8(TypeTag::Array as u8 | self.ref_flag())?;
                self.write_array(array)
            }

            Value::Code(unit) => {
                if self.emit_ref(value)? {
                    return Ok(());
                }
                let flag = self.ref_flag();
                write_code_unit(self, unit, flag)
            }
        }
    }

    // ==================== 引用表 ====================

    /// 可引用值的引用表处理
    ///
    /// 已跟踪：写出回指并返回 true。首次出现：占槽并返回 false，
    /// 调用方继续写出带引用标志的负载。版本 < 3 时整个机制停用。
    fn emit_ref(&mut self, value: &Value) -> Result<bool, MarshalError> {
        if self.version < REF_VERSION {
            return Ok(false);
        }
        let Some(identity) = value.identity() else {
            return Ok(false);
        };
        match self.refs.track(identity) {
            Tracked::Seen(index) => {
                self.write_u8(TypeTag::Ref as u8)?;
                self.write_u32(index)?;
                Ok(true)
            }
            Tracked::New => Ok(false),
        }
    }

    fn ref_flag(&self) -> u8 {
        if self.version >= REF_VERSION {
            FLAG_REF
        } else {
            0
        }
    }

    // ==================== 标签专属负载 ====================

    fn write_float_value(&mut self, f: f64) -> Result<(), MarshalError> {
        if self.version > 1 {
            self.write_u8(TypeTag::BinaryFloat as u8)?;
            self.write_u64(f.to_bits())
        } else {
            self.write_u8(TypeTag::Float as u8)?;
            self.write_float_text(f)
        }
    }

    fn write_complex_value(&mut self, re: f64, im: f64) -> Result<(), MarshalError> {
        if self.version > 1 {
            self.write_u8(TypeTag::BinaryComplex as u8)?;
            self.write_u64(re.to_bits())?;
            self.write_u64(im.to_bits())
        } else {
            self.write_u8(TypeTag::Complex as u8)?;
            self.write_float_text(re)?;
            self.write_float_text(im)
        }
    }

    /// 最短可往返的十进制文本，1 字节长度前缀
    fn write_float_text(&mut self, f: f64) -> Result<(), MarshalError> {
        let mut text = format!("{f}");
        if text.len() > 24 {
            // 巨大数值退回指数形式，保持往返精度
            text = format!("{f:e}");
        }
        if text.len() >= 256 {
            return Err(MarshalError::Unsupported(format!(
                "float repr too long: {} bytes",
                text.len()
            )));
        }
        self.write_u8(text.len() as u8)?;
        self.write_raw(text.as_bytes())
    }

    fn write_big_int(&mut self, value: &num_bigint::BigInt) -> Result<(), MarshalError> {
        let digits = bigint::to_digits(value);
        let count = i32::try_from(digits.len()).map_err(|_| {
            MarshalError::Unsupported("bigint digit count exceeds i32 range".to_string())
        })?;
        let signed_count = if value.sign() == num_bigint::Sign::Minus {
            -count
        } else {
            count
        };
        self.write_i32(signed_count)?;
        for digit in digits {
            self.write_raw(&digit.to_le_bytes())?;
        }
        Ok(())
    }

    fn write_str_value(&mut self, s: &StrObject) -> Result<(), MarshalError> {
        let flag = self.ref_flag();
        let bytes = s.chars.as_bytes();
        if self.version >= COMPACT_VERSION && s.chars.is_ascii() {
            if bytes.len() < 256 {
                let tag = if s.interned {
                    TypeTag::ShortAsciiInterned
                } else {
                    TypeTag::ShortAscii
                };
                self.write_u8(tag as u8 | flag)?;
                self.write_u8(bytes.len() as u8)?;
            } else {
                let tag = if s.interned {
                    TypeTag::AsciiInterned
                } else {
                    TypeTag::Ascii
                };
                self.write_u8(tag as u8 | flag)?;
                self.write_count(bytes.len())?;
            }
        } else {
            let tag = if s.interned {
                TypeTag::Interned
            } else {
                TypeTag::Unicode
            };
            self.write_u8(tag as u8 | flag)?;
            self.write_count(bytes.len())?;
        }
        self.write_raw(bytes)
    }

    fn write_array(&mut self, array: &TypedArray) -> Result<(), MarshalError> {
        self.write_u8(array.kind() as u8)?;
        self.write_count(array.len())?;
        match array {
            TypedArray::Byte(items) => self.write_raw(items),
            TypedArray::Short(items) => {
                for &item in items {
                    self.write_raw(&item.to_le_bytes())?;
                }
                Ok(())
            }
            TypedArray::Int(items) => {
                for &item in items {
                    self.write_raw(&item.to_le_bytes())?;
                }
                Ok(())
            }
            TypedArray::Long(items) => {
                for &item in items {
                    self.write_raw(&item.to_le_bytes())?;
                }
                Ok(())
            }
            TypedArray::Double(items) => {
                for &item in items {
                    self.write_raw(&item.to_bits().to_le_bytes())?;
                }
                Ok(())
            }
            TypedArray::Bool(items) => {
                for &item in items {
                    self.write_u8(item as u8)?;
                }
                Ok(())
            }
            TypedArray::Str(items) => {
                for item in items {
                    self.write_count(item.len())?;
                    self.write_raw(item.as_bytes())?;
                }
                Ok(())
            }
            TypedArray::Object(items) => {
                for item in items {
                    self.write_value(item)?;
                }
                Ok(())
            }
        }
    }

    // ==================== 基础写出 ====================

    pub(crate) fn write_u8(&mut self, v: u8) -> Result<(), MarshalError> {
        self.sink.write_bytes(&[v])
    }

    pub(crate) fn write_u32(&mut self, v: u32) -> Result<(), MarshalError> {
        self.sink.write_bytes(&v.to_le_bytes())
    }

    pub(crate) fn write_i32(&mut self, v: i32) -> Result<(), MarshalError> {
        self.sink.write_bytes(&v.to_le_bytes())
    }

    pub(crate) fn write_i64(&mut self, v: i64) -> Result<(), MarshalError> {
        self.sink.write_bytes(&v.to_le_bytes())
    }

    pub(crate) fn write_u64(&mut self, v: u64) -> Result<(), MarshalError> {
        self.sink.write_bytes(&v.to_le_bytes())
    }

    pub(crate) fn write_raw(&mut self, bytes: &[u8]) -> Result<(), MarshalError> {
        self.sink.write_bytes(bytes)
    }

    /// 4 字节计数字段；超出 i32 范围的长度无法表达
    pub(crate) fn write_count(&mut self, len: usize) -> Result<(), MarshalError> {
        let count = i32::try_from(len).map_err(|_| {
            MarshalError::Unsupported(format!("collection too large to marshal: {len} elements"))
        })?;
        self.write_i32(count)
    }

    /// 4 字节长度前缀 + 原始字节
    pub(crate) fn write_len_prefixed(&mut self, bytes: &[u8]) -> Result<(), MarshalError> {
        self.write_count(bytes.len())?;
        self.write_raw(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_with(value: &Value, version: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        let options = MarshalOptions::with_version(version);
        let mut writer = MarshalWriter::new(&mut buf, &options);
        writer.write_value(value).unwrap();
        buf
    }

    #[test]
    fn test_singleton_tags() {
        assert_eq!(encode_with(&Value::None, 4), vec![b'N']);
        assert_eq!(encode_with(&Value::Bool(true), 4), vec![b'T']);
        assert_eq!(encode_with(&Value::Bool(false), 4), vec![b'F']);
        assert_eq!(encode_with(&Value::Ellipsis, 4), vec![b'.']);
    }

    #[test]
    fn test_int32_layout() {
        let bytes = encode_with(&Value::Int32(0x01020304), 4);
        assert_eq!(bytes, vec![b'i', 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_small_tuple_count_byte() {
        let tuple = Value::tuple(vec![Value::Int32(1); 3]);
        let bytes = encode_with(&tuple, 4);
        assert_eq!(bytes[0] & !FLAG_REF, b')');
        assert_eq!(bytes[1], 3);
    }

    #[test]
    fn test_large_tuple_uses_four_byte_count() {
        let tuple = Value::tuple(vec![Value::Int32(1); 300]);
        let bytes = encode_with(&tuple, 4);
        assert_eq!(bytes[0] & !FLAG_REF, b'(');
        assert_eq!(&bytes[1..5], &300u32.to_le_bytes());
    }

    #[test]
    fn test_tuple_below_compact_version() {
        let tuple = Value::tuple(vec![Value::Int32(1); 3]);
        let bytes = encode_with(&tuple, 3);
        assert_eq!(bytes[0] & !FLAG_REF, b'(');
    }

    #[test]
    fn test_ref_flag_only_at_v3_plus() {
        let s = Value::str("x");
        let at_v3 = encode_with(&s, 3);
        assert_eq!(at_v3[0] & FLAG_REF, FLAG_REF);

        let at_v2 = encode_with(&s, 2);
        assert_eq!(at_v2[0] & FLAG_REF, 0);
    }

    #[test]
    fn test_shared_value_becomes_ref() {
        let s = Value::str("shared");
        let pair = Value::tuple(vec![s.clone(), s]);
        let bytes = encode_with(&pair, 4);
        // 第二次出现只有 'r' + 索引 1（元组本身占索引 0）
        let ref_pos = bytes.len() - 5;
        assert_eq!(bytes[ref_pos], b'r');
        assert_eq!(&bytes[ref_pos + 1..], &1u32.to_le_bytes());
    }

    #[test]
    fn test_dict_terminated_by_null_tag() {
        let dict = Value::dict(vec![
            (Value::Int32(1), Value::str("a")),
            (Value::Int32(2), Value::str("b")),
        ]);
        let bytes = encode_with(&dict, 4);
        assert_eq!(*bytes.last().unwrap(), b'0');
        assert_eq!(bytes.iter().filter(|&&b| b == b'0').count(), 1);
    }

    #[test]
    fn test_null_dict_key_rejected() {
        let dict = Value::dict(vec![(Value::Null, Value::Int32(1))]);
        let mut buf = Vec::new();
        let options = MarshalOptions::default();
        let mut writer = MarshalWriter::new(&mut buf, &options);
        let err = writer.write_value(&dict).unwrap_err();
        assert!(matches!(err, MarshalError::Unsupported(_)));
    }

    #[test]
    fn test_bigint_zero_becomes_int32() {
        let zero = Value::big_int(num_bigint::BigInt::from(0));
        let bytes = encode_with(&zero, 4);
        assert_eq!(bytes, vec![b'i', 0, 0, 0, 0]);
    }

    #[test]
    fn test_legacy_float_is_text() {
        let bytes = encode_with(&Value::Float(1.5), 1);
        assert_eq!(bytes[0], b'f');
        assert_eq!(bytes[1] as usize, bytes.len() - 2);
        assert_eq!(&bytes[2..], b"1.5");
    }

    #[test]
    fn test_binary_float_is_bits() {
        let bytes = encode_with(&Value::Float(1.5), 2);
        assert_eq!(bytes[0], b'g');
        assert_eq!(&bytes[1..], &1.5f64.to_bits().to_le_bytes());
    }

    #[test]
    fn test_foreign_without_view_unsupported() {
        let foreign = Value::Foreign(std::rc::Rc::new(crate::object::value::ForeignObject {
            type_name: "Socket".to_string(),
            view: None,
        }));
        let mut buf = Vec::new();
        let options = MarshalOptions::default();
        let mut writer = MarshalWriter::new(&mut buf, &options);
        let err = writer.write_value(&foreign).unwrap_err();
        assert!(matches!(err, MarshalError::Unsupported(_)));
    }

    #[test]
    fn test_depth_guard_on_encode() {
        let mut value = Value::list(vec![]);
        for _ in 0..250 {
            value = Value::list(vec![value]);
        }
        let mut buf = Vec::new();
        let options = MarshalOptions::with_version(0);
        let mut writer = MarshalWriter::new(&mut buf, &options);
        let err = writer.write_value(&value).unwrap_err();
        assert!(matches!(err, MarshalError::DepthExceeded(_)));
    }
}
