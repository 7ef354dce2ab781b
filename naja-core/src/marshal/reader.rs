//! 值图解码器
//!
//! 读取标签字节、剥离引用标志位后分派到标签专属负载解码。
//! 带引用标志的值在解码负载之前先在引用表占槽：可变容器把最终
//! 容器对象提前放入（自引用由此成立），不可变值先放占位符、构
//! 建完毕后回填。裸引用标签按索引直查引用表。
//! 所有计数字段按带符号 32 位读取，负数即非法输入。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use naja_config::{CodeBackend, MarshalOptions, REF_VERSION};

use super::bigint;
use super::code::read_code_unit;
use super::error::MarshalError;
use super::refs::ReadRefs;
use super::stream::MarshalSource;
use super::tag::{TypeTag, FLAG_REF};
use crate::object::array::{ArrayKind, TypedArray};
use crate::object::value::{StrObject, Value};

/// 解码时单次预分配的元素上限
///
/// 计数字段来自不可信输入；剩余长度未知的字节源（IO 源）无法在
/// 分配前校验计数，预分配按此上限封顶，让被截断的流以 Malformed
/// 报错而不是在分配阶段中止进程。
pub(crate) const MAX_DECODE_PREALLOC: usize = 4096;

/// 进程级源名序号
///
/// 同一进程内反复反序列化同名代码单元时，用它合成互不相同的
/// 源名称。除单调递增外不承载任何跨调用约定。
static SOURCE_SEQ: AtomicU64 = AtomicU64::new(1);

/// 值图解码器；一个实例只服务一次顶层解码调用
pub struct MarshalReader<'a, S: MarshalSource> {
    source: &'a mut S,
    version: u8,
    backend: CodeBackend,
    refs: ReadRefs,
    depth: usize,
    max_depth: usize,
    /// 本次调用的驻留表：相同文本的驻留字符串解码为同一对象
    interned: HashMap<String, Value>,
    /// 代码单元的源名称；首个代码单元出现时才合成
    source_name: Option<String>,
}

impl<'a, S: MarshalSource> MarshalReader<'a, S> {
    /// 创建解码器
    pub fn new(source: &'a mut S, options: &MarshalOptions) -> Self {
        Self {
            source,
            version: options.version,
            backend: options.backend,
            refs: ReadRefs::new(),
            depth: 0,
            max_depth: options.limits.max_marshal_depth,
            interned: HashMap::new(),
            source_name: None,
        }
    }

    /// 指定代码单元的源名称（默认自动合成 `<marshal #N>`）
    pub fn set_source_name(&mut self, name: impl Into<String>) {
        self.source_name = Some(name.into());
    }

    /// 当前配置的字节码后端
    pub(crate) fn backend(&self) -> CodeBackend {
        self.backend
    }

    /// 递归读取一个值
    pub fn read_value(&mut self) -> Result<Value, MarshalError> {
        if self.depth >= self.max_depth {
            return Err(MarshalError::DepthExceeded(self.max_depth));
        }
        self.depth += 1;
        let result = self.read_dispatch();
        self.depth -= 1;
        result
    }

    fn read_dispatch(&mut self) -> Result<Value, MarshalError> {
        let byte = self.read_u8()?;
        let flag = byte & FLAG_REF != 0;
        let tag = TypeTag::from_u8(byte & !FLAG_REF)
            .ok_or_else(|| MarshalError::Malformed(format!("unknown type tag 0x{byte:02x}")))?;

        if flag && self.version < REF_VERSION {
            return Err(MarshalError::Malformed(format!(
                "reference flag on tag '{}' in version {} stream",
                (byte & !FLAG_REF) as char,
                self.version
            )));
        }

        match tag {
            TypeTag::Null => Ok(Value::Null),
            TypeTag::None => Ok(Value::None),
            TypeTag::NoValue => Ok(Value::NoValue),
            TypeTag::StopIteration => Ok(Value::StopIteration),
            TypeTag::Ellipsis => Ok(Value::Ellipsis),
            TypeTag::True => Ok(Value::Bool(true)),
            TypeTag::False => Ok(Value::Bool(false)),
            TypeTag::SourceMarker => Ok(Value::SourceMarker),

            TypeTag::Int32 => Ok(Value::Int32(self.read_i32()?)),
            TypeTag::Int64 => Ok(Value::Int64(self.read_i64()?)),
            TypeTag::BinaryFloat => Ok(Value::Float(f64::from_bits(self.read_u64()?))),
            TypeTag::Float => Ok(Value::Float(self.read_float_text()?)),
            TypeTag::BinaryComplex => {
                let re = f64::from_bits(self.read_u64()?);
                let im = f64::from_bits(self.read_u64()?);
                Ok(Value::Complex { re, im })
            }
            TypeTag::Complex => {
                let re = self.read_float_text()?;
                let im = self.read_float_text()?;
                Ok(Value::Complex { re, im })
            }

            TypeTag::Ref => {
                if flag {
                    return Err(MarshalError::Malformed(
                        "reference tag cannot itself be reference-tracked".to_string(),
                    ));
                }
                let index = self.read_i32()?;
                if index < 0 {
                    return Err(MarshalError::BadReference {
                        index: index as i64,
                        size: self.refs.len(),
                    });
                }
                self.refs.get(index as u32)
            }

            TypeTag::BigInt => {
                let slot = self.reserve_if(flag);
                let value = self.read_big_int()?;
                self.fill_slot(slot, &value);
                Ok(value)
            }

            TypeTag::Bytes => {
                let slot = self.reserve_if(flag);
                let len = self.read_count(1)?;
                let data = self.read_vec(len)?;
                let value = Value::Bytes(Rc::new(data));
                self.fill_slot(slot, &value);
                Ok(value)
            }

            TypeTag::Unicode | TypeTag::Interned => {
                let slot = self.reserve_if(flag);
                let len = self.read_count(1)?;
                let text = self.read_str(len)?;
                let value = self.make_str(text, tag == TypeTag::Interned);
                self.fill_slot(slot, &value);
                Ok(value)
            }
            TypeTag::Ascii | TypeTag::AsciiInterned => {
                let slot = self.reserve_if(flag);
                let len = self.read_count(1)?;
                let text = self.read_str(len)?;
                let value = self.make_str(text, tag == TypeTag::AsciiInterned);
                self.fill_slot(slot, &value);
                Ok(value)
            }
            TypeTag::ShortAscii | TypeTag::ShortAsciiInterned => {
                let slot = self.reserve_if(flag);
                let len = self.read_u8()? as usize;
                let text = self.read_str(len)?;
                let value = self.make_str(text, tag == TypeTag::ShortAsciiInterned);
                self.fill_slot(slot, &value);
                Ok(value)
            }

            TypeTag::Tuple | TypeTag::SmallTuple => {
                let count = if tag == TypeTag::SmallTuple {
                    self.read_u8()? as usize
                } else {
                    self.read_count(1)?
                };
                let slot = self.reserve_if(flag);
                let mut items = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
                for _ in 0..count {
                    items.push(self.read_value()?);
                }
                let value = Value::Tuple(Rc::new(items));
                self.fill_slot(slot, &value);
                Ok(value)
            }

            TypeTag::List => {
                let count = self.read_count(1)?;
                let cell = Rc::new(RefCell::new(Vec::with_capacity(count.min(MAX_DECODE_PREALLOC))));
                let value = Value::List(cell.clone());
                if flag {
                    self.refs.reserve(value.clone());
                }
                for _ in 0..count {
                    let item = self.read_value()?;
                    cell.borrow_mut().push(item);
                }
                Ok(value)
            }

            TypeTag::Dict => {
                let cell = Rc::new(RefCell::new(Vec::new()));
                let value = Value::Dict(cell.clone());
                if flag {
                    self.refs.reserve(value.clone());
                }
                loop {
                    let key = self.read_value()?;
                    if matches!(key, Value::Null) {
                        break;
                    }
                    let val = self.read_value()?;
                    cell.borrow_mut().push((key, val));
                }
                Ok(value)
            }

            TypeTag::Set => {
                let count = self.read_count(1)?;
                let cell = Rc::new(RefCell::new(Vec::with_capacity(count.min(MAX_DECODE_PREALLOC))));
                let value = Value::Set(cell.clone());
                if flag {
                    self.refs.reserve(value.clone());
                }
                for _ in 0..count {
                    let item = self.read_value()?;
                    cell.borrow_mut().push(item);
                }
                Ok(value)
            }

            TypeTag::FrozenSet => {
                let count = self.read_count(1)?;
                let slot = self.reserve_if(flag);
                let mut items = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
                for _ in 0..count {
                    items.push(self.read_value()?);
                }
                let value = Value::FrozenSet(Rc::new(items));
                self.fill_slot(slot, &value);
                Ok(value)
            }

            TypeTag::Array => {
                let slot = self.reserve_if(flag);
                let value = self.read_array()?;
                self.fill_slot(slot, &value);
                Ok(value)
            }

            TypeTag::Code => read_code_unit(self, CodeBackend::Bytecode, flag),
            TypeTag::IrCode => read_code_unit(self, CodeBackend::Ir, flag),
        }
    }

    // ==================== 引用表 ====================

    pub(crate) fn reserve_if(&mut self, flag: bool) -> Option<usize> {
        if flag {
            Some(self.refs.reserve(Value::Null))
        } else {
            None
        }
    }

    pub(crate) fn fill_slot(&mut self, slot: Option<usize>, value: &Value) {
        if let Some(slot) = slot {
            self.refs.fill(slot, value.clone());
        }
    }

    // ==================== 标签专属负载 ====================

    fn make_str(&mut self, text: String, interned: bool) -> Value {
        if !interned {
            return Value::str(text);
        }
        if let Some(existing) = self.interned.get(&text) {
            return existing.clone();
        }
        let value = Value::Str(Rc::new(StrObject {
            chars: text.clone(),
            interned: true,
        }));
        self.interned.insert(text, value.clone());
        value
    }

    fn read_float_text(&mut self) -> Result<f64, MarshalError> {
        let len = self.read_u8()? as usize;
        let text = self.read_str(len)?;
        text.parse::<f64>()
            .map_err(|_| MarshalError::Malformed(format!("invalid float literal '{text}'")))
    }

    fn read_big_int(&mut self) -> Result<Value, MarshalError> {
        let signed_count = self.read_i32()?;
        let negative = signed_count < 0;
        let count = signed_count.unsigned_abs() as usize;
        self.check_count(count, 2)?;

        let mut digits = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
        for _ in 0..count {
            let digit = self.read_u16()?;
            if digit & !bigint::DIGIT_MASK != 0 {
                return Err(MarshalError::Malformed(format!(
                    "bigint digit 0x{digit:04x} exceeds 15 bits"
                )));
            }
            digits.push(digit);
        }
        Ok(Value::BigInt(Rc::new(bigint::from_digits(
            &digits, negative,
        ))))
    }

    fn read_array(&mut self) -> Result<Value, MarshalError> {
        let kind_byte = self.read_u8()?;
        let kind = ArrayKind::from_u8(kind_byte).ok_or_else(|| {
            MarshalError::Malformed(format!("unknown array element kind 0x{kind_byte:02x}"))
        })?;
        let array = match kind {
            ArrayKind::Byte => {
                let count = self.read_count(1)?;
                TypedArray::Byte(self.read_vec(count)?)
            }
            ArrayKind::Short => {
                let count = self.read_count(2)?;
                let mut items = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
                for _ in 0..count {
                    items.push(self.read_i16()?);
                }
                TypedArray::Short(items)
            }
            ArrayKind::Int => {
                let count = self.read_count(4)?;
                let mut items = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
                for _ in 0..count {
                    items.push(self.read_i32()?);
                }
                TypedArray::Int(items)
            }
            ArrayKind::Long => {
                let count = self.read_count(8)?;
                let mut items = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
                for _ in 0..count {
                    items.push(self.read_i64()?);
                }
                TypedArray::Long(items)
            }
            ArrayKind::Double => {
                let count = self.read_count(8)?;
                let mut items = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
                for _ in 0..count {
                    items.push(f64::from_bits(self.read_u64()?));
                }
                TypedArray::Double(items)
            }
            ArrayKind::Bool => {
                let count = self.read_count(1)?;
                let mut items = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
                for _ in 0..count {
                    items.push(self.read_u8()? != 0);
                }
                TypedArray::Bool(items)
            }
            ArrayKind::Str => {
                let count = self.read_count(1)?;
                let mut items = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
                for _ in 0..count {
                    let len = self.read_count(1)?;
                    items.push(self.read_str(len)?);
                }
                TypedArray::Str(items)
            }
            ArrayKind::Object => {
                let count = self.read_count(1)?;
                let mut items = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
                for _ in 0..count {
                    items.push(self.read_value()?);
                }
                TypedArray::Object(items)
            }
        };
        Ok(Value::Array(Rc::new(array)))
    }

    /// 代码单元的源名称；需要时才消耗一个进程级序号
    pub(crate) fn code_source_name(&mut self) -> String {
        self.source_name
            .get_or_insert_with(|| {
                let seq = SOURCE_SEQ.fetch_add(1, Ordering::Relaxed);
                format!("<marshal #{seq}>")
            })
            .clone()
    }

    // ==================== 基础读取 ====================

    pub(crate) fn read_u8(&mut self) -> Result<u8, MarshalError> {
        let mut buf = [0u8; 1];
        self.source.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16, MarshalError> {
        let mut buf = [0u8; 2];
        self.source.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_i16(&mut self) -> Result<i16, MarshalError> {
        let mut buf = [0u8; 2];
        self.source.read_exact(&mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, MarshalError> {
        let mut buf = [0u8; 4];
        self.source.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, MarshalError> {
        let mut buf = [0u8; 4];
        self.source.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64, MarshalError> {
        let mut buf = [0u8; 8];
        self.source.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, MarshalError> {
        let mut buf = [0u8; 8];
        self.source.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// 4 字节计数字段：负数非法；已知剩余长度时提前拒绝超长计数
    pub(crate) fn read_count(&mut self, element_width: usize) -> Result<usize, MarshalError> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(MarshalError::Malformed(format!(
                "negative count field: {count}"
            )));
        }
        let count = count as usize;
        self.check_count(count, element_width)?;
        Ok(count)
    }

    fn check_count(&self, count: usize, element_width: usize) -> Result<(), MarshalError> {
        if let Some(remaining) = self.source.remaining_hint() {
            if count.saturating_mul(element_width) > remaining {
                return Err(MarshalError::truncated());
            }
        }
        Ok(())
    }

    /// 按封顶的块逐段读入，超长的长度字段在首块读取时就会暴露截断
    pub(crate) fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, MarshalError> {
        self.check_count(len, 1)?;
        let mut buf = Vec::with_capacity(len.min(MAX_DECODE_PREALLOC));
        let mut remaining = len;
        while remaining > 0 {
            let take = remaining.min(MAX_DECODE_PREALLOC);
            let start = buf.len();
            buf.resize(start + take, 0);
            self.source.read_exact(&mut buf[start..])?;
            remaining -= take;
        }
        Ok(buf)
    }

    pub(crate) fn read_str(&mut self, len: usize) -> Result<String, MarshalError> {
        let bytes = self.read_vec(len)?;
        String::from_utf8(bytes)
            .map_err(|_| MarshalError::Malformed("invalid utf-8 in string payload".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::stream::{IoSource, SliceSource};

    fn decode_with(bytes: &[u8], version: u8) -> Result<Value, MarshalError> {
        let options = MarshalOptions::with_version(version);
        let mut source = SliceSource::new(bytes);
        let mut reader = MarshalReader::new(&mut source, &options);
        reader.read_value()
    }

    #[test]
    fn test_unknown_tag() {
        let err = decode_with(&[b'@'], 4).unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }

    #[test]
    fn test_empty_stream() {
        let err = decode_with(&[], 4).unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }

    #[test]
    fn test_singletons() {
        assert_eq!(decode_with(&[b'N'], 4).unwrap(), Value::None);
        assert_eq!(decode_with(&[b'T'], 4).unwrap(), Value::Bool(true));
        assert_eq!(decode_with(&[b'0'], 4).unwrap(), Value::Null);
        assert_eq!(decode_with(&[b'$'], 4).unwrap(), Value::SourceMarker);
    }

    #[test]
    fn test_truncated_string_payload() {
        // 声称 10 字节，只有 5 字节
        let mut bytes = vec![b'u'];
        bytes.extend_from_slice(&10u32.to_le_bytes());
        bytes.extend_from_slice(b"hello");
        let err = decode_with(&bytes, 2).unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut bytes = vec![b'['];
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        let err = decode_with(&bytes, 2).unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }

    #[test]
    fn test_bare_ref_out_of_range() {
        let mut bytes = vec![b'r'];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let err = decode_with(&bytes, 4).unwrap_err();
        assert!(matches!(err, MarshalError::BadReference { index: 0, .. }));
    }

    #[test]
    fn test_negative_ref_index() {
        let mut bytes = vec![b'r'];
        bytes.extend_from_slice(&(-2i32).to_le_bytes());
        let err = decode_with(&bytes, 4).unwrap_err();
        assert!(matches!(err, MarshalError::BadReference { index: -2, .. }));
    }

    #[test]
    fn test_ref_flag_rejected_below_v3() {
        let bytes = [b'z' | FLAG_REF, 1, b'a'];
        let err = decode_with(&bytes, 2).unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }

    #[test]
    fn test_flagged_ref_tag_rejected() {
        let mut bytes = vec![b'r' | FLAG_REF];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let err = decode_with(&bytes, 4).unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }

    #[test]
    fn test_bigint_digit_overflow_rejected() {
        let mut bytes = vec![b'l'];
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&0x8001u16.to_le_bytes());
        let err = decode_with(&bytes, 2).unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }

    #[test]
    fn test_interned_strings_share_object() {
        // 两个驻留短 ASCII "x"，第二个不带引用机制（版本 2）也要去重
        let bytes = [b')', 2, b'Z', 1, b'x', b'Z', 1, b'x'];
        let value = decode_with(&bytes, 2).unwrap();
        let Value::Tuple(items) = value else {
            panic!("expected tuple");
        };
        assert!(items[0].is_identical(&items[1]));
    }

    #[test]
    fn test_io_source_huge_count_degrades_to_malformed() {
        // IO 源没有剩余长度提示；巨大的计数字段必须在首次元素/首块
        // 读取时以 Malformed 报错，而不是在预分配阶段中止进程
        let options = MarshalOptions::with_version(0);

        let mut bytes = vec![b'['];
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        let mut source = IoSource::new(std::io::Cursor::new(bytes));
        let mut reader = MarshalReader::new(&mut source, &options);
        let err = reader.read_value().unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));

        let mut bytes = vec![b's'];
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        bytes.extend_from_slice(b"short");
        let mut source = IoSource::new(std::io::Cursor::new(bytes));
        let mut reader = MarshalReader::new(&mut source, &options);
        let err = reader.read_value().unwrap_err();
        assert!(matches!(err, MarshalError::Malformed(_)));
    }

    #[test]
    fn test_depth_guard_on_decode() {
        // 251 层嵌套列表（版本 0，无引用标志）
        let mut bytes = Vec::new();
        for _ in 0..251 {
            bytes.push(b'[');
            bytes.extend_from_slice(&1u32.to_le_bytes());
        }
        bytes.push(b'N');
        let err = decode_with(&bytes, 0).unwrap_err();
        assert!(matches!(err, MarshalError::DepthExceeded(_)));
    }
}
