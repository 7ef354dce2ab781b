//! 运行时值模型
//!
//! 封闭的 Value 枚举，涵盖编解码器能处理的全部值形态。
//! 可共享/可成环的值用 `Rc` 持有，`Rc` 指针即对象身份，
//! 编码端引用表以它为键。

use std::cell::RefCell;
use std::rc::Rc;

use num_bigint::BigInt;

use super::array::TypedArray;
use super::code::CodeUnit;

/// 字符串对象
///
/// `interned` 标记该字符串在运行时驻留表中；编码时选用驻留变体标签，
/// 解码端遇到驻留标签会在本次调用内去重。
#[derive(Debug, Clone)]
pub struct StrObject {
    /// 字符串内容（UTF-8）
    pub chars: String,
    /// 是否驻留
    pub interned: bool,
}

/// 宿主对象兜底
///
/// 运行时中没有专属标签的对象。暴露字节视图的可以按原始字节串编码，
/// 没有字节视图的对象无法序列化。
#[derive(Debug, Clone)]
pub struct ForeignObject {
    /// 宿主类型名（用于错误消息）
    pub type_name: String,
    /// 字节视图（如果对象支持）
    pub view: Option<Vec<u8>>,
}

/// 运行时值
#[derive(Debug, Clone)]
pub enum Value {
    /// 缺位标记（也是 dict 的线上终止符）
    Null,
    /// None
    None,
    /// NoValue 哨兵
    NoValue,
    /// StopIteration 标记
    StopIteration,
    /// Ellipsis 标记
    Ellipsis,
    /// 布尔值
    Bool(bool),
    /// 32 位机器整数
    Int32(i32),
    /// 64 位机器整数
    Int64(i64),
    /// 任意精度整数
    BigInt(Rc<BigInt>),
    /// 双精度浮点数
    Float(f64),
    /// 复数
    Complex { re: f64, im: f64 },
    /// 字节串
    Bytes(Rc<Vec<u8>>),
    /// Unicode 字符串（普通或驻留）
    Str(Rc<StrObject>),
    /// 元组（不可变）
    Tuple(Rc<Vec<Value>>),
    /// 列表（可变，允许自引用）
    List(Rc<RefCell<Vec<Value>>>),
    /// 字典（按插入顺序保存键值对）
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    /// 集合（可变）
    Set(Rc<RefCell<Vec<Value>>>),
    /// 冻结集合（不可变）
    FrozenSet(Rc<Vec<Value>>),
    /// 定型原生数组
    Array(Rc<TypedArray>),
    /// 编译后代码单元
    Code(Rc<CodeUnit>),
    /// 反序列化上下文源标记
    SourceMarker,
    /// 宿主对象兜底
    Foreign(Rc<ForeignObject>),
}

impl Value {
    // ==================== 构造方法 ====================

    /// 创建普通字符串
    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(Rc::new(StrObject {
            chars: text.into(),
            interned: false,
        }))
    }

    /// 创建驻留字符串
    pub fn interned_str(text: impl Into<String>) -> Self {
        Value::Str(Rc::new(StrObject {
            chars: text.into(),
            interned: true,
        }))
    }

    /// 创建字节串
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(Rc::new(data.into()))
    }

    /// 创建任意精度整数
    pub fn big_int(value: BigInt) -> Self {
        Value::BigInt(Rc::new(value))
    }

    /// 创建元组
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    /// 创建列表
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// 创建字典
    pub fn dict(pairs: Vec<(Value, Value)>) -> Self {
        Value::Dict(Rc::new(RefCell::new(pairs)))
    }

    /// 创建集合
    pub fn set(items: Vec<Value>) -> Self {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    /// 创建冻结集合
    pub fn frozen_set(items: Vec<Value>) -> Self {
        Value::FrozenSet(Rc::new(items))
    }

    /// 创建定型数组
    pub fn array(array: TypedArray) -> Self {
        Value::Array(Rc::new(array))
    }

    /// 创建代码单元值
    pub fn code(unit: CodeUnit) -> Self {
        Value::Code(Rc::new(unit))
    }

    // ==================== 身份与分类 ====================

    /// 对象身份
    ///
    /// 只有 `Rc` 持有的值有身份；机器整数、浮点数等按值传递的
    /// 原语和单例返回 None，它们永远不进引用表。
    pub fn identity(&self) -> Option<*const ()> {
        match self {
            Value::BigInt(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Bytes(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Str(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Tuple(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::List(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Dict(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Set(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::FrozenSet(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Array(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Code(rc) => Some(Rc::as_ptr(rc) as *const ()),
            Value::Foreign(rc) => Some(Rc::as_ptr(rc) as *const ()),
            _ => None,
        }
    }

    /// 值形态名称（用于错误消息和检视输出）
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::None => "none",
            Value::NoValue => "novalue",
            Value::StopIteration => "stopiteration",
            Value::Ellipsis => "ellipsis",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::BigInt(_) => "bigint",
            Value::Float(_) => "float",
            Value::Complex { .. } => "complex",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Array(_) => "array",
            Value::Code(_) => "code",
            Value::SourceMarker => "sourcemarker",
            Value::Foreign(_) => "foreign",
        }
    }

    /// 两个值是否为同一对象
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// 结构相等
///
/// 浮点数按位比较（NaN 等于自身、区分 ±0），这样往返测试可以
/// 直接用 `==` 断言。注意：成环的图不能用 `==` 比较，只能比较身份。
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::None, Value::None) => true,
            (Value::NoValue, Value::NoValue) => true,
            (Value::StopIteration, Value::StopIteration) => true,
            (Value::Ellipsis, Value::Ellipsis) => true,
            (Value::SourceMarker, Value::SourceMarker) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Complex { re: ar, im: ai }, Value::Complex { re: br, im: bi }) => {
                ar.to_bits() == br.to_bits() && ai.to_bits() == bi.to_bits()
            }
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a.chars == b.chars,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => *a.borrow() == *b.borrow(),
            (Value::Dict(a), Value::Dict(b)) => *a.borrow() == *b.borrow(),
            (Value::Set(a), Value::Set(b)) => *a.borrow() == *b.borrow(),
            (Value::FrozenSet(a), Value::FrozenSet(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Code(a), Value::Code(b)) => a == b,
            (Value::Foreign(a), Value::Foreign(b)) => {
                a.type_name == b.type_name && a.view == b.view
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_shared() {
        let s = Value::str("hello");
        let clone = s.clone();
        assert!(s.is_identical(&clone));

        let other = Value::str("hello");
        assert!(!s.is_identical(&other));
        assert_eq!(s, other);
    }

    #[test]
    fn test_primitives_have_no_identity() {
        assert!(Value::Int32(1).identity().is_none());
        assert!(Value::Float(1.0).identity().is_none());
        assert!(Value::None.identity().is_none());
        assert!(Value::Bool(true).identity().is_none());
    }

    #[test]
    fn test_float_eq_is_bitwise() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn test_structural_eq() {
        let a = Value::tuple(vec![Value::Int32(1), Value::str("x")]);
        let b = Value::tuple(vec![Value::Int32(1), Value::str("x")]);
        assert_eq!(a, b);
        assert_ne!(a, Value::tuple(vec![Value::Int32(2), Value::str("x")]));
    }

    #[test]
    fn test_kind_name() {
        assert_eq!(Value::Null.kind_name(), "null");
        assert_eq!(Value::list(vec![]).kind_name(), "list");
        assert_eq!(Value::big_int(BigInt::from(7)).kind_name(), "bigint");
    }
}
