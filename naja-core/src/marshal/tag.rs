//! 类型标签注册表
//!
//! 每个值在线上以一个标签字节开头：低 7 位选择变体，最高位
//! (0x80) 是引用表标志，只对可引用变体、且版本 >= 3 时有意义。
//! 标签分配在所有受支持的格式版本间保持稳定：新变体只能用
//! 全新字节，退役的字节永不复用。

/// 引用表标志位：该值占用一个引用表槽位
pub const FLAG_REF: u8 = 0x80;

/// 类型标签（低 7 位）
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// 缺位标记 / dict 终止符
    Null = b'0',
    /// None
    None = b'N',
    /// NoValue 哨兵
    NoValue = b'n',
    /// StopIteration
    StopIteration = b'S',
    /// Ellipsis
    Ellipsis = b'.',
    /// false
    False = b'F',
    /// true
    True = b'T',
    /// 32 位整数
    Int32 = b'i',
    /// 64 位整数
    Int64 = b'I',
    /// 任意精度整数
    BigInt = b'l',
    /// 浮点数（十进制文本，版本 <= 1）
    Float = b'f',
    /// 浮点数（IEEE-754 位模式）
    BinaryFloat = b'g',
    /// 复数（十进制文本）
    Complex = b'x',
    /// 复数（IEEE-754 位模式）
    BinaryComplex = b'y',
    /// 原始字节串（也是字节视图兜底）
    Bytes = b's',
    /// 驻留字符串（UTF-8，4 字节长度）
    Interned = b't',
    /// 字符串（UTF-8，4 字节长度）
    Unicode = b'u',
    /// ASCII 字符串（4 字节长度）
    Ascii = b'a',
    /// 驻留 ASCII 字符串（4 字节长度）
    AsciiInterned = b'A',
    /// 短 ASCII 字符串（1 字节长度）
    ShortAscii = b'z',
    /// 驻留短 ASCII 字符串（1 字节长度）
    ShortAsciiInterned = b'Z',
    /// 元组（4 字节计数）
    Tuple = b'(',
    /// 小元组（1 字节计数，版本 >= 4）
    SmallTuple = b')',
    /// 列表
    List = b'[',
    /// 字典（null 标签终止，无计数前缀）
    Dict = b'{',
    /// 集合
    Set = b'<',
    /// 冻结集合
    FrozenSet = b'>',
    /// 引用表回指
    Ref = b'r',
    /// 代码单元（字节码后端子格式）
    Code = b'c',
    /// 代码单元（IR 后端子格式）
    IrCode = b'C',
    /// 定型原生数组
    Array = b']',
    /// 反序列化上下文源标记
    SourceMarker = b'$',
}

impl TypeTag {
    /// 从标签字节转换（调用方需先剥离 FLAG_REF）
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'0' => Some(TypeTag::Null),
            b'N' => Some(TypeTag::None),
            b'n' => Some(TypeTag::NoValue),
            b'S' => Some(TypeTag::StopIteration),
            b'.' => Some(TypeTag::Ellipsis),
            b'F' => Some(TypeTag::False),
            b'T' => Some(TypeTag::True),
            b'i' => Some(TypeTag::Int32),
            b'I' => Some(TypeTag::Int64),
            b'l' => Some(TypeTag::BigInt),
            b'f' => Some(TypeTag::Float),
            b'g' => Some(TypeTag::BinaryFloat),
            b'x' => Some(TypeTag::Complex),
            b'y' => Some(TypeTag::BinaryComplex),
            b's' => Some(TypeTag::Bytes),
            b't' => Some(TypeTag::Interned),
            b'u' => Some(TypeTag::Unicode),
            b'a' => Some(TypeTag::Ascii),
            b'A' => Some(TypeTag::AsciiInterned),
            b'z' => Some(TypeTag::ShortAscii),
            b'Z' => Some(TypeTag::ShortAsciiInterned),
            b'(' => Some(TypeTag::Tuple),
            b')' => Some(TypeTag::SmallTuple),
            b'[' => Some(TypeTag::List),
            b'{' => Some(TypeTag::Dict),
            b'<' => Some(TypeTag::Set),
            b'>' => Some(TypeTag::FrozenSet),
            b'r' => Some(TypeTag::Ref),
            b'c' => Some(TypeTag::Code),
            b'C' => Some(TypeTag::IrCode),
            b']' => Some(TypeTag::Array),
            b'$' => Some(TypeTag::SourceMarker),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for tag in [
            TypeTag::Null,
            TypeTag::None,
            TypeTag::NoValue,
            TypeTag::StopIteration,
            TypeTag::Ellipsis,
            TypeTag::False,
            TypeTag::True,
            TypeTag::Int32,
            TypeTag::Int64,
            TypeTag::BigInt,
            TypeTag::Float,
            TypeTag::BinaryFloat,
            TypeTag::Complex,
            TypeTag::BinaryComplex,
            TypeTag::Bytes,
            TypeTag::Interned,
            TypeTag::Unicode,
            TypeTag::Ascii,
            TypeTag::AsciiInterned,
            TypeTag::ShortAscii,
            TypeTag::ShortAsciiInterned,
            TypeTag::Tuple,
            TypeTag::SmallTuple,
            TypeTag::List,
            TypeTag::Dict,
            TypeTag::Set,
            TypeTag::FrozenSet,
            TypeTag::Ref,
            TypeTag::Code,
            TypeTag::IrCode,
            TypeTag::Array,
            TypeTag::SourceMarker,
        ] {
            assert_eq!(TypeTag::from_u8(tag as u8), Some(tag));
        }
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(TypeTag::from_u8(b'@'), None);
        assert_eq!(TypeTag::from_u8(0x00), None);
    }

    #[test]
    fn test_tags_fit_in_seven_bits() {
        // 最高位保留给 FLAG_REF
        for byte in 0u8..=0x7F {
            if let Some(tag) = TypeTag::from_u8(byte) {
                assert_eq!(tag as u8 & FLAG_REF, 0);
            }
        }
    }
}
