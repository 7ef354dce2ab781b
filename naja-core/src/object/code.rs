//! 编译后代码单元
//!
//! 一个代码单元对应一段编译产物：指令字节、常量池、名字表和
//! 后端附属表。常量池里的值走通用编码，可能嵌套更多代码单元。

use naja_config::CodeBackend;

use super::value::Value;

/// 代码单元标志位
pub struct CodeFlags;

impl CodeFlags {
    /// 接受可变位置参数 (*args)
    pub const VARARGS: u32 = 0x04;
    /// 接受可变关键字参数 (**kwargs)
    pub const VARKEYWORDS: u32 = 0x08;
    /// 生成器
    pub const GENERATOR: u32 = 0x20;
    /// 协程
    pub const COROUTINE: u32 = 0x80;
}

/// 异常处理器区间
///
/// 指令偏移半开区间 [start, end) 由 handler 处的处理器接管，
/// stack_depth 是进入处理器时应恢复的操作数栈深度。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRange {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    pub stack_depth: u32,
}

/// 后端专属负载
///
/// 两种互斥的子格式：字节码后端的附属表是结构化的；IR 后端把
/// 自己的序列化结果当作不透明字节块交给编解码器。
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCode {
    /// 字节码后端：结构化附属表
    Bytecode {
        /// 数值常量池（不装箱的快速路径常量）
        primitive_constants: Vec<i64>,
        /// 异常处理器区间表
        exception_ranges: Vec<ExceptionRange>,
        /// 条件分支 profile 槽位数
        profile_slot_count: u32,
    },
    /// IR 后端：由后端自身序列化的不透明字节块
    Ir {
        /// 预序列化负载，原样交还给后端
        blob: Vec<u8>,
    },
}

impl BackendCode {
    /// 该负载所属的后端
    pub fn backend(&self) -> CodeBackend {
        match self {
            BackendCode::Bytecode { .. } => CodeBackend::Bytecode,
            BackendCode::Ir { .. } => CodeBackend::Ir,
        }
    }

    /// 空的字节码后端负载
    pub fn empty_bytecode() -> Self {
        BackendCode::Bytecode {
            primitive_constants: Vec::new(),
            exception_ranges: Vec::new(),
            profile_slot_count: 0,
        }
    }
}

/// 编译后代码单元
#[derive(Debug, Clone)]
pub struct CodeUnit {
    /// 名称
    pub name: String,
    /// 限定名称（含外层作用域路径）
    pub qualname: String,
    /// 位置参数个数
    pub arg_count: u32,
    /// 仅关键字参数个数
    pub kwonly_arg_count: u32,
    /// 仅位置参数个数
    pub positional_only_arg_count: u32,
    /// 标志字（见 CodeFlags）
    pub flags: u32,
    /// 原始指令字节
    pub code: Vec<u8>,
    /// 源码偏移表（行/列映射，编解码器不解释其内容）
    pub src_offset_table: Vec<u8>,
    /// 引用的全局名
    pub names: Vec<String>,
    /// 局部变量名
    pub varnames: Vec<String>,
    /// 被内层捕获的 cell 变量名
    pub cellvars: Vec<String>,
    /// 捕获自外层的自由变量名
    pub freevars: Vec<String>,
    /// cell 槽位到参数索引的映射（仅当有参数被捕获时存在）
    pub cell2arg: Option<Vec<i32>>,
    /// 常量池（普通值，可能递归包含代码单元）
    pub constants: Vec<Value>,
    /// 后端专属负载
    pub backend: BackendCode,
    /// 反序列化时赋予的源名称；进程内构建的代码单元为 None
    pub source_name: Option<String>,
}

impl CodeUnit {
    /// 创建空代码单元（字节码后端）
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            qualname: name.clone(),
            name,
            arg_count: 0,
            kwonly_arg_count: 0,
            positional_only_arg_count: 0,
            flags: 0,
            code: Vec::new(),
            src_offset_table: Vec::new(),
            names: Vec::new(),
            varnames: Vec::new(),
            cellvars: Vec::new(),
            freevars: Vec::new(),
            cell2arg: None,
            constants: Vec::new(),
            backend: BackendCode::empty_bytecode(),
            source_name: None,
        }
    }
}

/// 结构相等；`source_name` 是反序列化的过程产物，不参与比较
impl PartialEq for CodeUnit {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.qualname == other.qualname
            && self.arg_count == other.arg_count
            && self.kwonly_arg_count == other.kwonly_arg_count
            && self.positional_only_arg_count == other.positional_only_arg_count
            && self.flags == other.flags
            && self.code == other.code
            && self.src_offset_table == other.src_offset_table
            && self.names == other.names
            && self.varnames == other.varnames
            && self.cellvars == other.cellvars
            && self.freevars == other.freevars
            && self.cell2arg == other.cell2arg
            && self.constants == other.constants
            && self.backend == other.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named() {
        let unit = CodeUnit::named("main");
        assert_eq!(unit.name, "main");
        assert_eq!(unit.qualname, "main");
        assert_eq!(unit.backend.backend(), CodeBackend::Bytecode);
        assert!(unit.source_name.is_none());
    }

    #[test]
    fn test_eq_ignores_source_name() {
        let a = CodeUnit::named("f");
        let mut b = CodeUnit::named("f");
        b.source_name = Some("<marshal #3>".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn test_backend_of_payload() {
        assert_eq!(
            BackendCode::empty_bytecode().backend(),
            CodeBackend::Bytecode
        );
        assert_eq!(
            BackendCode::Ir { blob: vec![1, 2] }.backend(),
            CodeBackend::Ir
        );
    }
}
