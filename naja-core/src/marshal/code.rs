//! 代码单元子格式
//!
//! 在通用值编码之上叠加的结构化布局：前导字段（参数计数、标志、
//! 名称）、四张名字表、常量池（常量走通用编码，可能递归嵌套更
//! 多代码单元）以及后端专属尾段。外层标签由产生代码的字节码后
//! 端决定；解码时先核对当前配置的后端，不一致立即失败——两种
//! 后端的指令编码互不可读，这不是可重试的错误。

use std::rc::Rc;

use naja_config::CodeBackend;

use super::error::MarshalError;
use super::reader::{MarshalReader, MAX_DECODE_PREALLOC};
use super::stream::{MarshalSink, MarshalSource};
use super::tag::TypeTag;
use super::writer::MarshalWriter;
use crate::object::code::{BackendCode, CodeUnit, ExceptionRange};
use crate::object::value::Value;

/// 写出一个代码单元（标签 + 前导字段 + 名字表 + 常量池 + 后端尾段）
pub(crate) fn write_code_unit<S: MarshalSink>(
    w: &mut MarshalWriter<S>,
    unit: &CodeUnit,
    flag: u8,
) -> Result<(), MarshalError> {
    let unit_backend = unit.backend.backend();
    if unit_backend != w.backend() {
        return Err(MarshalError::BackendMismatch {
            stream: unit_backend,
            configured: w.backend(),
        });
    }

    let tag = match unit_backend {
        CodeBackend::Bytecode => TypeTag::Code,
        CodeBackend::Ir => TypeTag::IrCode,
    };
    w.write_u8(tag as u8 | flag)?;

    // 前导字段
    w.write_u32(unit.arg_count)?;
    w.write_u32(unit.kwonly_arg_count)?;
    w.write_u32(unit.positional_only_arg_count)?;
    w.write_u32(unit.flags)?;
    w.write_len_prefixed(unit.name.as_bytes())?;
    w.write_len_prefixed(unit.qualname.as_bytes())?;

    // 名字表
    write_name_table(w, &unit.names)?;
    write_name_table(w, &unit.varnames)?;
    write_name_table(w, &unit.cellvars)?;
    write_name_table(w, &unit.freevars)?;

    // cell 到参数的映射（可选）
    match &unit.cell2arg {
        None => w.write_u8(0)?,
        Some(map) => {
            w.write_u8(1)?;
            w.write_count(map.len())?;
            for &index in map {
                w.write_i32(index)?;
            }
        }
    }

    // 指令字节和源码偏移表
    w.write_len_prefixed(&unit.code)?;
    w.write_len_prefixed(&unit.src_offset_table)?;

    // 常量池：普通值，递归走通用编码
    w.write_count(unit.constants.len())?;
    for constant in &unit.constants {
        w.write_value(constant)?;
    }

    // 后端专属尾段
    match &unit.backend {
        BackendCode::Bytecode {
            primitive_constants,
            exception_ranges,
            profile_slot_count,
        } => {
            w.write_count(primitive_constants.len())?;
            for &value in primitive_constants {
                w.write_i64(value)?;
            }
            w.write_count(exception_ranges.len())?;
            for range in exception_ranges {
                w.write_u32(range.start)?;
                w.write_u32(range.end)?;
                w.write_u32(range.handler)?;
                w.write_u32(range.stack_depth)?;
            }
            w.write_u32(*profile_slot_count)?;
        }
        BackendCode::Ir { blob } => {
            // 后端自己序列化的结果，这里只当不透明字节块
            w.write_len_prefixed(blob)?;
        }
    }

    Ok(())
}

fn write_name_table<S: MarshalSink>(
    w: &mut MarshalWriter<S>,
    names: &[String],
) -> Result<(), MarshalError> {
    w.write_count(names.len())?;
    for name in names {
        w.write_len_prefixed(name.as_bytes())?;
    }
    Ok(())
}

/// 读取一个代码单元（标签已消费，`stream_backend` 由标签确定）
pub(crate) fn read_code_unit<S: MarshalSource>(
    r: &mut MarshalReader<S>,
    stream_backend: CodeBackend,
    flag: bool,
) -> Result<Value, MarshalError> {
    // 后端核对先于一切负载解码
    if stream_backend != r.backend() {
        return Err(MarshalError::BackendMismatch {
            stream: stream_backend,
            configured: r.backend(),
        });
    }

    let slot = r.reserve_if(flag);

    let arg_count = r.read_u32()?;
    let kwonly_arg_count = r.read_u32()?;
    let positional_only_arg_count = r.read_u32()?;
    let flags = r.read_u32()?;
    let name = read_string(r)?;
    let qualname = read_string(r)?;

    let names = read_name_table(r)?;
    let varnames = read_name_table(r)?;
    let cellvars = read_name_table(r)?;
    let freevars = read_name_table(r)?;

    let cell2arg = match r.read_u8()? {
        0 => None,
        1 => {
            let count = r.read_count(4)?;
            let mut map = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
            for _ in 0..count {
                map.push(r.read_i32()?);
            }
            Some(map)
        }
        other => {
            return Err(MarshalError::Malformed(format!(
                "invalid cell2arg presence byte 0x{other:02x}"
            )));
        }
    };

    let code = read_bytes(r)?;
    let src_offset_table = read_bytes(r)?;

    let constant_count = r.read_count(1)?;
    let mut constants = Vec::with_capacity(constant_count.min(MAX_DECODE_PREALLOC));
    for _ in 0..constant_count {
        constants.push(r.read_value()?);
    }

    let backend = match stream_backend {
        CodeBackend::Bytecode => {
            let count = r.read_count(8)?;
            let mut primitive_constants = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
            for _ in 0..count {
                primitive_constants.push(r.read_i64()?);
            }
            let count = r.read_count(16)?;
            let mut exception_ranges = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
            for _ in 0..count {
                exception_ranges.push(ExceptionRange {
                    start: r.read_u32()?,
                    end: r.read_u32()?,
                    handler: r.read_u32()?,
                    stack_depth: r.read_u32()?,
                });
            }
            let profile_slot_count = r.read_u32()?;
            BackendCode::Bytecode {
                primitive_constants,
                exception_ranges,
                profile_slot_count,
            }
        }
        CodeBackend::Ir => BackendCode::Ir { blob: read_bytes(r)? },
    };

    let unit = CodeUnit {
        name,
        qualname,
        arg_count,
        kwonly_arg_count,
        positional_only_arg_count,
        flags,
        code,
        src_offset_table,
        names,
        varnames,
        cellvars,
        freevars,
        cell2arg,
        constants,
        backend,
        source_name: Some(r.code_source_name()),
    };

    let value = Value::Code(Rc::new(unit));
    r.fill_slot(slot, &value);
    Ok(value)
}

fn read_bytes<S: MarshalSource>(r: &mut MarshalReader<S>) -> Result<Vec<u8>, MarshalError> {
    let len = r.read_count(1)?;
    r.read_vec(len)
}

fn read_string<S: MarshalSource>(r: &mut MarshalReader<S>) -> Result<String, MarshalError> {
    let len = r.read_count(1)?;
    r.read_str(len)
}

fn read_name_table<S: MarshalSource>(r: &mut MarshalReader<S>) -> Result<Vec<String>, MarshalError> {
    let count = r.read_count(4)?;
    let mut names = Vec::with_capacity(count.min(MAX_DECODE_PREALLOC));
    for _ in 0..count {
        names.push(read_string(r)?);
    }
    Ok(names)
}
