//! 引用表
//!
//! 编码端：对象身份 -> 索引的映射，首次出现按 `len()` 顺序分配，
//! 整个表只活一次编码调用，从不全局共享。
//! 解码端：按出现顺序追加的槽位列表。带引用标志的值先占槽再解
//! 码负载，可变容器把最终（仍为空的）容器本体提前放进槽位，这
//! 就是容器能包含自身的原因；不可变值先放占位符、构建完成后回填。

use std::collections::HashMap;

use super::error::MarshalError;
use crate::object::value::Value;

/// 编码端跟踪结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracked {
    /// 首次出现，已分配槽位；调用方照常写出带引用标志的负载
    New,
    /// 已经跟踪过，只需写出回指
    Seen(u32),
}

/// 编码端引用表（按对象身份去重）
#[derive(Default)]
pub struct WriteRefs {
    map: HashMap<*const (), u32>,
}

impl WriteRefs {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// 跟踪一个对象身份
    ///
    /// 已跟踪返回现有索引；否则把 `len()` 分配给它并标记为新。
    pub fn track(&mut self, identity: *const ()) -> Tracked {
        if let Some(&index) = self.map.get(&identity) {
            return Tracked::Seen(index);
        }
        let index = self.map.len() as u32;
        self.map.insert(identity, index);
        Tracked::New
    }

    /// 已跟踪的对象数量
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// 解码端引用表（只追加）
#[derive(Default)]
pub struct ReadRefs {
    slots: Vec<Value>,
}

impl ReadRefs {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// 追加一个槽位，返回其索引
    pub fn reserve(&mut self, placeholder: Value) -> usize {
        let slot = self.slots.len();
        self.slots.push(placeholder);
        slot
    }

    /// 回填槽位
    pub fn fill(&mut self, slot: usize, value: Value) {
        self.slots[slot] = value;
    }

    /// 按索引解析回指；越界即输入非法
    pub fn get(&self, index: u32) -> Result<Value, MarshalError> {
        match self.slots.get(index as usize) {
            Some(value) => Ok(value.clone()),
            None => Err(MarshalError::BadReference {
                index: index as i64,
                size: self.slots.len(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_refs_dense_assignment() {
        let mut refs = WriteRefs::new();
        let a = Value::str("a");
        let b = Value::str("b");

        assert_eq!(refs.track(a.identity().unwrap()), Tracked::New);
        assert_eq!(refs.track(b.identity().unwrap()), Tracked::New);
        assert_eq!(refs.track(a.identity().unwrap()), Tracked::Seen(0));
        assert_eq!(refs.track(b.identity().unwrap()), Tracked::Seen(1));
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_read_refs_reserve_and_fill() {
        let mut refs = ReadRefs::new();
        let slot = refs.reserve(Value::Null);
        assert_eq!(slot, 0);
        assert_eq!(refs.get(0).unwrap(), Value::Null);

        refs.fill(slot, Value::Int32(7));
        assert_eq!(refs.get(0).unwrap(), Value::Int32(7));
    }

    #[test]
    fn test_read_refs_out_of_range() {
        let refs = ReadRefs::new();
        let err = refs.get(3).unwrap_err();
        assert!(matches!(
            err,
            MarshalError::BadReference { index: 3, size: 0 }
        ));
    }

    #[test]
    fn test_mutable_container_self_slot() {
        // 可变容器把自身提前放进槽位，之后通过 get 拿到同一对象
        let mut refs = ReadRefs::new();
        let list = Value::list(vec![]);
        refs.reserve(list.clone());
        let resolved = refs.get(0).unwrap();
        assert!(list.is_identical(&resolved));
    }
}
